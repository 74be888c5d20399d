//! Root level.

use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ / -------------------------------------------------------------

pub async fn dispatch_request(
    request: Request<'_>,
    mut path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    match path.next() {
        Some("health") => health(request, path),
        Some("ca") => match path.next() {
            Some("rest") => super::rest::dispatch(request, path).await,
            _ => Ok(HttpResponse::not_found())
        }
        _ => Ok(HttpResponse::not_found())
    }
}


//------------ /health -------------------------------------------------------

fn health(
    request: Request<'_>, path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    path.check_exhausted()?;
    request.check_get()?;
    let (request, _) = request.proceed_unchecked();
    request.empty()?;
    Ok(HttpResponse::ok())
}
