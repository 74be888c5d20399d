//! The REST API under `/ca/rest`.

use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest ------------------------------------------------------

pub async fn dispatch(
    request: Request<'_>,
    mut path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    match path.next() {
        Some("info") => info(request, path),
        Some("profiles") => super::profiles::dispatch(request, path).await,
        Some("certrequests") => {
            super::certrequests::dispatch(request, path).await
        }
        Some("certs") => super::certs::dispatch(request, path),
        Some("agent") => super::agent::dispatch(request, path).await,
        Some("admin") => super::admin::dispatch(request, path).await,
        _ => Ok(HttpResponse::not_found())
    }
}


//------------ /ca/rest/info -------------------------------------------------

fn info(
    request: Request<'_>, path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    path.check_exhausted()?;
    request.check_get()?;
    let (request, _) = request.proceed_unchecked();
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.info()))
}
