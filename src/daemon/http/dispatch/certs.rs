//! Certificates under `/ca/rest/certs`.

use crate::api::cert::{CertId, CertQuery};
use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest/certs ------------------------------------------------

pub fn dispatch(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    match path.next() {
        None => list(request),
        Some(serial) => {
            let serial = serial.parse::<CertId>().map_err(|_| {
                HttpResponse::not_found()
            })?;
            path.check_exhausted()?;
            show(request, serial)
        }
    }
}

fn list(request: Request<'_>) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let query = request.parse_query(CertQuery::from_query)?;
    let (request, _) = request.proceed_unchecked();
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.list_certs(&query)?))
}

fn show(
    request: Request<'_>, serial: CertId
) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let (request, _) = request.proceed_unchecked();
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.show_cert(serial)?))
}
