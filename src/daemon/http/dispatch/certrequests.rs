//! Enrollment under `/ca/rest/certrequests`.

use crate::api::request::{CertEnrollmentRequest, RequestId};
use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest/certrequests -----------------------------------------

pub async fn dispatch(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    match path.next() {
        None => submit(request).await,
        Some("profiles") => {
            let profile = path.next().ok_or_else(HttpResponse::not_found)?;
            let profile = profile.to_string();
            path.check_exhausted()?;
            template(request, &profile)
        }
        Some(id) => {
            let id = id.parse::<RequestId>().map_err(|_| {
                HttpResponse::not_found()
            })?;
            path.check_exhausted()?;
            show(request, id)
        }
    }
}

/// Submits an enrollment or renewal request.
///
/// Anyone may submit. Whether the request is issued right away depends on
/// the profile and the actor.
async fn submit(request: Request<'_>) -> Result<HttpResponse, DispatchError> {
    request.check_post()?;
    let (request, auth) = request.proceed_unchecked();
    let (manager, enrollment) = {
        request.read_json::<CertEnrollmentRequest>().await?
    };
    Ok(HttpResponse::json(&manager.submit(enrollment, auth.actor())?))
}

fn template(
    request: Request<'_>, profile: &str
) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let (request, _) = request.proceed_unchecked();
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.template(profile)?))
}

fn show(
    request: Request<'_>, id: RequestId
) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let (request, _) = request.proceed_unchecked();
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.show_request(id)?))
}
