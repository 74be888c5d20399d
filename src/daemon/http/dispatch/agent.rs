//! Agent services under `/ca/rest/agent`.
//!
//! Everything here requires the actor to be a certificate manager agent.

use crate::api::cert::{CertId, CertRevokeRequest};
use crate::api::request::{
    CertReviewResponse, RequestId, RequestQuery, ReviewAction,
};
use super::super::auth::Permission;
use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest/agent ------------------------------------------------

pub async fn dispatch(
    request: Request<'_>,
    mut path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    match path.next() {
        Some("certrequests") => certrequests(request, path).await,
        Some("certs") => certs(request, path).await,
        _ => Ok(HttpResponse::not_found())
    }
}


//------------ /ca/rest/agent/certrequests -----------------------------------

async fn certrequests(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    let Some(id) = path.next() else {
        return list_requests(request)
    };
    let id = id.parse::<RequestId>().map_err(|_| HttpResponse::not_found())?;
    match path.next() {
        None => review(request, id),
        Some(action) => {
            let action = action.parse::<ReviewAction>().map_err(|_| {
                HttpResponse::not_found()
            })?;
            path.check_exhausted()?;
            review_action(request, id, action).await
        }
    }
}

fn list_requests(
    request: Request<'_>
) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let query = request.parse_query(RequestQuery::from_query)?;
    let (request, _) = request.proceed_permitted(Permission::Agent)?;
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.list_requests(&query)?))
}

fn review(
    request: Request<'_>, id: RequestId
) -> Result<HttpResponse, DispatchError> {
    request.check_get()?;
    let (request, _) = request.proceed_permitted(Permission::Agent)?;
    let manager = request.empty()?;
    Ok(HttpResponse::json(&manager.review(id)?))
}

async fn review_action(
    request: Request<'_>, id: RequestId, action: ReviewAction,
) -> Result<HttpResponse, DispatchError> {
    request.check_post()?;
    let (request, auth) = request.proceed_permitted(Permission::Agent)?;
    let (manager, review) = request.read_json::<CertReviewResponse>().await?;
    Ok(HttpResponse::json(
        &manager.review_action(id, action, review, auth.actor())?
    ))
}


//------------ /ca/rest/agent/certs ------------------------------------------

async fn certs(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    let serial = path.parse_next::<CertId>()?;
    let op = path.next().ok_or_else(HttpResponse::not_found)?;
    path.check_exhausted()?;
    match op {
        "revoke" => {
            request.check_post()?;
            let (request, auth) = request.proceed_permitted(
                Permission::Agent
            )?;
            let (manager, revocation) = {
                request.read_json::<CertRevokeRequest>().await?
            };
            Ok(HttpResponse::json(
                &manager.revoke(serial, revocation, auth.actor())?
            ))
        }
        "unrevoke" => {
            request.check_post()?;
            let (request, auth) = request.proceed_permitted(
                Permission::Agent
            )?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.unrevoke(serial, auth.actor())?))
        }
        _ => Ok(HttpResponse::not_found())
    }
}
