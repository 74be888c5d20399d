//! Certificate profiles under `/ca/rest/profiles`.

use hyper::Method;
use crate::api::admin::Paging;
use crate::api::profile::{Profile, RawProfile};
use super::super::auth::Permission;
use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest/profiles ---------------------------------------------

pub async fn dispatch(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    match path.next() {
        None => index(request).await,
        Some("raw") if *request.method() == Method::POST => {
            path.check_exhausted()?;
            add_raw(request).await
        }
        Some(id) => {
            let id = id.to_string();
            match path.next() {
                None => profile(request, id).await,
                Some("raw") => {
                    path.check_exhausted()?;
                    raw(request, id).await
                }
                Some(_) => Ok(HttpResponse::not_found())
            }
        }
    }
}

async fn index(request: Request<'_>) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let paging = request.parse_query(Paging::from_query)?;
            let include_disabled = request.auth().has_permission(
                Permission::Agent
            );
            let (request, _) = request.proceed_unchecked();
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.profiles().list(
                include_disabled, paging.start, paging.size
            )?))
        }
        Method::POST => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, profile) = request.read_json::<Profile>().await?;
            Ok(HttpResponse::json(&manager.profiles().add(profile)?))
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}

async fn add_raw(
    request: Request<'_>
) -> Result<HttpResponse, DispatchError> {
    let (request, _) = request.proceed_permitted(Permission::Admin)?;
    let (manager, raw) = request.read_json::<RawProfile>().await?;
    Ok(HttpResponse::json(&manager.profiles().add_raw(&raw)?))
}


//------------ /ca/rest/profiles/{id} ----------------------------------------

async fn profile(
    request: Request<'_>, id: String
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let include_disabled = request.auth().has_permission(
                Permission::Agent
            );
            let (request, _) = request.proceed_unchecked();
            let manager = request.empty()?;
            Ok(HttpResponse::json(
                &manager.profiles().show(&id, include_disabled)?
            ))
        }
        Method::PUT => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, profile) = request.read_json::<Profile>().await?;
            Ok(HttpResponse::json(&manager.profiles().modify(&id, profile)?))
        }
        Method::DELETE => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            manager.profiles().delete(&id)?;
            Ok(HttpResponse::success())
        }
        Method::POST => {
            let action = request.parse_query(ProfileAction::from_query)?;
            let (request, auth) = request.proceed_permitted(
                Permission::Agent
            )?;
            let manager = request.empty()?;
            match action {
                ProfileAction::Enable => {
                    manager.profiles().enable(&id, auth.actor())?
                }
                ProfileAction::Disable => {
                    manager.profiles().disable(&id, auth.actor())?
                }
            }
            Ok(HttpResponse::success())
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}


//------------ /ca/rest/profiles/{id}/raw ------------------------------------

async fn raw(
    request: Request<'_>, id: String
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let include_disabled = request.auth().has_permission(
                Permission::Agent
            );
            let (request, _) = request.proceed_unchecked();
            let manager = request.empty()?;
            Ok(HttpResponse::json(
                &manager.profiles().show_raw(&id, include_disabled)?
            ))
        }
        Method::PUT => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, raw) = request.read_json::<RawProfile>().await?;
            Ok(HttpResponse::json(&manager.profiles().modify_raw(&id, &raw)?))
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}


//------------ ProfileAction -------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ProfileAction {
    Enable,
    Disable,
}

impl ProfileAction {
    fn from_query(query: Option<&str>) -> Result<Self, String> {
        let action = url::form_urlencoded::parse(
            query.unwrap_or("").as_bytes()
        ).find(|(key, _)| key == "action").map(|(_, value)| value);
        match action.as_deref() {
            Some("enable") => Ok(ProfileAction::Enable),
            Some("disable") => Ok(ProfileAction::Disable),
            Some(other) => Err(format!("unknown profile action '{other}'")),
            None => Err("missing profile action".into()),
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_actions() {
        assert_eq!(
            ProfileAction::from_query(Some("action=enable")),
            Ok(ProfileAction::Enable)
        );
        assert_eq!(
            ProfileAction::from_query(Some("x=1&action=disable")),
            Ok(ProfileAction::Disable)
        );
        assert!(ProfileAction::from_query(Some("action=frobnicate")).is_err());
        assert!(ProfileAction::from_query(None).is_err());
    }
}
