//! User and group administration under `/ca/rest/admin`.
//!
//! Everything here requires the actor to be an administrator.

use hyper::Method;
use crate::api::admin::Paging;
use crate::api::user::{GroupData, GroupMemberData, UserData};
use super::super::auth::Permission;
use super::super::request::{PathIter, Request};
use super::super::response::HttpResponse;
use super::error::DispatchError;


//------------ /ca/rest/admin ------------------------------------------------

pub async fn dispatch(
    request: Request<'_>,
    mut path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    match path.next() {
        Some("users") => users(request, path).await,
        Some("groups") => groups(request, path).await,
        _ => Ok(HttpResponse::not_found())
    }
}


//------------ /ca/rest/admin/users ------------------------------------------

async fn users(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    let Some(id) = path.next() else {
        return user_index(request).await
    };
    let id = id.to_string();
    match path.next() {
        None => user(request, &id).await,
        Some("token") => {
            path.check_exhausted()?;
            request.check_post()?;
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.users().issue_token(&id)?))
        }
        Some("memberships") => {
            path.check_exhausted()?;
            request.check_get()?;
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.users().memberships(&id)?))
        }
        Some(_) => Ok(HttpResponse::not_found())
    }
}

async fn user_index(
    request: Request<'_>
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let paging = request.parse_query(Paging::from_query)?;
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(
                &manager.users().list_users(paging.start, paging.size)?
            ))
        }
        Method::POST => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, user) = request.read_json::<UserData>().await?;
            Ok(HttpResponse::json(&manager.users().add_user(user)?))
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}

async fn user(
    request: Request<'_>, id: &str
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.users().show_user(id)?))
        }
        Method::PUT => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, user) = request.read_json::<UserData>().await?;
            Ok(HttpResponse::json(&manager.users().modify_user(id, user)?))
        }
        Method::DELETE => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            manager.users().delete_user(id)?;
            Ok(HttpResponse::success())
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}


//------------ /ca/rest/admin/groups -----------------------------------------

async fn groups(
    request: Request<'_>,
    path: PathIter<'_>,
) -> Result<HttpResponse, DispatchError> {
    let mut path = path.strip_trailing_slash();
    let Some(id) = path.next() else {
        return group_index(request).await
    };
    let id = id.to_string();
    match path.next() {
        None => group(request, &id).await,
        Some("members") => match path.next() {
            None => members(request, &id).await,
            Some(user) => {
                let user = user.to_string();
                path.check_exhausted()?;
                request.check_delete()?;
                let (request, _) = request.proceed_permitted(
                    Permission::Admin
                )?;
                let manager = request.empty()?;
                manager.users().remove_member(&id, &user)?;
                Ok(HttpResponse::success())
            }
        }
        Some(_) => Ok(HttpResponse::not_found())
    }
}

async fn group_index(
    request: Request<'_>
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let paging = request.parse_query(Paging::from_query)?;
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(
                &manager.users().list_groups(paging.start, paging.size)?
            ))
        }
        Method::POST => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, group) = request.read_json::<GroupData>().await?;
            Ok(HttpResponse::json(&manager.users().add_group(group)?))
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}

async fn group(
    request: Request<'_>, id: &str
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.users().show_group(id)?))
        }
        Method::PUT => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, group) = request.read_json::<GroupData>().await?;
            Ok(HttpResponse::json(&manager.users().modify_group(id, group)?))
        }
        Method::DELETE => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            manager.users().delete_group(id)?;
            Ok(HttpResponse::success())
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}

async fn members(
    request: Request<'_>, id: &str
) -> Result<HttpResponse, DispatchError> {
    match *request.method() {
        Method::GET => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let manager = request.empty()?;
            Ok(HttpResponse::json(&manager.users().members(id)?))
        }
        Method::POST => {
            let (request, _) = request.proceed_permitted(Permission::Admin)?;
            let (manager, member) = {
                request.read_json::<GroupMemberData>().await?
            };
            Ok(HttpResponse::json(
                &manager.users().add_member(id, &member.id)?
            ))
        }
        _ => Ok(HttpResponse::method_not_allowed())
    }
}
