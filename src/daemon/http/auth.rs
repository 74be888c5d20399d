//! Authentication and permissions of HTTP requests.

use crate::commons::PkiResult;
use crate::commons::actor::Actor;
use crate::commons::error::Error;
use crate::commons::httpclient::get_bearer_token;
use crate::server::manager::PkiManager;
use super::request::HyperRequest;


//------------ Permission ----------------------------------------------------

/// What an operation requires beyond anonymous access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Permission {
    /// Review requests and manage certificates.
    Agent,

    /// Manage profiles, users and groups.
    Admin,
}


//------------ AuthInfo ------------------------------------------------------

/// The authenticated actor of a request and what it may do.
#[derive(Clone, Debug)]
pub struct AuthInfo {
    actor: Actor,
    agent: bool,
    admin: bool,
}

impl AuthInfo {
    pub fn anonymous() -> Self {
        AuthInfo { actor: Actor::anonymous(), agent: false, admin: false }
    }

    /// Authenticates the bearer token of a request.
    ///
    /// A request without a token is anonymous. A token that is not known
    /// is an error.
    pub fn from_request(
        manager: &PkiManager, request: &HyperRequest
    ) -> PkiResult<Self> {
        let Some(token) = get_bearer_token(request) else {
            return Ok(Self::anonymous())
        };
        let actor = manager.authenticate(&token)?;
        Ok(AuthInfo {
            agent: manager.is_agent(&actor)?,
            admin: manager.is_admin(&actor)?,
            actor,
        })
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        match permission {
            Permission::Agent => self.agent,
            Permission::Admin => self.admin,
        }
    }

    /// Returns an error unless the actor has the permission.
    ///
    /// Anonymous actors get asked to authenticate.
    pub fn check_permission(&self, permission: Permission) -> PkiResult<()> {
        if self.has_permission(permission) {
            Ok(())
        }
        else if self.actor.is_anonymous() {
            Err(Error::ApiInvalidCredentials(
                "authentication required".into()
            ))
        }
        else {
            Err(Error::ApiInsufficientRights(format!(
                "{} lacks {:?} permission", self.actor, permission
            )))
        }
    }
}


//============ Tests =========================================================
