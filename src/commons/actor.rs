//! The entity performing an operation.

use std::fmt;
use std::sync::Arc;
use crate::constants::{ACTOR_ID_ADMIN, ACTOR_ID_ANON, ACTOR_ID_SYSTEM};


//------------ Actor ---------------------------------------------------------

/// An actor is the user or system component performing an action.
///
/// The name of the actor is recorded on requests and certificates, e.g. as
/// the `enabledBy` of a profile or the `RevokedBy` of a certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Actor {
    name: Arc<str>,
    kind: ActorKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ActorKind {
    /// A request without credentials.
    Anonymous,

    /// The server itself, e.g. the scheduler.
    System,

    /// The holder of the admin token.
    Admin,

    /// A user authenticated by a user token.
    User,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::new(ACTOR_ID_ANON, ActorKind::Anonymous)
    }

    pub fn system() -> Self {
        Self::new(ACTOR_ID_SYSTEM, ActorKind::System)
    }

    pub fn admin() -> Self {
        Self::new(ACTOR_ID_ADMIN, ActorKind::Admin)
    }

    pub fn user(name: &str) -> Self {
        Self::new(name, ActorKind::User)
    }

    fn new(name: &str, kind: ActorKind) -> Self {
        Actor { name: name.into(), kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind == ActorKind::Anonymous
    }

    pub fn is_admin(&self) -> bool {
        self.kind == ActorKind::Admin
    }

    /// Returns whether this is a stored user.
    pub fn is_user(&self) -> bool {
        self.kind == ActorKind::User
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}
