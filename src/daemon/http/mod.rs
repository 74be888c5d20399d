//! The HTTP side of the daemon.

pub mod auth;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod tls;
pub mod tls_keys;
