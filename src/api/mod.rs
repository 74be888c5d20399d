//! Data types used on the REST API.
//!
//! These types are shared between the server and the command line client.

pub mod admin;
pub mod cert;
pub mod profile;
pub mod request;
pub mod status;
pub mod user;
