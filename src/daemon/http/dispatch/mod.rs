//! Dispatching of HTTP requests.

pub use self::error::DispatchError;
pub use self::root::dispatch_request;

mod admin;
mod agent;
mod certrequests;
mod certs;
mod error;
mod profiles;
mod rest;
mod root;
