//! The certificate server.

pub mod ca;
pub mod certs;
pub mod csr;
pub mod manager;
pub mod policy;
pub mod profiles;
pub mod requests;
pub mod scheduler;
pub mod users;
