//! The certificate server daemon.

pub mod http;
pub mod start;
