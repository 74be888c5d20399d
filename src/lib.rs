//! The _pki_ library crate: a profile-driven certificate authority.

pub mod api;
pub mod cli;
pub mod commons;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod deploy;
pub mod server;
