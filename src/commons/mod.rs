//! Common types used by the various parts of the server and client.

pub mod actor;
pub mod error;
pub mod file;
pub mod httpclient;
pub mod storage;

//------------ Response Aliases ----------------------------------------------

pub type PkiResult<T> = std::result::Result<T, error::Error>;
pub type PkiEmptyResult = std::result::Result<(), error::Error>;
