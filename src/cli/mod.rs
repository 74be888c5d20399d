//! The command line client.

pub mod client;
pub mod error;
pub mod options;
pub mod report;

pub use self::client::PkiClient;
pub use self::error::Error;
