//! Errors of the command line client.

use std::{fmt, io};
use reqwest::StatusCode;
use crate::api::status::ErrorResponse;
use crate::commons::httpclient;


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    /// The server could not be reached or returned an error.
    Http(httpclient::Error),

    /// An input file or argument could not be used.
    Input(String),
}

impl Error {
    pub fn input(msg: impl fmt::Display) -> Self {
        Error::Input(msg.to_string())
    }

    pub fn read_file(path: &str, err: io::Error) -> Self {
        Error::Input(format!("cannot read '{path}': {err}"))
    }

    /// Returns the HTTP status if the server answered with an error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http(err) => err.status(),
            Error::Input(_) => None,
        }
    }

    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            Error::Http(err) => err.error_response(),
            Error::Input(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Http(err) => err.fmt(f),
            Error::Input(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error { }

impl From<httpclient::Error> for Error {
    fn from(err: httpclient::Error) -> Self {
        Error::Http(err)
    }
}
