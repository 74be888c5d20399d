//! Error reporting.

use std::fmt;
use std::collections::HashMap;
use serde::{Deserialize, Serialize, Serializer};
use serde::ser::SerializeStruct;


//------------ Success -------------------------------------------------------

/// An empty, successful API response.
///
/// This type needs to be used instead of `()` to make conversion into
/// [`Report`][crate::cli::report::Report] work.
#[derive(Clone, Copy, Debug)]
pub struct Success;

impl fmt::Display for Success {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Ok")
    }
}

impl Serialize for Success {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        let mut serializer = serializer.serialize_struct("Success", 1)?;
        serializer.serialize_field("status", "Ok")?;
        serializer.end()
    }
}


//------------ ErrorResponse -------------------------------------------------

/// An API error response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// The error label.
    pub label: String,

    /// The error message.
    pub msg: String,

    /// Arguments with details about the error.
    #[serde(default)]
    pub args: HashMap<String, String>,
}

impl ErrorResponse {
    pub fn new(label: &str, msg: impl fmt::Display) -> Self {
        ErrorResponse {
            label: label.to_string(),
            msg: msg.to_string(),
            args: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cause(self, cause: impl fmt::Display) -> Self {
        self.with_arg("cause", cause)
    }

    pub fn with_profile(self, profile: impl fmt::Display) -> Self {
        self.with_arg("profile", profile)
    }

    pub fn with_request(self, request: impl fmt::Display) -> Self {
        self.with_arg("request", request)
    }

    pub fn with_cert(self, serial: impl fmt::Display) -> Self {
        self.with_arg("cert", serial)
    }

    pub fn with_user(self, user: impl fmt::Display) -> Self {
        self.with_arg("user", user)
    }

    pub fn with_group(self, group: impl fmt::Display) -> Self {
        self.with_arg("group", group)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(&self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{}: {}", self.label, self.msg),
        }
    }
}


//============ Tests =========================================================
