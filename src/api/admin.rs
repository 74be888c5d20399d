//! Types for server administration.

use std::{fmt, str};
use std::convert::Infallible;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::cert::CertId;


//------------ Token ---------------------------------------------------------

/// An authentication token.
#[derive(Clone, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Token(String);

impl Token {
    /// Creates a new random token of 32 bytes, hex encoded.
    pub fn random() -> Self {
        Token(hex::encode(rand::random::<[u8; 32]>()))
    }

    /// Returns the SHA-256 digest of the token, hex encoded.
    ///
    /// Only the digest of a user token is ever stored.
    pub fn digest(&self) -> Result<String, openssl::error::ErrorStack> {
        let digest = openssl::hash::hash(
            openssl::hash::MessageDigest::sha256(), self.0.as_bytes()
        )?;
        Ok(hex::encode(digest))
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token(s)
    }
}

impl str::FromStr for Token {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Token(s.to_string()))
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}


//------------ ServerInfo ----------------------------------------------------

/// Information about the running server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerInfo {
    /// The version of the server software.
    pub version: String,

    /// When the server was started.
    pub started: DateTime<Utc>,

    /// The subject of the CA signing certificate.
    #[serde(rename = "caSubjectDN")]
    pub ca_subject_dn: String,

    /// The serial number of the CA signing certificate.
    #[serde(rename = "caSerial")]
    pub ca_serial: CertId,
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Started: {}", self.started.to_rfc3339())?;
        writeln!(f, "CA Subject DN: {}", self.ca_subject_dn)?;
        writeln!(f, "CA Serial Number: {}", self.ca_serial)
    }
}


//------------ Paging --------------------------------------------------------

/// Paging of plain listings such as profiles, users and groups.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Paging {
    pub start: usize,
    pub size: Option<usize>,
}

impl Paging {
    pub fn from_query(query: Option<&str>) -> Result<Self, String> {
        let mut res = Paging::default();
        for (key, value) in url::form_urlencoded::parse(
            query.unwrap_or("").as_bytes()
        ) {
            match key.as_ref() {
                "start" => {
                    res.start = value.parse().map_err(|_| {
                        format!("invalid start '{value}'")
                    })?
                }
                "size" => {
                    res.size = Some(value.parse().map_err(|_| {
                        format!("invalid size '{value}'")
                    })?)
                }
                _ => { }
            }
        }
        Ok(res)
    }

    pub fn to_query(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        if self.start > 0 {
            ser.append_pair("start", &self.start.to_string());
        }
        if let Some(size) = self.size {
            ser.append_pair("size", &size.to_string());
        }
        ser.finish()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_differ() {
        let one = Token::random();
        let two = Token::random();
        assert_ne!(one, two);
        assert_eq!(one.as_ref().len(), 64);
    }

    #[test]
    fn digest_is_stable_and_redacted_in_debug() {
        let token = Token::from("secret");
        assert_eq!(token.digest().unwrap(), token.digest().unwrap());
        assert_ne!(token.digest().unwrap(), "secret");
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[test]
    fn paging_query() {
        let paging = Paging::from_query(Some("start=5&size=2&x=y")).unwrap();
        assert_eq!(paging, Paging { start: 5, size: Some(2) });
        assert_eq!(paging.to_query(), "start=5&size=2");
        assert!(Paging::from_query(Some("size=many")).is_err());
        assert_eq!(Paging::from_query(None).unwrap(), Paging::default());
    }
}
