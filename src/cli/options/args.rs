//! Types for argument values.

use std::{error, fmt, fs, io};
use std::fs::File;
use std::io::BufReader;
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use serde::de::DeserializeOwned;
use crate::cli::error::Error;


//------------ JsonFile ------------------------------------------------------

/// A JSON file parsed while processing the arguments.
///
/// `Msg` names the content for error messages.
#[derive(Clone, Debug)]
pub struct JsonFile<T, Msg> {
    pub content: T,
    marker: PhantomData<Msg>,
}

impl<T, Msg> FromStr for JsonFile<T, Msg>
where
    T: DeserializeOwned,
    Msg: Default + fmt::Display
{
    type Err = JsonFileError<Msg>;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        serde_json::from_reader::<_, T>(
            BufReader::new(
                File::open(path).map_err(|err| {
                    JsonFileError::Io(path.into(), Default::default(), err)
                })?
            )
        ).map(|content| {
            Self { content, marker: PhantomData }
        }).map_err(|err| {
            JsonFileError::Parse(path.into(), Default::default(), err)
        })
    }
}


//------------ Messages ------------------------------------------------------

macro_rules! file_msg {
    ( $( $name:ident => $text:expr, )* ) => {
        $(
            #[derive(Clone, Copy, Debug, Default)]
            pub struct $name;

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str($text)
                }
            }
        )*
    }
}

file_msg! {
    EnrollmentMsg => "enrollment request",
    ReviewMsg => "review",
}


//------------ KeyValue ------------------------------------------------------

/// An argument of the form `key=value`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl FromStr for KeyValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(KeyValue {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(format!("expected key=value, got '{s}'")),
        }
    }
}


//------------ Reading files -------------------------------------------------

/// Reads a text file given on the command line.
pub fn read_text(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|err| {
        Error::read_file(&path.display().to_string(), err)
    })
}

/// Reads and parses a JSON file given on the command line.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    serde_json::from_str(&read_text(path)?).map_err(|err| {
        Error::input(format!("cannot parse '{}': {err}", path.display()))
    })
}


//============ ErrorTypes ====================================================

//------------ JsonFileError -------------------------------------------------

#[derive(Debug)]
pub enum JsonFileError<Msg> {
    Io(String, Msg, io::Error),
    Parse(String, Msg, serde_json::Error),
}

impl<Msg: fmt::Display> fmt::Display for JsonFileError<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(path, msg, err) => {
                write!(f, "Failed to read {msg} file '{path}': {err}")
            }
            Self::Parse(path, msg, err) => {
                write!(f, "Failed to parse {msg} file '{path}': {err}")
            }
        }
    }
}

impl<Msg: fmt::Display + fmt::Debug> error::Error for JsonFileError<Msg> { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::api::request::CertEnrollmentRequest;

    #[test]
    fn key_value() {
        assert_eq!(
            "sn_uid = jdoe".parse(),
            Ok(KeyValue { key: "sn_uid".into(), value: "jdoe".into() })
        );
        assert_eq!(
            "sn_cn=a=b".parse::<KeyValue>().unwrap().value, "a=b"
        );
        assert!("jdoe".parse::<KeyValue>().is_err());
        assert!("=jdoe".parse::<KeyValue>().is_err());
    }

    #[test]
    fn json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ProfileID": "caUserCert"}}"#).unwrap();
        let path = file.path().to_str().unwrap();
        let parsed = JsonFile::<CertEnrollmentRequest, EnrollmentMsg>
            ::from_str(path).unwrap();
        assert_eq!(parsed.content.profile_id, "caUserCert");

        let err = JsonFile::<CertEnrollmentRequest, EnrollmentMsg>
            ::from_str("/no/such/file").unwrap_err();
        assert!(err.to_string().starts_with(
            "Failed to read enrollment request file '/no/such/file'"
        ));
        assert!(read_text(Path::new("/no/such/file")).is_err());
    }
}
