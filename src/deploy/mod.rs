//! Deploying server instances.

pub mod ini;
pub mod master;
pub mod spawn;
pub mod template;

use std::fmt;
use crate::commons::file::IoError;
use self::ini::IniError;
use self::master::Subsystem;
use self::template::TemplateError;


//------------ DeployError ---------------------------------------------------

#[derive(Debug)]
pub enum DeployError {
    Io(IoError),
    Ini(IniError),
    Template(TemplateError),

    /// A key of the master dictionary has an unusable value.
    Invalid(String, String),

    UnsupportedSubsystem(Subsystem),
    InstanceExists(String),
    InstanceUnknown(String),
    Manifest(String),
}

impl DeployError {
    pub fn invalid(key: &str, msg: impl fmt::Display) -> Self {
        DeployError::Invalid(key.to_string(), msg.to_string())
    }
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeployError::Io(err) => err.fmt(f),
            DeployError::Ini(err) => write!(f, "deployment file: {err}"),
            DeployError::Template(err) => write!(f, "template: {err}"),
            DeployError::Invalid(key, msg) => write!(f, "{key}: {msg}"),
            DeployError::UnsupportedSubsystem(subsystem) => {
                write!(f, "subsystem {subsystem} is not supported")
            }
            DeployError::InstanceExists(name) => {
                write!(f, "instance '{name}' already exists")
            }
            DeployError::InstanceUnknown(name) => {
                write!(f, "instance '{name}' does not exist")
            }
            DeployError::Manifest(msg) => write!(f, "manifest: {msg}"),
        }
    }
}

impl std::error::Error for DeployError { }

impl From<IoError> for DeployError {
    fn from(err: IoError) -> Self {
        DeployError::Io(err)
    }
}

impl From<IniError> for DeployError {
    fn from(err: IniError) -> Self {
        DeployError::Ini(err)
    }
}

impl From<TemplateError> for DeployError {
    fn from(err: TemplateError) -> Self {
        DeployError::Template(err)
    }
}
