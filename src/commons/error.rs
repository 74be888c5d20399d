//! Defines all server side errors.

use std::{fmt, io};
use hyper::StatusCode;
use crate::api::cert::{CertId, CertStatus};
use crate::api::profile::RawProfileError;
use crate::api::request::{RequestId, RequestStatus};
use crate::api::status::ErrorResponse;
use crate::server::policy::ConstraintViolation;
use super::file::IoError;
use super::storage::KeyValueError;


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    //-----------------------------------------------------------------
    // System Issues
    //-----------------------------------------------------------------
    IoError(IoError),
    Storage(KeyValueError),
    Signer(String),
    HttpsSetup(String),
    Custom(String),

    //-----------------------------------------------------------------
    // General API Client Issues
    //-----------------------------------------------------------------
    JsonError(serde_json::Error),
    InvalidQuery(String),
    UnexpectedBody,
    PostTooBig,
    PostCannotRead,

    //-----------------------------------------------------------------
    // Authentication and Authorization
    //-----------------------------------------------------------------
    ApiInvalidCredentials(String),
    ApiInsufficientRights(String),

    //-----------------------------------------------------------------
    // Profiles
    //-----------------------------------------------------------------
    ProfileUnknown(String),
    ProfileDuplicate(String),
    ProfileInvalidId(String),
    ProfileIdMismatch(String, String),
    ProfileEnabled(String),
    ProfileDisabled(String),
    ProfileNotEnabled(String),
    ProfileInvalid(String, String),
    ProfileRaw(RawProfileError),

    //-----------------------------------------------------------------
    // Certificate Requests
    //-----------------------------------------------------------------
    RequestUnknown(RequestId),
    RequestInvalid(String),
    RequestInvalidCsr(String),
    RequestInvalidNonce(RequestId),
    RequestNotPending(RequestId, RequestStatus),
    RequestConstraint(ConstraintViolation),

    //-----------------------------------------------------------------
    // Certificates
    //-----------------------------------------------------------------
    CertUnknown(CertId),
    CertNotValid(CertId, CertStatus),
    CertNotOnHold(CertId),

    //-----------------------------------------------------------------
    // Users and Groups
    //-----------------------------------------------------------------
    UserUnknown(String),
    UserDuplicate(String),
    UserInvalidId(String),
    GroupUnknown(String),
    GroupDuplicate(String),
    GroupInvalidId(String),
    GroupBuiltIn(String),
    GroupMemberDuplicate(String, String),
    GroupMemberUnknown(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {e}"),
            Error::Storage(e) => write!(f, "Storage error: {e}"),
            Error::Signer(e) => write!(f, "Signing issue: {e}"),
            Error::HttpsSetup(e) => {
                write!(f, "Cannot set up HTTPS: {e}")
            }
            Error::Custom(s) => s.fmt(f),

            Error::JsonError(e) => write!(f, "Invalid JSON: {e}"),
            Error::InvalidQuery(e) => write!(f, "Invalid query: {e}"),
            Error::UnexpectedBody => {
                f.write_str("Unexpected request body")
            }
            Error::PostTooBig => f.write_str("Request body too big"),
            Error::PostCannotRead => {
                f.write_str("Cannot read request body")
            }

            Error::ApiInvalidCredentials(e) => {
                write!(f, "Invalid credentials: {e}")
            }
            Error::ApiInsufficientRights(e) => {
                write!(f, "Insufficient rights: {e}")
            }

            Error::ProfileUnknown(id) => write!(f, "Unknown profile '{id}'"),
            Error::ProfileDuplicate(id) => {
                write!(f, "Profile '{id}' already exists")
            }
            Error::ProfileInvalidId(id) => {
                write!(f, "Invalid profile id '{id}'")
            }
            Error::ProfileIdMismatch(path, body) => {
                write!(
                    f, "Profile id '{body}' does not match profile '{path}'"
                )
            }
            Error::ProfileEnabled(_) => {
                f.write_str("Profile is currently enabled")
            }
            Error::ProfileDisabled(id) => {
                write!(f, "Profile '{id}' is already disabled")
            }
            Error::ProfileNotEnabled(id) => {
                write!(f, "Profile not enabled: {id}")
            }
            Error::ProfileInvalid(id, e) => {
                write!(f, "Invalid profile '{id}': {e}")
            }
            Error::ProfileRaw(e) => write!(f, "Invalid raw profile: {e}"),

            Error::RequestUnknown(id) => write!(f, "Unknown request '{id}'"),
            Error::RequestInvalid(e) => write!(f, "Invalid request: {e}"),
            Error::RequestInvalidCsr(e) => {
                write!(f, "Invalid certificate request: {e}")
            }
            Error::RequestInvalidNonce(id) => {
                write!(f, "Invalid nonce for request '{id}'")
            }
            Error::RequestNotPending(id, status) => {
                write!(f, "Request '{id}' is {status}, not pending")
            }
            Error::RequestConstraint(violation) => violation.fmt(f),

            Error::CertUnknown(id) => {
                write!(f, "Certificate '{id}' not found")
            }
            Error::CertNotValid(id, status) => {
                write!(f, "Certificate '{id}' is {status}")
            }
            Error::CertNotOnHold(id) => {
                write!(f, "Certificate '{id}' is not on hold")
            }

            Error::UserUnknown(id) => write!(f, "Unknown user '{id}'"),
            Error::UserDuplicate(id) => {
                write!(f, "User '{id}' already exists")
            }
            Error::UserInvalidId(id) => write!(f, "Invalid user id '{id}'"),
            Error::GroupUnknown(id) => write!(f, "Unknown group '{id}'"),
            Error::GroupDuplicate(id) => {
                write!(f, "Group '{id}' already exists")
            }
            Error::GroupInvalidId(id) => {
                write!(f, "Invalid group id '{id}'")
            }
            Error::GroupBuiltIn(id) => {
                write!(f, "Group '{id}' is built in")
            }
            Error::GroupMemberDuplicate(group, user) => {
                write!(f, "User '{user}' is already a member of '{group}'")
            }
            Error::GroupMemberUnknown(group, user) => {
                write!(f, "User '{user}' is not a member of '{group}'")
            }
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::IoError(e)
    }
}

impl From<KeyValueError> for Error {
    fn from(e: KeyValueError) -> Self {
        Error::Storage(e)
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Error::Signer(e.to_string())
    }
}

impl From<RawProfileError> for Error {
    fn from(e: RawProfileError) -> Self {
        Error::ProfileRaw(e)
    }
}

impl From<ConstraintViolation> for Error {
    fn from(e: ConstraintViolation) -> Self {
        Error::RequestConstraint(e)
    }
}

impl Error {
    pub fn signer(e: impl fmt::Display) -> Self {
        Error::Signer(e.to_string())
    }

    pub fn custom(msg: impl fmt::Display) -> Self {
        Error::Custom(msg.to_string())
    }

    pub fn io(context: String, err: io::Error) -> Self {
        Error::IoError(IoError::new(context, err))
    }

    pub fn invalid_profile(id: &str, e: impl fmt::Display) -> Self {
        Error::ProfileInvalid(id.to_string(), e.to_string())
    }

    pub fn invalid_csr(e: impl fmt::Display) -> Self {
        Error::RequestInvalidCsr(e.to_string())
    }
}

impl std::error::Error for Error {}


/// Translate an error to an HTTP Status Code
impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::IoError(_)
            | Error::Storage(_)
            | Error::Signer(_)
            | Error::HttpsSetup(_)
            | Error::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,

            Error::ApiInvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Error::ApiInsufficientRights(_) => StatusCode::FORBIDDEN,

            Error::ProfileUnknown(_)
            | Error::RequestUnknown(_)
            | Error::CertUnknown(_)
            | Error::UserUnknown(_)
            | Error::GroupUnknown(_)
            | Error::GroupMemberUnknown(_, _) => StatusCode::NOT_FOUND,

            Error::ProfileDuplicate(_)
            | Error::ProfileEnabled(_)
            | Error::ProfileDisabled(_)
            | Error::RequestNotPending(_, _)
            | Error::CertNotValid(_, _)
            | Error::CertNotOnHold(_)
            | Error::UserDuplicate(_)
            | Error::GroupDuplicate(_)
            | Error::GroupBuiltIn(_)
            | Error::GroupMemberDuplicate(_, _) => StatusCode::CONFLICT,

            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Error::IoError(e) => {
                ErrorResponse::new("sys-io", self).with_cause(e)
            }
            Error::Storage(e) => {
                ErrorResponse::new("sys-store", self).with_cause(e)
            }
            Error::Signer(e) => {
                ErrorResponse::new("sys-signer", self).with_cause(e)
            }
            Error::HttpsSetup(e) => {
                ErrorResponse::new("sys-https", self).with_cause(e)
            }
            Error::Custom(_) => ErrorResponse::new("general-error", self),

            Error::JsonError(e) => {
                ErrorResponse::new("api-invalid-json", self).with_cause(e)
            }
            Error::InvalidQuery(e) => {
                ErrorResponse::new("api-invalid-query", self).with_cause(e)
            }
            Error::UnexpectedBody => {
                ErrorResponse::new("api-unexpected-body", self)
            }
            Error::PostTooBig => ErrorResponse::new("api-post-too-big", self),
            Error::PostCannotRead => {
                ErrorResponse::new("api-post-cannot-read", self)
            }

            Error::ApiInvalidCredentials(e) => {
                ErrorResponse::new("auth-invalid-credentials", self)
                    .with_cause(e)
            }
            Error::ApiInsufficientRights(e) => {
                ErrorResponse::new("auth-insufficient-rights", self)
                    .with_cause(e)
            }

            Error::ProfileUnknown(id) => {
                ErrorResponse::new("profile-unknown", self).with_profile(id)
            }
            Error::ProfileDuplicate(id) => {
                ErrorResponse::new("profile-duplicate", self).with_profile(id)
            }
            Error::ProfileInvalidId(id) => {
                ErrorResponse::new("profile-invalid-id", self)
                    .with_profile(id)
            }
            Error::ProfileIdMismatch(id, _) => {
                ErrorResponse::new("profile-id-mismatch", self)
                    .with_profile(id)
            }
            Error::ProfileEnabled(id) => {
                ErrorResponse::new("profile-enabled", self).with_profile(id)
            }
            Error::ProfileDisabled(id) => {
                ErrorResponse::new("profile-disabled", self).with_profile(id)
            }
            Error::ProfileNotEnabled(id) => {
                ErrorResponse::new("profile-not-enabled", self)
                    .with_profile(id)
            }
            Error::ProfileInvalid(id, e) => {
                ErrorResponse::new("profile-invalid", self)
                    .with_profile(id)
                    .with_cause(e)
            }
            Error::ProfileRaw(e) => {
                ErrorResponse::new("profile-invalid-raw", self).with_cause(e)
            }

            Error::RequestUnknown(id) => {
                ErrorResponse::new("request-unknown", self).with_request(id)
            }
            Error::RequestInvalid(e) => {
                ErrorResponse::new("request-invalid", self).with_cause(e)
            }
            Error::RequestInvalidCsr(e) => {
                ErrorResponse::new("request-invalid-csr", self).with_cause(e)
            }
            Error::RequestInvalidNonce(id) => {
                ErrorResponse::new("request-invalid-nonce", self)
                    .with_request(id)
            }
            Error::RequestNotPending(id, status) => {
                ErrorResponse::new("request-not-pending", self)
                    .with_request(id)
                    .with_arg("status", status)
            }
            Error::RequestConstraint(violation) => {
                ErrorResponse::new("request-constraint-violation", self)
                    .with_arg("policy", &violation.policy)
                    .with_arg("constraint", &violation.constraint)
            }

            Error::CertUnknown(id) => {
                ErrorResponse::new("cert-unknown", self).with_cert(id)
            }
            Error::CertNotValid(id, status) => {
                ErrorResponse::new("cert-not-valid", self)
                    .with_cert(id)
                    .with_arg("status", status)
            }
            Error::CertNotOnHold(id) => {
                ErrorResponse::new("cert-not-on-hold", self).with_cert(id)
            }

            Error::UserUnknown(id) => {
                ErrorResponse::new("user-unknown", self).with_user(id)
            }
            Error::UserDuplicate(id) => {
                ErrorResponse::new("user-duplicate", self).with_user(id)
            }
            Error::UserInvalidId(id) => {
                ErrorResponse::new("user-invalid-id", self).with_user(id)
            }
            Error::GroupUnknown(id) => {
                ErrorResponse::new("group-unknown", self).with_group(id)
            }
            Error::GroupDuplicate(id) => {
                ErrorResponse::new("group-duplicate", self).with_group(id)
            }
            Error::GroupInvalidId(id) => {
                ErrorResponse::new("group-invalid-id", self).with_group(id)
            }
            Error::GroupBuiltIn(id) => {
                ErrorResponse::new("group-built-in", self).with_group(id)
            }
            Error::GroupMemberDuplicate(group, user) => {
                ErrorResponse::new("group-member-duplicate", self)
                    .with_group(group)
                    .with_user(user)
            }
            Error::GroupMemberUnknown(group, user) => {
                ErrorResponse::new("group-member-unknown", self)
                    .with_group(group)
                    .with_user(user)
            }
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn verify(expected: &str, error: Error, status: StatusCode) {
        assert_eq!(error.status(), status);
        assert_eq!(error.to_error_response().label, expected);
    }

    #[test]
    fn error_labels_and_status() {
        verify(
            "profile-unknown",
            Error::ProfileUnknown("foo".into()),
            StatusCode::NOT_FOUND,
        );
        verify(
            "profile-enabled",
            Error::ProfileEnabled("caUserCert".into()),
            StatusCode::CONFLICT,
        );
        verify(
            "request-invalid-nonce",
            Error::RequestInvalidNonce(RequestId::new(3)),
            StatusCode::BAD_REQUEST,
        );
        verify(
            "auth-insufficient-rights",
            Error::ApiInsufficientRights("admin".into()),
            StatusCode::FORBIDDEN,
        );
        verify(
            "auth-invalid-credentials",
            Error::ApiInvalidCredentials("token".into()),
            StatusCode::UNAUTHORIZED,
        );
        verify(
            "sys-io",
            Error::io(
                "cannot read".into(),
                io::Error::new(io::ErrorKind::Other, "boom")
            ),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        verify(
            "cert-not-valid",
            Error::CertNotValid(CertId::new(5), CertStatus::Revoked),
            StatusCode::CONFLICT,
        );
    }

    #[test]
    fn profile_enabled_message() {
        let response = Error::ProfileEnabled("caUserCert".into())
            .to_error_response();
        assert_eq!(response.msg, "Profile is currently enabled");
        assert_eq!(response.args.get("profile").unwrap(), "caUserCert");
    }
}
