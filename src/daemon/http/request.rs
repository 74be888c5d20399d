//! HTTP requests.

use std::{fmt, str};
use std::borrow::Cow;
use std::str::FromStr;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::Method;
use hyper::body::Body;
use hyper::header::USER_AGENT;
use hyper::http::uri::PathAndQuery;
use percent_encoding::percent_decode;
use serde::de::DeserializeOwned;
use crate::api::status::ErrorResponse;
use crate::commons::error::Error;
use crate::constants::HTTP_USER_AGENT_TRUNCATE;
use crate::server::manager::PkiManager;
use super::auth::{AuthInfo, Permission};
use super::response::HttpResponse;
use super::server::HttpServer;


//------------ HyperRequest --------------------------------------------------

/// A type alias for the request we receive from Hyper.
pub type HyperRequest = hyper::Request<hyper::body::Incoming>;


//------------ Request -------------------------------------------------------

/// An enriched request.
pub struct Request<'a> {
    /// The underlying raw request.
    request: HyperRequest,

    /// The server providing access to the certificate manager.
    server: &'a HttpServer,

    /// Authentication information for the request.
    auth: AuthInfo,
}

impl<'a> Request<'a> {
    pub fn new(
        request: HyperRequest, server: &'a HttpServer, auth: AuthInfo,
    ) -> Self {
        Self { request, server, auth }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Checks whether the request is a GET or returns an error response.
    pub fn check_get(&self) -> Result<(), HttpResponse> {
        self.check_method(Method::GET)
    }

    pub fn check_post(&self) -> Result<(), HttpResponse> {
        self.check_method(Method::POST)
    }

    pub fn check_put(&self) -> Result<(), HttpResponse> {
        self.check_method(Method::PUT)
    }

    pub fn check_delete(&self) -> Result<(), HttpResponse> {
        self.check_method(Method::DELETE)
    }

    fn check_method(&self, method: Method) -> Result<(), HttpResponse> {
        if *self.request.method() == method {
            Ok(())
        }
        else {
            Err(HttpResponse::method_not_allowed())
        }
    }

    /// Returns the current request path.
    pub fn path(&self) -> Result<RequestPath, InvalidPath> {
        RequestPath::from_request(self)
    }

    /// Returns the raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.request.uri().query()
    }

    /// Parses the query string using the given parser.
    ///
    /// Parse errors are turned into a bad request response.
    pub fn parse_query<T>(
        &self, parse: impl FnOnce(Option<&str>) -> Result<T, String>
    ) -> Result<T, Error> {
        parse(self.query()).map_err(Error::InvalidQuery)
    }

    /// Returns the user agent header if present.
    pub fn user_agent(&self) -> Option<String> {
        let value = self.request.headers().get(&USER_AGENT)?;
        // HeaderValue::to_str only succeeds for visible ASCII, so
        // truncating at any byte is fine.
        value.to_str().ok().map(|s| {
            if s.len() > HTTP_USER_AGENT_TRUNCATE {
                s[..HTTP_USER_AGENT_TRUNCATE].to_string()
            }
            else {
                s.to_string()
            }
        })
    }

    pub fn auth(&self) -> &AuthInfo {
        &self.auth
    }

    /// Checks for permissions.
    ///
    /// Returns an appropriate error response if the permissions are not met.
    pub fn check_permission(
        &self, permission: Permission
    ) -> Result<(), HttpResponse> {
        self.auth.check_permission(permission)
            .map_err(HttpResponse::response_from_error)
    }

    /// Checks the permissions and progresses to the next processing stage.
    pub fn proceed_permitted(
        self, permission: Permission,
    ) -> Result<(AuthedRequest<'a>, AuthInfo), HttpResponse> {
        self.check_permission(permission)?;
        Ok(self.proceed_unchecked())
    }

    /// Permits the request to the next processing stage without requiring
    /// any permissions whatsoever.
    pub fn proceed_unchecked(self) -> (AuthedRequest<'a>, AuthInfo) {
        (
            AuthedRequest { request: self.request, server: self.server },
            self.auth
        )
    }
}


//------------ AuthedRequest -------------------------------------------------

/// A request that has been checked for the correct access permissions.
///
/// This type allows access to the request’s body and, by way of reading the
/// body or forcing it to be empty, to the certificate manager.
pub struct AuthedRequest<'a> {
    request: HyperRequest,
    server: &'a HttpServer,
}

impl<'a> AuthedRequest<'a> {
    /// Ensures the body is empty.
    pub fn empty(self) -> Result<&'a PkiManager, Error> {
        if self.request.body().size_hint().upper() != Some(0) {
            return Err(Error::UnexpectedBody)
        }
        Ok(self.server.manager())
    }

    /// Returns the raw bytes of the request body.
    pub async fn read_bytes(self) -> Result<(&'a PkiManager, Bytes), Error> {
        let limit = self.server.post_limit();

        // A Content-Length over the limit is rejected right away, anything
        // else that turns out too long fails while collecting.
        if self.request.body().size_hint().lower() > limit {
            return Err(Error::PostTooBig);
        }

        let bytes = Limited::new(
            self.request.into_body(),
            limit.try_into().unwrap_or(usize::MAX),
        ).collect().await.map_err(|_| Error::PostCannotRead)?.to_bytes();
        Ok((self.server.manager(), bytes))
    }

    /// Gets a JSON object from the body.
    pub async fn read_json<T: DeserializeOwned>(
        self
    ) -> Result<(&'a PkiManager, T), Error> {
        let (manager, bytes) = self.read_bytes().await?;
        let json = serde_json::from_slice(&bytes).map_err(Error::JsonError)?;
        Ok((manager, json))
    }
}


//------------ RequestPath ---------------------------------------------------

/// The path of a request’s URI.
///
/// It primarily allows iterating over the path segments. Note that because it
/// needs to be a “borrowing iterator,” it cannot implement the normal
/// `Iterator` trait.
#[derive(Debug, Clone)]
pub struct RequestPath {
    path: Result<PathAndQuery, String>,
}

impl RequestPath {
    fn from_request(request: &Request) -> Result<Self, InvalidPath> {
        let path = if let Cow::Owned(some) = percent_decode(
            request.request.uri().path().as_bytes()
        ).decode_utf8().map_err(|_| InvalidPath)? {
            Err(some)
        }
        else {
            Ok(
                request.request.uri().path_and_query()
                    .ok_or(InvalidPath)?.clone()
            )
        };
        Ok(Self { path })
    }

    pub fn as_str(&self) -> &str {
        match self.path.as_ref() {
            Ok(path) => path.path(),
            Err(path) => path.as_str()
        }
    }

    pub fn iter(&self) -> PathIter {
        PathIter::new(self.as_str())
    }
}

impl AsRef<str> for RequestPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}


//------------ PathIter ------------------------------------------------------

#[derive(Debug)]
pub struct PathIter<'a> {
    full: &'a str,
    remaining: Option<&'a str>,
}

impl<'a> PathIter<'a> {
    fn new(path: &'a str) -> Self {
        Self {
            full: path,
            remaining: Some(path.strip_prefix('/').unwrap_or(path))
        }
    }

    /// Returns a copy with a possible trailing slash removed.
    pub fn strip_trailing_slash(&self) -> Self {
        // Some("") means there _was_ a trailing slash and we are now just
        // past it, i.e., the path is exhausted.
        let remaining = match self.remaining {
            Some("") | None => None,
            Some(remaining) => {
                Some(remaining.strip_suffix('/').unwrap_or(remaining))
            }
        };
        Self {
            full: self.full.strip_suffix('/').unwrap_or(self.full),
            remaining
        }
    }

    pub fn full(&self) -> &str {
        self.full
    }

    /// Checks that the path has been exhausted.
    ///
    /// Returns a 404 error response if it isn’t.
    pub fn check_exhausted(&self) -> Result<(), HttpResponse> {
        if self.remaining.is_some() {
            Err(HttpResponse::not_found())
        }
        else {
            Ok(())
        }
    }

    /// Parses the next segment as the given type or returns a Not Found.
    pub fn parse_next<T: FromStr>(&mut self) -> Result<T, HttpResponse> {
        T::from_str(
            self.next().ok_or_else(HttpResponse::not_found)?
        ).map_err(|_| {
            HttpResponse::not_found()
        })
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining?;
        let slash = match remaining.find('/') {
            Some(pos) => pos,
            None => {
                self.remaining = None;
                return Some(remaining)
            }
        };
        self.remaining = Some(&remaining[slash + 1..]);
        Some(&remaining[..slash])
    }
}


//------------ InvalidPath ---------------------------------------------------

/// An error happened while preparing the request path.
#[derive(Clone, Copy, Debug)]
pub struct InvalidPath;

impl From<InvalidPath> for ErrorResponse {
    fn from(_: InvalidPath) -> Self {
        Self::new("invalid-path", "The request path was invalid.")
    }
}

impl fmt::Display for InvalidPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid request path")
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    impl RequestPath {
        fn test_str(s: &str) -> Self {
            Self {
                path: Err(
                    percent_decode(
                        s.as_bytes()
                    ).decode_utf8().unwrap().into_owned()
                )
            }
        }
    }

    #[test]
    fn request_path_next() {
        let path = RequestPath::test_str("/ca/rest/profiles/");
        let mut path = path.iter();
        assert_eq!(path.next(), Some("ca"));
        assert_eq!(path.next(), Some("rest"));
        assert_eq!(path.next(), Some("profiles"));
        assert_eq!(path.next(), Some(""));
        assert_eq!(path.next(), None);

        let path = RequestPath::test_str("/ca/rest/admin/groups/Certificate%20Manager%20Agents");
        let mut path = path.iter();
        assert_eq!(path.nth(3), Some("groups"));
        assert_eq!(path.next(), Some("Certificate Manager Agents"));
        assert_eq!(path.next(), None);
    }

    #[test]
    fn strip_trailing_slash_and_parse() {
        let path = RequestPath::test_str("/certs/0x1f/");
        let mut path = path.iter();
        assert_eq!(path.next(), Some("certs"));
        let mut path = path.strip_trailing_slash();
        assert_eq!(path.full(), "/certs/0x1f");
        let serial: crate::api::cert::CertId = path.parse_next().unwrap();
        assert_eq!(serial.to_u64(), 0x1f);
        assert!(path.check_exhausted().is_ok());

        let path = RequestPath::test_str("/certs/nope");
        let mut path = path.iter();
        path.next();
        assert!(path.parse_next::<crate::api::cert::CertId>().is_err());
    }
}
