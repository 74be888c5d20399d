//! HTTP responses.

use bytes::Bytes;
use http_body_util::{Either, Empty, Full};
use hyper::StatusCode;
use serde::Serialize;
use crate::api::status::{ErrorResponse, Success};
use crate::commons::error::Error;


//----------- ContentType ----------------------------------------------------

#[derive(Clone, Copy)]
enum ContentType {
    Json,
    Text,
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain",
        }
    }
}


//------------ HyperResponse -------------------------------------------------

pub type HyperResponseBody = Either<Empty<Bytes>, Full<Bytes>>;
pub type HyperResponse = hyper::Response<HyperResponseBody>;


//----------- Response -------------------------------------------------------

struct Response {
    status: StatusCode,
    content_type: ContentType,
    body: Bytes,
    cause: Option<Error>,
}

impl Response {
    fn new(status: StatusCode) -> Self {
        Response {
            status,
            content_type: ContentType::Text,
            body: Bytes::default(),
            cause: None,
        }
    }

    fn finalize(self) -> HttpResponse {
        let mut response = hyper::Response::new(
            if self.body.is_empty() {
                Either::Left(Empty::new())
            }
            else {
                Either::Right(Full::new(self.body))
            }
        );
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(
                self.content_type.as_str()
            ),
        );
        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                hyper::header::WWW_AUTHENTICATE,
                hyper::header::HeaderValue::from_static("Bearer"),
            );
        }
        HttpResponse { response, cause: self.cause }
    }
}


//------------ HttpResponse --------------------------------------------------

#[derive(Debug)]
pub struct HttpResponse {
    response: HyperResponse,
    cause: Option<Error>,
}

impl HttpResponse {
    pub fn into_hyper(self) -> HyperResponse {
        self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// The error this response was created from, for logging.
    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_ref()
    }

    fn ok_response(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        Response {
            status: StatusCode::OK,
            content_type,
            body: body.into(),
            cause: None,
        }.finalize()
    }

    pub fn json<O: Serialize>(object: &O) -> Self {
        match serde_json::to_string(object) {
            Ok(json) => Self::ok_response(ContentType::Json, json),
            Err(e) => Self::response_from_error(Error::JsonError(e)),
        }
    }

    /// Returns the JSON success body for operations without a result.
    pub fn success() -> Self {
        Self::json(&Success)
    }

    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::ok_response(ContentType::Text, body)
    }

    pub fn error(status: StatusCode, error: impl Into<ErrorResponse>) -> Self {
        let body = serde_json::to_string(&error.into()).unwrap_or_default();
        Response {
            status,
            content_type: ContentType::Json,
            body: body.into(),
            cause: None,
        }.finalize()
    }

    pub fn response_from_error(error: Error) -> Self {
        let body = serde_json::to_string(
            &error.to_error_response()
        ).unwrap_or_default();
        Response {
            status: error.status(),
            content_type: ContentType::Json,
            body: body.into(),
            cause: Some(error),
        }.finalize()
    }

    pub fn ok() -> Self {
        Response::new(StatusCode::OK).finalize()
    }

    pub fn not_found() -> Self {
        Response::new(StatusCode::NOT_FOUND).finalize()
    }

    pub fn method_not_allowed() -> Self {
        Response::new(StatusCode::METHOD_NOT_ALLOWED).finalize()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::RequestId;

    #[test]
    fn error_responses() {
        let res = HttpResponse::response_from_error(
            Error::RequestUnknown(RequestId::new(7))
        );
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.cause().is_some());

        let res = HttpResponse::response_from_error(
            Error::ApiInvalidCredentials("unknown token".into())
        );
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.into_hyper().headers()[hyper::header::WWW_AUTHENTICATE],
            "Bearer"
        );
    }

    #[test]
    fn plain_responses() {
        assert_eq!(HttpResponse::ok().status(), StatusCode::OK);
        assert_eq!(
            HttpResponse::method_not_allowed().status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        let res = HttpResponse::success().into_hyper();
        assert_eq!(res.headers()[hyper::header::CONTENT_TYPE], "application/json");
    }
}
