//! Dispatch error handling.

use crate::commons::error::Error;
use super::super::response::HttpResponse;


//------------ DispatchError -------------------------------------------------

/// A response cutting dispatch short.
///
/// This type exists so you can use the question mark operator for all sorts
/// of things during dispatch to minimize clutter. Various `From<_>` impls
/// translate errors into the response sent back to the client.
#[derive(Debug)]
pub struct DispatchError(pub HttpResponse);

impl From<HttpResponse> for DispatchError {
    fn from(src: HttpResponse) -> Self {
        Self(src)
    }
}

impl From<Error> for DispatchError {
    fn from(src: Error) -> Self {
        Self(HttpResponse::response_from_error(src))
    }
}
