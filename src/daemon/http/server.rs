//! The HTTP server.
//!
//! Authenticates incoming requests, hands them to the dispatcher and logs
//! the outcome.

use std::convert::Infallible;
use std::env;
use std::sync::Arc;
use hyper::StatusCode;
use log::{debug, error, info, log_enabled, warn};
use crate::commons::PkiResult;
use crate::config::Config;
use crate::constants::PKI_ENV_HTTP_LOG_INFO;
use crate::server::manager::PkiManager;
use super::auth::AuthInfo;
use super::dispatch::{DispatchError, dispatch_request};
use super::request::{HyperRequest, Request};
use super::response::{HttpResponse, HyperResponse};


//------------ HttpServer ----------------------------------------------------

pub struct HttpServer {
    manager: Arc<PkiManager>,
    post_limit: u64,
    log_info: bool,
}

impl HttpServer {
    pub fn new(
        manager: Arc<PkiManager>, config: Arc<Config>
    ) -> PkiResult<Arc<Self>> {
        Ok(Arc::new(HttpServer {
            manager,
            post_limit: config.post_limit_api,
            log_info: env::var(PKI_ENV_HTTP_LOG_INFO).is_ok(),
        }))
    }

    pub fn manager(&self) -> &PkiManager {
        &self.manager
    }

    pub fn post_limit(&self) -> u64 {
        self.post_limit
    }

    /// Processes a single request.
    ///
    /// Never fails: all errors are turned into responses.
    pub async fn process_request(
        &self, request: HyperRequest
    ) -> Result<HyperResponse, Infallible> {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = self.dispatch(request).await;
        self.log_response(&method, &uri, &response);
        Ok(response.into_hyper())
    }

    async fn dispatch(&self, request: HyperRequest) -> HttpResponse {
        let auth = match AuthInfo::from_request(&self.manager, &request) {
            Ok(auth) => auth,
            Err(err) => return HttpResponse::response_from_error(err),
        };
        let request = Request::new(request, self, auth);
        let path = match request.path() {
            Ok(path) => path,
            Err(err) => {
                return HttpResponse::error(StatusCode::BAD_REQUEST, err)
            }
        };
        match dispatch_request(request, path.iter()).await {
            Ok(response) => response,
            Err(DispatchError(response)) => response,
        }
    }

    fn log_response(
        &self,
        method: &hyper::Method,
        uri: &hyper::Uri,
        response: &HttpResponse,
    ) {
        let status = response.status();
        if let Some(cause) = response.cause() {
            if status.is_server_error() {
                error!("{method} {uri} {}: {cause}", status.as_u16());
            }
            else {
                warn!("{method} {uri} {}: {cause}", status.as_u16());
            }
        }
        else if self.log_info {
            info!("{method} {uri} {}", status.as_u16());
        }
        else if log_enabled!(log::Level::Debug) {
            debug!("{method} {uri} {}", status.as_u16());
        }
    }
}
