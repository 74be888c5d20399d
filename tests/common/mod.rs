#![allow(dead_code)] // Different tests use different parts.

use std::net::TcpListener;
use std::time::Duration;
use log::{debug, error};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509ReqBuilder;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;
use pki::api::admin::Token;
use pki::api::request::CertEnrollmentRequest;
use pki::cli::PkiClient;
use pki::config::Config;
use pki::daemon::start::start_pki_daemon;
use pki::server::csr::PKCS10;
use pki::server::policy::{CERT_REQ_INPUT, DistinguishedName};

pub const ADMIN_TOKEN: &str = "secret";


//------------ PkiServer -----------------------------------------------------

/// A test PKI server.
pub struct PkiServer {
    join: JoinHandle<()>,
    client: PkiClient,
    _data_dir: TempDir,
}

impl PkiServer {
    /// Starts a test server with memory storage.
    ///
    /// The function waits for the server to become ready.
    pub async fn start() -> Self {
        Self::start_with_config(|_| { }).await
    }

    /// Starts a test server with a modified config.
    pub async fn start_with_config(op: impl FnOnce(&mut Config)) -> Self {
        let data_dir = TempDir::new().unwrap();
        let port = free_port();
        let mut config = Config::test(
            data_dir.path(), port, Token::from(ADMIN_TOKEN)
        );
        op(&mut config);
        let uri = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let client = PkiClient::new(uri, Some(Token::from(ADMIN_TOKEN)));

        let (tx, running) = oneshot::channel();
        let join = tokio::spawn(async move {
            if let Err(err) = start_pki_daemon(config.into(), Some(tx)).await {
                error!("PKI server failed to start: {err}");
            }
        });
        assert!(running.await.is_ok());
        match timeout(Duration::from_secs(5), client.health()).await {
            Ok(Ok(_)) => debug!("health check succeeded"),
            Ok(Err(err)) => panic!("health check failed: {err}"),
            Err(_) => panic!("health check timed out"),
        }
        PkiServer { join, client, _data_dir: data_dir }
    }

    /// Returns a client using the admin token.
    pub fn client(&self) -> &PkiClient {
        &self.client
    }

    /// Returns a client using the given token or none at all.
    pub fn client_with(&self, token: Option<Token>) -> PkiClient {
        PkiClient::new(self.client.server().clone(), token)
    }

    pub fn anonymous(&self) -> PkiClient {
        self.client_with(None)
    }
}

impl Drop for PkiServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}


//------------ Certificate requests ------------------------------------------

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// Creates a PEM encoded PKCS #10 request for a subject such as
/// `UID=jdoe,O=EXAMPLE`.
pub fn make_csr(subject: &str) -> String {
    let key = ec_key();
    let name: DistinguishedName = subject.parse().unwrap();
    let mut builder = X509ReqBuilder::new().unwrap();
    builder.set_subject_name(&name.to_x509().unwrap()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
}

/// Fetches the template of a profile and fills in a request.
pub async fn enrollment(
    client: &PkiClient, profile: &str, subject: &str
) -> CertEnrollmentRequest {
    let mut request = client.request_template(profile).await.unwrap();
    request.set_attribute_value(CERT_REQ_INPUT, "cert_request_type", PKCS10);
    request.set_attribute_value(
        CERT_REQ_INPUT, "cert_request", &make_csr(subject)
    );
    request
}
