//! Utilities for dealing with TLS.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{error, fmt, io};
use tokio_rustls::rustls::KeyLogFile;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

pub use tokio_rustls::rustls::ServerConfig;


//------------ Constants -----------------------------------------------------

const SSLKEYLOGFILE_ENV_VAR_NAME: &str = "SSLKEYLOGFILE";


//------------ create_server_config ------------------------------------------

/// Creates the TLS server config.
pub fn create_server_config(
    key_path: &Path,
    cert_path: &Path,
) -> Result<ServerConfig, TlsConfigError> {
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(read_certs(cert_path)?, read_key(key_path)?)
        .map_err(|err| TlsConfigError::other(ErrorKind::Tls, err))?;

    // See: https://wiki.wireshark.org/TLS#tls-decryption
    if std::env::var(SSLKEYLOGFILE_ENV_VAR_NAME).is_ok() {
        config.key_log = Arc::new(KeyLogFile::new());
    }

    Ok(config)
}

/// Reads the certificates from the given PEM file.
fn read_certs(
    path: &Path,
) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let file = File::open(path).map_err(|err| {
        TlsConfigError::new(ErrorKind::Cert(path.into()), err)
    })?;
    let certs = rustls_pemfile::certs(&mut io::BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            TlsConfigError::new(ErrorKind::Cert(path.into()), err)
        })?;
    if certs.is_empty() {
        return Err(TlsConfigError::other(
            ErrorKind::Cert(path.into()),
            "file does not contain any certificates",
        ))
    }
    Ok(certs)
}

/// Reads a private key from the given PEM file.
///
/// The key may be a PKCS#1 RSA private key, a PKCS#8 private key, or a
/// SEC1 encoded EC private key. All other PEM items are ignored.
///
/// Errors out if opening or reading the file fails or if there isn’t exactly
/// one recognized private key in the file.
fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    use rustls_pemfile::Item::*;

    let mut key_file = io::BufReader::new(File::open(path).map_err(|err| {
        TlsConfigError::new(ErrorKind::Key(path.into()), err)
    })?);

    let mut key = None;

    while let Some(item) = rustls_pemfile::read_one(&mut key_file).transpose() {
        let item = item.map_err(|err| {
            TlsConfigError::new(ErrorKind::Key(path.into()), err)
        })?;

        let bits = match item {
            Pkcs1Key(bits) => bits.into(),
            Pkcs8Key(bits) => bits.into(),
            Sec1Key(bits) => bits.into(),
            _ => continue,
        };
        if key.is_some() {
            return Err(TlsConfigError::other(
                ErrorKind::Key(path.into()),
                "file contains multiple keys",
            ));
        }
        key = Some(bits)
    }

    key.ok_or_else(|| {
        TlsConfigError::other(
            ErrorKind::Key(path.into()),
            "file does not contain any usable keys",
        )
    })
}


//------------ TlsConfigError ------------------------------------------------

/// Represents errors that can occur building the TLS config.
#[derive(Debug)]
pub struct TlsConfigError {
    kind: ErrorKind,
    err: io::Error,
}

#[derive(Clone, Debug)]
enum ErrorKind {
    Key(PathBuf),
    Cert(PathBuf),
    Tls,
}

impl TlsConfigError {
    fn new(kind: ErrorKind, err: io::Error) -> Self {
        Self { kind, err }
    }

    fn other(
        kind: ErrorKind,
        err: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self { kind, err: io::Error::other(err) }
    }
}

impl fmt::Display for TlsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Key(ref path) => write!(
                f, "Error in TLS key file {}: {}", path.display(), self.err
            ),
            ErrorKind::Cert(ref path) => write!(
                f, "Error in TLS certificate file {}: {}",
                path.display(), self.err
            ),
            ErrorKind::Tls => {
                write!(f, "Error in TLS configuration: {}", self.err)
            }
        }
    }
}

impl error::Error for TlsConfigError {}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::tls_keys;

    #[test]
    fn server_config_from_generated_files() {
        let dir = tempfile::tempdir().unwrap();
        tls_keys::create_key_cert_if_needed(dir.path()).unwrap();
        create_server_config(
            &tls_keys::key_file_path(dir.path()),
            &tls_keys::cert_file_path(dir.path()),
        ).unwrap();
    }

    #[test]
    fn missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.pem");
        let cert = dir.path().join("cert.pem");
        let err = create_server_config(&key, &cert).unwrap_err();
        assert!(err.to_string().contains("certificate file"));

        std::fs::write(&cert, b"").unwrap();
        assert!(create_server_config(&key, &cert).is_err());
    }
}
