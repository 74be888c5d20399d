//! Creating a private key and certificate for HTTPS in case they are not
//! provided.

use std::path::{Path, PathBuf};
use std::fmt;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509Builder, X509NameBuilder};
use openssl::x509::extension::{
    BasicConstraints, SubjectAlternativeName, SubjectKeyIdentifier,
};
use crate::commons::file::{self, IoError};
use crate::constants::HTTPS_SUB_DIR;

const KEY_SIZE: u32 = 2048;
const VALIDITY_DAYS: u32 = 36500;
pub const KEY_FILE: &str = "key.pem";
pub const CERT_FILE: &str = "cert.pem";

pub fn key_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HTTPS_SUB_DIR).join(KEY_FILE)
}

pub fn cert_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HTTPS_SUB_DIR).join(CERT_FILE)
}

/// Creates a new private key and certificate file if either is found to be
/// missing in the data directory.
pub fn create_key_cert_if_needed(data_dir: &Path) -> Result<(), Error> {
    if !key_file_path(data_dir).exists() || !cert_file_path(data_dir).exists()
    {
        create_key_and_cert(data_dir)
    }
    else {
        Ok(())
    }
}

/// Creates a new private key and certificate to be used when serving HTTPS.
///
/// Existing files are overwritten.
fn create_key_and_cert(data_dir: &Path) -> Result<(), Error> {
    let signer = HttpsSigner::build()?;
    signer.save_private_key(data_dir)?;
    signer.save_certificate(data_dir)?;
    Ok(())
}


//------------ HttpsSigner ---------------------------------------------------

/// Generates an HTTPS key pair and a self-signed certificate for
/// `localhost` and saves both as PEM files.
struct HttpsSigner {
    private: PKey<Private>,
}

impl HttpsSigner {
    fn build() -> Result<Self, Error> {
        let rsa = Rsa::generate(KEY_SIZE)?;
        let private = PKey::from_rsa(rsa)?;
        Ok(HttpsSigner { private })
    }

    fn save_private_key(&self, data_dir: &Path) -> Result<(), Error> {
        let pem = self.private.private_key_to_pem_pkcs8()?;
        file::save(&pem, &key_file_path(data_dir))?;
        Ok(())
    }

    fn certificate(&self) -> Result<X509, Error> {
        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", "localhost")?;
        let name = name.build();

        let mut serial = BigNum::new()?;
        serial.rand(63, MsbOption::MAYBE_ZERO, false)?;

        let serial = serial.to_asn1_integer()?;

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&self.private)?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(VALIDITY_DAYS)?.as_ref())?;

        let basic = BasicConstraints::new().build()?;
        builder.append_extension(basic)?;
        let san = SubjectAlternativeName::new()
            .dns("localhost")
            .ip("127.0.0.1")
            .ip("::1")
            .build(&builder.x509v3_context(None, None))?;
        builder.append_extension(san)?;
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))?;
        builder.append_extension(ski)?;

        builder.sign(&self.private, MessageDigest::sha256())?;
        Ok(builder.build())
    }

    fn save_certificate(&self, data_dir: &Path) -> Result<(), Error> {
        let pem = self.certificate()?.to_pem()?;
        file::save(&pem, &cert_file_path(data_dir))?;
        Ok(())
    }
}


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    OpenSslError(openssl::error::ErrorStack),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(e) => e.fmt(f),
            Error::OpenSslError(e) => {
                write!(f, "Cannot create HTTPS key and certificate: {e}")
            }
        }
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Error::OpenSslError(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::IoError(e)
    }
}

impl std::error::Error for Error {}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_key_and_cert() {
        let dir = tempfile::tempdir().unwrap();
        create_key_cert_if_needed(dir.path()).unwrap();

        let pem = std::fs::read(cert_file_path(dir.path())).unwrap();
        let cert = X509::from_pem(&pem).unwrap();
        let key = std::fs::read(key_file_path(dir.path())).unwrap();
        let key = PKey::private_key_from_pem(&key).unwrap();
        assert!(cert.verify(&key).unwrap());

        // Existing files are left alone.
        create_key_cert_if_needed(dir.path()).unwrap();
        assert_eq!(std::fs::read(cert_file_path(dir.path())).unwrap(), pem);
    }
}
