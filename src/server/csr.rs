//! Parsing of PKCS#10 certificate signing requests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use openssl::x509::{X509, X509Req};
use crate::api::request::CertEnrollmentRequest;
use crate::commons::PkiResult;
use crate::commons::error::Error;
use super::policy::{DistinguishedName, PublicKeyInfo};


/// The only certificate request type accepted.
pub const PKCS10: &str = "pkcs10";


//------------ Csr -----------------------------------------------------------

/// The parts of a verified CSR the policies use.
#[derive(Clone, Debug)]
pub struct Csr {
    pub subject: DistinguishedName,
    pub public_key: PublicKeyInfo,
}

impl Csr {
    /// Parses and verifies a PEM encoded request.
    ///
    /// A bare base64 body without the PEM armor is accepted as well.
    pub fn from_pem(pem: &str) -> PkiResult<Self> {
        let pem = pem.trim();
        let req = if pem.starts_with("-----BEGIN") {
            X509Req::from_pem(pem.as_bytes())
        }
        else {
            let body: String = pem.chars()
                .filter(|ch| !ch.is_whitespace())
                .collect();
            let der = BASE64.decode(body).map_err(|err| {
                Error::invalid_csr(format!("cannot decode base64: {err}"))
            })?;
            X509Req::from_der(&der)
        }.map_err(|err| Error::invalid_csr(format!("cannot parse: {err}")))?;

        let key = req.public_key().map_err(|err| {
            Error::invalid_csr(format!("cannot read public key: {err}"))
        })?;
        if !req.verify(&key).map_err(Error::invalid_csr)? {
            return Err(Error::invalid_csr("signature does not verify"))
        }

        Ok(Csr {
            subject: DistinguishedName::from_x509(req.subject_name())
                .map_err(Error::invalid_csr)?,
            public_key: PublicKeyInfo::from_pkey(&key)?,
        })
    }

    /// Extracts the CSR from the certificate request input of a request.
    pub fn from_request(request: &CertEnrollmentRequest) -> PkiResult<Self> {
        let request_type = request.attribute_value("cert_request_type")
            .unwrap_or(PKCS10);
        if !request_type.eq_ignore_ascii_case(PKCS10) {
            return Err(Error::invalid_csr(format!(
                "unsupported request type '{request_type}'"
            )))
        }
        let pem = request.attribute_value("cert_request").ok_or_else(|| {
            Error::invalid_csr("missing certificate request")
        })?;
        Self::from_pem(pem)
    }

    /// Takes subject and key from the certificate being renewed.
    pub fn from_certificate(pem: &str) -> PkiResult<Self> {
        let cert = X509::from_pem(pem.as_bytes()).map_err(|err| {
            Error::custom(format!("cannot parse stored certificate: {err}"))
        })?;
        Ok(Csr {
            subject: DistinguishedName::from_x509(cert.subject_name())?,
            public_key: PublicKeyInfo::from_pkey(&cert.public_key()?)?,
        })
    }
}


//============ Tests =========================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::x509::X509ReqBuilder;
    use crate::server::policy::{CERT_REQ_INPUT, KeyAlgorithm};

    pub fn ec_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    pub fn make_csr(subject: &str, key: &PKey<Private>) -> String {
        let dn: DistinguishedName = subject.parse().unwrap();
        let mut builder = X509ReqBuilder::new().unwrap();
        builder.set_subject_name(&dn.to_x509().unwrap()).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
    }

    #[test]
    fn parse_csr() {
        let key = ec_key();
        let pem = make_csr("UID=jdoe,O=EXAMPLE", &key);
        let csr = Csr::from_pem(&pem).unwrap();
        assert_eq!(csr.subject.to_string(), "UID=jdoe,O=EXAMPLE");
        assert_eq!(csr.public_key.key_type, KeyAlgorithm::Ec);
        assert_eq!(csr.public_key.curve.as_deref(), Some("nistp256"));

        // Without the armor.
        let body: String = pem.lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();
        assert!(Csr::from_pem(&body).is_ok());

        assert!(matches!(
            Csr::from_pem("garbage"), Err(Error::RequestInvalidCsr(_))
        ));
    }

    #[test]
    fn csr_from_request() {
        let key = ec_key();
        let mut request = CertEnrollmentRequest::default();
        assert!(Csr::from_request(&request).is_err());

        request.set_attribute_value(
            CERT_REQ_INPUT, "cert_request", &make_csr("UID=jdoe", &key)
        );
        request.set_attribute_value(CERT_REQ_INPUT, "cert_request_type", "crmf");
        assert!(Csr::from_request(&request).is_err());

        request.set_attribute_value(CERT_REQ_INPUT, "cert_request_type", "pkcs10");
        assert!(Csr::from_request(&request).is_ok());
    }
}
