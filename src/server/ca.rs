//! The certificate authority key and certificate.

use chrono::{DateTime, Duration, Utc};
use log::info;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::x509::{X509, X509Builder};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use serde::{Deserialize, Serialize};
use crate::api::cert::{CertData, CertId, CertStatus};
use crate::commons::PkiResult;
use crate::commons::error::Error;
use crate::commons::storage::KeyValueStore;
use crate::config::{Config, KeyType};
use crate::constants::{ACTOR_ID_SYSTEM, CA_SIGNING_PROFILE, NS_CA};
use super::certs::CertRepository;
use super::policy::{
    CertTemplate, DistinguishedName, GeneralName, KeyAlgorithm,
    KeyUsage as KeyUsageFlags, PublicKeyInfo, SigningAlg,
};


const CA_KEY: &str = "ca";


//------------ CertAuthority -------------------------------------------------

/// The CA signing key and certificate.
pub struct CertAuthority {
    key: PKey<Private>,
    cert: X509,
    key_type: KeyAlgorithm,
    subject: DistinguishedName,
    serial: CertId,
    not_after: DateTime<Utc>,
}

impl CertAuthority {
    /// Loads the CA, creating it if it does not exist yet.
    ///
    /// A new CA certificate is recorded in the certificate repository.
    pub fn init(config: &Config, certs: &CertRepository) -> PkiResult<Self> {
        let store = KeyValueStore::create(config.storage_uri()?, NS_CA)?;
        if let Some(record) = store.get::<CaRecord>(CA_KEY)? {
            return Self::from_record(record)
        }

        let subject: DistinguishedName = config.ca_subject.parse()
            .map_err(Error::custom)?;
        let key = generate_key(config.ca_key_type, config.ca_key_size)?;
        let serial = certs.next_serial()?;
        let now = truncate(Utc::now());
        let not_after = Duration::try_days(config.ca_validity_days.into())
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or_else(|| Error::custom(format!(
                "CA validity of {} days is out of range",
                config.ca_validity_days
            )))?;

        let asn1_serial = serial_number(serial)?;
        let name = subject.to_x509()?;
        let not_before_time = Asn1Time::from_unix(now.timestamp())?;
        let not_after_time = Asn1Time::from_unix(not_after.timestamp())?;

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_serial_number(&asn1_serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;
        builder.set_not_before(&not_before_time)?;
        builder.set_not_after(&not_after_time)?;
        builder.append_extension(
            BasicConstraints::new().critical().ca().build()?
        )?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_cert_sign()
                .crl_sign()
                .build()?
        )?;
        let ski = SubjectKeyIdentifier::new().build(
            &builder.x509v3_context(None, None)
        )?;
        builder.append_extension(ski)?;

        let key_type = key_algorithm(&key)?;
        builder.sign(&key, SigningAlg::default_for(key_type).digest())?;
        let cert = builder.build();

        let record = CaRecord {
            key_pem: pem_string(key.private_key_to_pem_pkcs8()?)?,
            cert_pem: pem_string(cert.to_pem()?)?,
            serial,
            not_after,
        };
        store.store(CA_KEY, &record)?;

        certs.add(CertData {
            id: serial,
            subject_dn: subject.to_string(),
            issuer_dn: subject.to_string(),
            status: CertStatus::Valid,
            not_before: now,
            not_after,
            encoded: record.cert_pem.clone(),
            request_id: None,
            profile_id: Some(CA_SIGNING_PROFILE.to_string()),
            issued_on: now,
            issued_by: Some(ACTOR_ID_SYSTEM.to_string()),
            revoked_on: None,
            revoked_by: None,
            revocation_reason: None,
        })?;

        info!("Created CA '{}' with serial {}", subject, serial);
        Self::from_record(record)
    }

    fn from_record(record: CaRecord) -> PkiResult<Self> {
        let key = PKey::private_key_from_pem(record.key_pem.as_bytes())?;
        let cert = X509::from_pem(record.cert_pem.as_bytes())?;
        Ok(CertAuthority {
            key_type: key_algorithm(&key)?,
            subject: DistinguishedName::from_x509(cert.subject_name())?,
            key,
            cert,
            serial: record.serial,
            not_after: record.not_after,
        })
    }

    pub fn key_type(&self) -> KeyAlgorithm {
        self.key_type
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn serial(&self) -> CertId {
        self.serial
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the public key of the CA.
    pub fn public_key(&self) -> PkiResult<PublicKeyInfo> {
        let der = self.key.public_key_to_der()?;
        PublicKeyInfo::from_pkey(&PKey::public_key_from_der(&der)?)
    }

    /// Signs a certificate for the template.
    ///
    /// Returns the certificate as PEM together with its validity truncated
    /// to whole seconds.
    pub fn issue(
        &self, template: &CertTemplate, serial: CertId
    ) -> PkiResult<IssuedCert> {
        let subject = template.subject()?;
        let (not_before, not_after) = template.validity()?;
        let (not_before, not_after) = (truncate(not_before), truncate(not_after));
        let alg = template.signing_alg.unwrap_or(
            SigningAlg::default_for(self.key_type)
        );
        if alg.key_algorithm() != self.key_type {
            return Err(Error::RequestInvalid(format!(
                "signing algorithm {} cannot be used with a {} CA key",
                alg, self.key_type
            )))
        }

        let asn1_serial = serial_number(serial)?;
        let subject_name = subject.to_x509()?;
        let public_key = template.public_key()?.to_pkey()?;
        let not_before_time = Asn1Time::from_unix(not_before.timestamp())?;
        let not_after_time = Asn1Time::from_unix(not_after.timestamp())?;

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_serial_number(&asn1_serial)?;
        builder.set_subject_name(&subject_name)?;
        builder.set_issuer_name(self.cert.subject_name())?;
        builder.set_pubkey(&public_key)?;
        builder.set_not_before(&not_before_time)?;
        builder.set_not_after(&not_after_time)?;

        if let Some(bc) = template.basic_constraints {
            let mut ext = BasicConstraints::new();
            if bc.critical {
                ext.critical();
            }
            if bc.is_ca {
                ext.ca();
                if let Some(len) = bc.path_len {
                    ext.pathlen(len);
                }
            }
            builder.append_extension(ext.build()?)?;
        }

        if let Some(usage) = template.key_usage {
            if key_usage_any(&usage) {
                let mut ext = KeyUsage::new();
                if usage.critical {
                    ext.critical();
                }
                if usage.digital_signature {
                    ext.digital_signature();
                }
                if usage.non_repudiation {
                    ext.non_repudiation();
                }
                if usage.key_encipherment {
                    ext.key_encipherment();
                }
                if usage.data_encipherment {
                    ext.data_encipherment();
                }
                if usage.key_agreement {
                    ext.key_agreement();
                }
                if usage.key_cert_sign {
                    ext.key_cert_sign();
                }
                if usage.crl_sign {
                    ext.crl_sign();
                }
                if usage.encipher_only {
                    ext.encipher_only();
                }
                if usage.decipher_only {
                    ext.decipher_only();
                }
                builder.append_extension(ext.build()?)?;
            }
        }

        if let Some(usage) = template.ext_key_usage.as_ref() {
            if !usage.oids.is_empty() {
                let mut ext = ExtendedKeyUsage::new();
                if usage.critical {
                    ext.critical();
                }
                for oid in &usage.oids {
                    ext.other(oid);
                }
                builder.append_extension(ext.build()?)?;
            }
        }

        if let Some(names) = template.subject_alt_names.as_ref() {
            let mut ext = SubjectAlternativeName::new();
            if names.critical {
                ext.critical();
            }
            for name in &names.names {
                match name {
                    GeneralName::Dns(value) => ext.dns(value),
                    GeneralName::Email(value) => ext.email(value),
                    GeneralName::Ip(addr) => ext.ip(&addr.to_string()),
                    GeneralName::Uri(value) => ext.uri(value),
                };
            }
            let ext = ext.build(
                &builder.x509v3_context(Some(&self.cert), None)
            )?;
            builder.append_extension(ext)?;
        }

        if template.subject_key_id {
            let ext = SubjectKeyIdentifier::new().build(
                &builder.x509v3_context(Some(&self.cert), None)
            )?;
            builder.append_extension(ext)?;
        }

        if template.authority_key_id {
            let ext = AuthorityKeyIdentifier::new().keyid(true).build(
                &builder.x509v3_context(Some(&self.cert), None)
            )?;
            builder.append_extension(ext)?;
        }

        builder.sign(&self.key, alg.digest())?;
        let cert = builder.build();

        Ok(IssuedCert {
            pem: pem_string(cert.to_pem()?)?,
            subject: subject.clone(),
            issuer: self.subject.clone(),
            not_before,
            not_after,
        })
    }
}


//------------ IssuedCert ----------------------------------------------------

/// A freshly signed certificate.
#[derive(Clone, Debug)]
pub struct IssuedCert {
    pub pem: String,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}


//------------ CaRecord ------------------------------------------------------

#[derive(Deserialize, Serialize)]
struct CaRecord {
    key_pem: String,
    cert_pem: String,
    serial: CertId,
    not_after: DateTime<Utc>,
}


//------------ Helpers -------------------------------------------------------

fn generate_key(key_type: KeyType, size: u32) -> PkiResult<PKey<Private>> {
    match key_type {
        KeyType::Rsa => Ok(PKey::from_rsa(Rsa::generate(size)?)?),
        KeyType::Ec => {
            let nid = match size {
                256 => Nid::X9_62_PRIME256V1,
                384 => Nid::SECP384R1,
                521 => Nid::SECP521R1,
                _ => {
                    return Err(Error::signer(
                        format!("unsupported EC key size {size}")
                    ))
                }
            };
            let group = EcGroup::from_curve_name(nid)?;
            Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
        }
    }
}

fn serial_number(serial: CertId) -> PkiResult<Asn1Integer> {
    Ok(BigNum::from_slice(&serial.to_u64().to_be_bytes())?.to_asn1_integer()?)
}

/// Returns whether any key usage bit is set.
fn key_usage_any(usage: &KeyUsageFlags) -> bool {
    KeyUsageFlags::NAMES.iter()
        .filter(|name| **name != "keyUsageCritical")
        .any(|name| usage.get(name) == Some(true))
}

fn key_algorithm(key: &PKey<Private>) -> PkiResult<KeyAlgorithm> {
    match key.id() {
        Id::RSA => Ok(KeyAlgorithm::Rsa),
        Id::EC => Ok(KeyAlgorithm::Ec),
        _ => Err(Error::signer("unsupported CA key type")),
    }
}

fn pem_string(pem: Vec<u8>) -> PkiResult<String> {
    String::from_utf8(pem).map_err(Error::signer)
}

/// Drops sub-second precision which certificates cannot express.
fn truncate(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use openssl::x509::X509NameRef;
    use crate::api::admin::Token;
    use crate::server::policy::{
        BasicConstraints as Bc, ExtKeyUsage, KeyUsage as Ku, SubjectAltNames,
    };
    use crate::server::csr::tests::ec_key;

    fn dn(name: &X509NameRef) -> String {
        DistinguishedName::from_x509(name).unwrap().to_string()
    }

    #[test]
    fn create_and_issue() {
        let config = Config::test(Path::new("/tmp"), 0, Token::from("secret"));
        let certs = CertRepository::create(&config).unwrap();
        let ca = CertAuthority::init(&config, &certs).unwrap();
        assert_eq!(ca.serial(), CertId::new(1));
        assert_eq!(ca.key_type(), KeyAlgorithm::Ec);
        assert_eq!(ca.subject().to_string(), "CN=Test CA,O=EXAMPLE");
        assert!(certs.get(ca.serial()).unwrap().is_valid());

        // A second init loads the same CA.
        let again = CertAuthority::init(&config, &certs).unwrap();
        assert_eq!(again.serial(), ca.serial());

        let key = ec_key();
        let der = key.public_key_to_der().unwrap();
        let now = Utc::now();
        let template = CertTemplate {
            subject: Some("CN=www.example.com,O=EXAMPLE".parse().unwrap()),
            public_key: Some(PublicKeyInfo::from_pkey(
                &PKey::public_key_from_der(&der).unwrap()
            ).unwrap()),
            not_before: Some(now),
            not_after: Some(now + Duration::days(30)),
            key_usage: Some(Ku {
                critical: true, digital_signature: true, ..Default::default()
            }),
            ext_key_usage: Some(ExtKeyUsage {
                critical: false, oids: vec!["1.3.6.1.5.5.7.3.1".into()],
            }),
            basic_constraints: Some(Bc::default()),
            subject_alt_names: Some(SubjectAltNames {
                critical: false,
                names: vec![GeneralName::Dns("www.example.com".into())],
            }),
            signing_alg: Some(SigningAlg::Sha384WithEc),
            subject_key_id: true,
            authority_key_id: true,
        };
        let issued = ca.issue(&template, CertId::new(2)).unwrap();
        let cert = X509::from_pem(issued.pem.as_bytes()).unwrap();
        assert_eq!(dn(cert.subject_name()), "CN=www.example.com,O=EXAMPLE");
        assert_eq!(dn(cert.issuer_name()), "CN=Test CA,O=EXAMPLE");
        assert_eq!(
            cert.serial_number().to_bn().unwrap(),
            BigNum::from_u32(2).unwrap()
        );
        assert_eq!(
            cert.subject_alt_names().unwrap().iter()
                .filter_map(|name| name.dnsname().map(ToString::to_string))
                .collect::<Vec<_>>(),
            vec!["www.example.com".to_string()]
        );
        let ca_key = PKey::public_key_from_der(
            &ca.key.public_key_to_der().unwrap()
        ).unwrap();
        assert!(cert.verify(&ca_key).unwrap());

        let rsa = CertTemplate {
            signing_alg: Some(SigningAlg::Sha256WithRsa),
            ..template
        };
        assert!(ca.issue(&rsa, CertId::new(3)).is_err());
    }
}
