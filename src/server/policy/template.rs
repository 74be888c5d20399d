//! The certificate being built.

use std::{fmt, str};
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::x509::{X509NameBuilder, X509Name, X509NameRef};
use crate::commons::PkiResult;
use crate::commons::error::Error;


//------------ CertTemplate --------------------------------------------------

/// The attributes of a certificate being built by the policy defaults.
///
/// Everything not set by a default is left out of the certificate.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertTemplate {
    pub subject: Option<DistinguishedName>,
    pub public_key: Option<PublicKeyInfo>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub key_usage: Option<KeyUsage>,
    pub ext_key_usage: Option<ExtKeyUsage>,
    pub basic_constraints: Option<BasicConstraints>,
    pub subject_alt_names: Option<SubjectAltNames>,
    pub signing_alg: Option<SigningAlg>,
    pub subject_key_id: bool,
    pub authority_key_id: bool,
}

impl CertTemplate {
    /// Returns the subject or an error if no default provided one.
    pub fn subject(&self) -> PkiResult<&DistinguishedName> {
        self.subject.as_ref().ok_or_else(|| {
            Error::RequestInvalid("no subject name".into())
        })
    }

    pub fn public_key(&self) -> PkiResult<&PublicKeyInfo> {
        self.public_key.as_ref().ok_or_else(|| {
            Error::RequestInvalid("no public key".into())
        })
    }

    /// Returns the validity or an error if no default provided one.
    pub fn validity(&self) -> PkiResult<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.not_before, self.not_after) {
            (Some(not_before), Some(not_after)) => {
                if not_after <= not_before {
                    Err(Error::RequestInvalid(
                        "notAfter must be later than notBefore".into()
                    ))
                }
                else {
                    Ok((not_before, not_after))
                }
            }
            _ => Err(Error::RequestInvalid("no validity period".into()))
        }
    }
}


//------------ DistinguishedName ---------------------------------------------

/// A distinguished name in its string form.
///
/// The attributes are kept in string order, i.e., the most specific
/// attribute comes first as in `UID=jdoe,O=EXAMPLE`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct DistinguishedName {
    attrs: Vec<(String, String)>,
}

impl DistinguishedName {
    pub fn new(attrs: Vec<(String, String)>) -> Self {
        DistinguishedName { attrs }
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Returns the first value of the given attribute, case insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Reads the name from an X.509 name.
    pub fn from_x509(name: &X509NameRef) -> PkiResult<Self> {
        let mut attrs = Vec::new();
        for entry in name.entries() {
            let key = match entry.object().nid() {
                Nid::PKCS9_EMAILADDRESS => "E".to_string(),
                Nid::USERID => "UID".to_string(),
                nid => nid.short_name()?.to_string()
            };
            let value = entry.data().to_string()?;
            if value.contains('\0') {
                return Err(Error::invalid_csr(
                    format!("NUL character in name attribute {key}")
                ))
            }
            attrs.push((key, value));
        }
        // X.509 keeps the most general attribute first.
        attrs.reverse();
        Ok(DistinguishedName { attrs })
    }

    /// Converts the name into an X.509 name.
    pub fn to_x509(&self) -> PkiResult<X509Name> {
        let mut builder = X509NameBuilder::new()?;
        for (key, value) in self.attrs.iter().rev() {
            let field = match key.to_ascii_uppercase().as_str() {
                "E" | "EMAIL" | "EMAILADDRESS" => "emailAddress".to_string(),
                "UID" => "UID".to_string(),
                _ => key.to_ascii_uppercase(),
            };
            builder.append_entry_by_text(&field, value).map_err(|_| {
                Error::RequestInvalid(
                    format!("unsupported name attribute '{key}'")
                )
            })?;
        }
        Ok(builder.build())
    }
}

impl str::FromStr for DistinguishedName {
    type Err = String;

    /// Parses `KEY=value,KEY=value`. A backslash escapes the next character.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attrs = Vec::new();
        let mut current = String::new();
        let mut parts = Vec::new();
        let mut chars = s.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next)
                    }
                }
                ',' | '+' => parts.push(std::mem::take(&mut current)),
                _ => current.push(ch),
            }
        }
        parts.push(current);

        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                if s.trim().is_empty() {
                    continue
                }
                return Err(format!("empty attribute in name '{s}'"))
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                format!("invalid attribute '{part}' in name '{s}'")
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("missing attribute type in name '{s}'"))
            }
            attrs.push((key.to_string(), value.trim().to_string()));
        }
        Ok(DistinguishedName { attrs })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.attrs {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{key}=")?;
            for ch in value.chars() {
                if matches!(ch, ',' | '+' | '\\') {
                    f.write_str("\\")?;
                }
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}


//------------ PublicKeyInfo -------------------------------------------------

/// A subject public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKeyInfo {
    /// The DER encoded subject public key info.
    pub der: Vec<u8>,

    pub key_type: KeyAlgorithm,

    /// The RSA modulus size or the EC curve size in bits.
    pub size: u32,

    /// The EC curve, e.g. `nistp256`.
    pub curve: Option<String>,
}

impl PublicKeyInfo {
    pub fn from_pkey(key: &PKey<Public>) -> PkiResult<Self> {
        let (key_type, curve) = match key.id() {
            Id::RSA => (KeyAlgorithm::Rsa, None),
            Id::EC => {
                let curve = match key.ec_key()?.group().curve_name() {
                    Some(Nid::X9_62_PRIME256V1) => "nistp256",
                    Some(Nid::SECP384R1) => "nistp384",
                    Some(Nid::SECP521R1) => "nistp521",
                    _ => {
                        return Err(Error::invalid_csr("unsupported EC curve"))
                    }
                };
                (KeyAlgorithm::Ec, Some(curve.to_string()))
            }
            _ => return Err(Error::invalid_csr("unsupported key type")),
        };
        Ok(PublicKeyInfo {
            der: key.public_key_to_der()?,
            key_type,
            size: key.bits(),
            curve,
        })
    }

    pub fn to_pkey(&self) -> PkiResult<PKey<Public>> {
        Ok(PKey::public_key_from_der(&self.der)?)
    }
}


//------------ KeyAlgorithm --------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
}

impl KeyAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Ec => "EC",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ KeyUsage ------------------------------------------------------

/// The key usage extension.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeyUsage {
    pub critical: bool,
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub encipher_only: bool,
    pub decipher_only: bool,
}

impl KeyUsage {
    /// The parameter names shared by the default and the constraint.
    pub const NAMES: [&'static str; 10] = [
        "keyUsageCritical",
        "keyUsageDigitalSignature",
        "keyUsageNonRepudiation",
        "keyUsageKeyEncipherment",
        "keyUsageDataEncipherment",
        "keyUsageKeyAgreement",
        "keyUsageKeyCertSign",
        "keyUsageCrlSign",
        "keyUsageEncipherOnly",
        "keyUsageDecipherOnly",
    ];

    pub fn get(&self, name: &str) -> Option<bool> {
        Some(match name {
            "keyUsageCritical" => self.critical,
            "keyUsageDigitalSignature" => self.digital_signature,
            "keyUsageNonRepudiation" => self.non_repudiation,
            "keyUsageKeyEncipherment" => self.key_encipherment,
            "keyUsageDataEncipherment" => self.data_encipherment,
            "keyUsageKeyAgreement" => self.key_agreement,
            "keyUsageKeyCertSign" => self.key_cert_sign,
            "keyUsageCrlSign" => self.crl_sign,
            "keyUsageEncipherOnly" => self.encipher_only,
            "keyUsageDecipherOnly" => self.decipher_only,
            _ => return None,
        })
    }

    /// Sets the named flag. Returns whether the name is known.
    pub fn set(&mut self, name: &str, value: bool) -> bool {
        let flag = match name {
            "keyUsageCritical" => &mut self.critical,
            "keyUsageDigitalSignature" => &mut self.digital_signature,
            "keyUsageNonRepudiation" => &mut self.non_repudiation,
            "keyUsageKeyEncipherment" => &mut self.key_encipherment,
            "keyUsageDataEncipherment" => &mut self.data_encipherment,
            "keyUsageKeyAgreement" => &mut self.key_agreement,
            "keyUsageKeyCertSign" => &mut self.key_cert_sign,
            "keyUsageCrlSign" => &mut self.crl_sign,
            "keyUsageEncipherOnly" => &mut self.encipher_only,
            "keyUsageDecipherOnly" => &mut self.decipher_only,
            _ => return false,
        };
        *flag = value;
        true
    }
}


//------------ ExtKeyUsage ---------------------------------------------------

/// The extended key usage extension.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtKeyUsage {
    pub critical: bool,

    /// Dotted decimal OIDs.
    pub oids: Vec<String>,
}


//------------ BasicConstraints ----------------------------------------------

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BasicConstraints {
    pub critical: bool,
    pub is_ca: bool,

    /// The path length constraint, `None` for unlimited.
    pub path_len: Option<u32>,
}


//------------ SubjectAltNames -----------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubjectAltNames {
    pub critical: bool,
    pub names: Vec<GeneralName>,
}


//------------ GeneralName ---------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GeneralName {
    Dns(String),
    Email(String),
    Ip(IpAddr),
    Uri(String),
}

impl GeneralName {
    /// Creates a name from a type as used in profiles and a value.
    pub fn from_type(name_type: &str, value: &str) -> Result<Self, String> {
        match name_type {
            "DNSName" => Ok(GeneralName::Dns(value.to_string())),
            "RFC822Name" => Ok(GeneralName::Email(value.to_string())),
            "IPAddress" => {
                value.parse().map(GeneralName::Ip).map_err(|_| {
                    format!("invalid IP address '{value}'")
                })
            }
            "URIName" => Ok(GeneralName::Uri(value.to_string())),
            _ => Err(format!("unsupported name type '{name_type}'"))
        }
    }

    pub fn name_type(&self) -> &'static str {
        match self {
            GeneralName::Dns(_) => "DNSName",
            GeneralName::Email(_) => "RFC822Name",
            GeneralName::Ip(_) => "IPAddress",
            GeneralName::Uri(_) => "URIName",
        }
    }
}

impl str::FromStr for GeneralName {
    type Err = String;

    /// Parses the `DNSName:www.example.com` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name_type, value) = s.split_once(':').ok_or_else(|| {
            format!("invalid general name '{s}'")
        })?;
        Self::from_type(name_type.trim(), value.trim())
    }
}

impl fmt::Display for GeneralName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GeneralName::Dns(value)
            | GeneralName::Email(value)
            | GeneralName::Uri(value) => {
                write!(f, "{}:{}", self.name_type(), value)
            }
            GeneralName::Ip(addr) => write!(f, "{}:{}", self.name_type(), addr),
        }
    }
}


//------------ SigningAlg ----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SigningAlg {
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    Sha256WithEc,
    Sha384WithEc,
    Sha512WithEc,
}

impl SigningAlg {
    const ALL: [SigningAlg; 6] = [
        SigningAlg::Sha256WithRsa,
        SigningAlg::Sha384WithRsa,
        SigningAlg::Sha512WithRsa,
        SigningAlg::Sha256WithEc,
        SigningAlg::Sha384WithEc,
        SigningAlg::Sha512WithEc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlg::Sha256WithRsa => "SHA256withRSA",
            SigningAlg::Sha384WithRsa => "SHA384withRSA",
            SigningAlg::Sha512WithRsa => "SHA512withRSA",
            SigningAlg::Sha256WithEc => "SHA256withEC",
            SigningAlg::Sha384WithEc => "SHA384withEC",
            SigningAlg::Sha512WithEc => "SHA512withEC",
        }
    }

    /// Returns the algorithm family of the signing key.
    pub fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            SigningAlg::Sha256WithRsa
            | SigningAlg::Sha384WithRsa
            | SigningAlg::Sha512WithRsa => KeyAlgorithm::Rsa,
            _ => KeyAlgorithm::Ec,
        }
    }

    pub fn digest(self) -> openssl::hash::MessageDigest {
        use openssl::hash::MessageDigest;

        match self {
            SigningAlg::Sha256WithRsa | SigningAlg::Sha256WithEc => {
                MessageDigest::sha256()
            }
            SigningAlg::Sha384WithRsa | SigningAlg::Sha384WithEc => {
                MessageDigest::sha384()
            }
            SigningAlg::Sha512WithRsa | SigningAlg::Sha512WithEc => {
                MessageDigest::sha512()
            }
        }
    }

    /// Returns the default algorithm for a key family.
    pub fn default_for(key: KeyAlgorithm) -> Self {
        match key {
            KeyAlgorithm::Rsa => SigningAlg::Sha256WithRsa,
            KeyAlgorithm::Ec => SigningAlg::Sha256WithEc,
        }
    }
}

impl str::FromStr for SigningAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown signing algorithm '{s}'"))
    }
}

impl fmt::Display for SigningAlg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//============ Tests =========================================================
