//! Issued certificates.

use std::{fmt, str};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::request::RequestId;


//------------ CertId --------------------------------------------------------

/// The serial number of a certificate.
///
/// Serial numbers are displayed as lower case hex with a `0x` prefix. When
/// parsing, a `0x` or `0X` prefix selects hex, anything else is decimal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CertId(u64);

impl CertId {
    pub fn new(serial: u64) -> Self {
        CertId(serial)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for CertId {
    fn from(serial: u64) -> Self {
        CertId(serial)
    }
}

impl str::FromStr for CertId {
    type Err = InvalidCertId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        };
        res.map(CertId).map_err(|_| InvalidCertId(s.to_string()))
    }
}

impl fmt::Display for CertId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for CertId {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CertId {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidCertId(String);

impl fmt::Display for InvalidCertId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid serial number '{}'", self.0)
    }
}

impl std::error::Error for InvalidCertId {}


//------------ CertStatus ----------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertStatus {
    Valid,
    Revoked,
    Expired,
}

impl CertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertStatus::Valid => "VALID",
            CertStatus::Revoked => "REVOKED",
            CertStatus::Expired => "EXPIRED",
        }
    }
}

impl str::FromStr for CertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VALID" => Ok(CertStatus::Valid),
            "REVOKED" => Ok(CertStatus::Revoked),
            "EXPIRED" => Ok(CertStatus::Expired),
            _ => Err(format!("unknown certificate status '{s}'")),
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ RevocationReason ----------------------------------------------

/// The reason codes of RFC 5280, section 5.3.1.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize
)]
pub enum RevocationReason {
    #[default]
    #[serde(rename = "Unspecified")]
    Unspecified,

    #[serde(rename = "Key_Compromise")]
    KeyCompromise,

    #[serde(rename = "CA_Compromise")]
    CaCompromise,

    #[serde(rename = "Affiliation_Changed")]
    AffiliationChanged,

    #[serde(rename = "Superseded")]
    Superseded,

    #[serde(rename = "Cessation_of_Operation")]
    CessationOfOperation,

    #[serde(rename = "Certificate_Hold")]
    CertificateHold,

    #[serde(rename = "Remove_from_CRL")]
    RemoveFromCrl,

    #[serde(rename = "Privilege_Withdrawn")]
    PrivilegeWithdrawn,

    #[serde(rename = "AA_Compromise")]
    AaCompromise,
}

impl RevocationReason {
    const ALL: [RevocationReason; 10] = [
        RevocationReason::Unspecified,
        RevocationReason::KeyCompromise,
        RevocationReason::CaCompromise,
        RevocationReason::AffiliationChanged,
        RevocationReason::Superseded,
        RevocationReason::CessationOfOperation,
        RevocationReason::CertificateHold,
        RevocationReason::RemoveFromCrl,
        RevocationReason::PrivilegeWithdrawn,
        RevocationReason::AaCompromise,
    ];

    /// Returns the CRL reason code. Code 7 is unused.
    pub fn code(self) -> u8 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::CaCompromise => 2,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
            RevocationReason::CertificateHold => 6,
            RevocationReason::RemoveFromCrl => 8,
            RevocationReason::PrivilegeWithdrawn => 9,
            RevocationReason::AaCompromise => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RevocationReason::Unspecified => "Unspecified",
            RevocationReason::KeyCompromise => "Key_Compromise",
            RevocationReason::CaCompromise => "CA_Compromise",
            RevocationReason::AffiliationChanged => "Affiliation_Changed",
            RevocationReason::Superseded => "Superseded",
            RevocationReason::CessationOfOperation => "Cessation_of_Operation",
            RevocationReason::CertificateHold => "Certificate_Hold",
            RevocationReason::RemoveFromCrl => "Remove_from_CRL",
            RevocationReason::PrivilegeWithdrawn => "Privilege_Withdrawn",
            RevocationReason::AaCompromise => "AA_Compromise",
        }
    }
}

impl str::FromStr for RevocationReason {
    type Err = String;

    /// Accepts the RFC 5280 name, case insensitive, or the numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|reason| {
            reason.as_str().eq_ignore_ascii_case(s)
                || reason.code().to_string() == s
        }).ok_or_else(|| format!("unknown revocation reason '{s}'"))
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ CertData ------------------------------------------------------

/// A certificate as kept in the repository.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertData {
    pub id: CertId,

    #[serde(rename = "SubjectDN")]
    pub subject_dn: String,

    #[serde(rename = "IssuerDN")]
    pub issuer_dn: String,

    #[serde(rename = "Status")]
    pub status: CertStatus,

    #[serde(rename = "NotBefore")]
    pub not_before: DateTime<Utc>,

    #[serde(rename = "NotAfter")]
    pub not_after: DateTime<Utc>,

    /// The PEM encoded certificate.
    #[serde(rename = "Encoded")]
    pub encoded: String,

    #[serde(
        rename = "RequestId", default, skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<RequestId>,

    #[serde(
        rename = "ProfileId", default, skip_serializing_if = "Option::is_none"
    )]
    pub profile_id: Option<String>,

    #[serde(rename = "IssuedOn")]
    pub issued_on: DateTime<Utc>,

    #[serde(
        rename = "IssuedBy", default, skip_serializing_if = "Option::is_none"
    )]
    pub issued_by: Option<String>,

    #[serde(
        rename = "RevokedOn", default, skip_serializing_if = "Option::is_none"
    )]
    pub revoked_on: Option<DateTime<Utc>>,

    #[serde(
        rename = "RevokedBy", default, skip_serializing_if = "Option::is_none"
    )]
    pub revoked_by: Option<String>,

    #[serde(
        rename = "RevocationReason", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub revocation_reason: Option<RevocationReason>,
}

impl CertData {
    pub fn info(&self) -> CertDataInfo {
        CertDataInfo {
            id: self.id,
            subject_dn: self.subject_dn.clone(),
            status: self.status,
            not_before: self.not_before,
            not_after: self.not_after,
            issued_on: self.issued_on,
            profile_id: self.profile_id.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == CertStatus::Valid
    }
}

impl fmt::Display for CertData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Serial Number: {}", self.id)?;
        writeln!(f, "Subject DN: {}", self.subject_dn)?;
        writeln!(f, "Issuer DN: {}", self.issuer_dn)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Not Valid Before: {}", self.not_before.to_rfc3339())?;
        writeln!(f, "Not Valid After: {}", self.not_after.to_rfc3339())?;
        writeln!(f, "Issued On: {}", self.issued_on.to_rfc3339())?;
        if let Some(by) = &self.issued_by {
            writeln!(f, "Issued By: {by}")?;
        }
        if let Some(profile) = &self.profile_id {
            writeln!(f, "Profile: {profile}")?;
        }
        if let Some(on) = &self.revoked_on {
            writeln!(f, "Revoked On: {}", on.to_rfc3339())?;
        }
        if let Some(by) = &self.revoked_by {
            writeln!(f, "Revoked By: {by}")?;
        }
        if let Some(reason) = &self.revocation_reason {
            writeln!(f, "Revocation Reason: {reason}")?;
        }
        Ok(())
    }
}


//------------ CertDataInfo --------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertDataInfo {
    pub id: CertId,

    #[serde(rename = "SubjectDN")]
    pub subject_dn: String,

    #[serde(rename = "Status")]
    pub status: CertStatus,

    #[serde(rename = "NotValidBefore")]
    pub not_before: DateTime<Utc>,

    #[serde(rename = "NotValidAfter")]
    pub not_after: DateTime<Utc>,

    #[serde(rename = "IssuedOn")]
    pub issued_on: DateTime<Utc>,

    #[serde(
        rename = "ProfileId", default, skip_serializing_if = "Option::is_none"
    )]
    pub profile_id: Option<String>,
}


//------------ CertDataInfos -------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertDataInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<CertDataInfo>,
}

impl fmt::Display for CertDataInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for entry in &self.entries {
            writeln!(f)?;
            writeln!(f, "  Serial Number: {}", entry.id)?;
            writeln!(f, "  Subject DN: {}", entry.subject_dn)?;
            writeln!(f, "  Status: {}", entry.status)?;
            writeln!(f, "  Not Valid After: {}", entry.not_after.to_rfc3339())?;
        }
        Ok(())
    }
}


//------------ CertRevokeRequest ---------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertRevokeRequest {
    #[serde(rename = "Reason", default)]
    pub reason: RevocationReason,

    #[serde(
        rename = "Comments", default, skip_serializing_if = "Option::is_none"
    )]
    pub comments: Option<String>,

    #[serde(
        rename = "InvalidityDate", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub invalidity_date: Option<DateTime<Utc>>,
}


//------------ CertQuery -----------------------------------------------------

/// Filters and paging for certificate listings.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertQuery {
    pub status: Option<CertStatus>,

    /// A case insensitive substring of the subject DN.
    pub subject: Option<String>,

    pub profile: Option<String>,
    pub start: usize,
    pub size: Option<usize>,
}

impl CertQuery {
    pub fn matches(&self, cert: &CertData) -> bool {
        if let Some(status) = self.status {
            if cert.status != status {
                return false
            }
        }
        if let Some(subject) = &self.subject {
            if !cert.subject_dn.to_lowercase().contains(
                &subject.to_lowercase()
            ) {
                return false
            }
        }
        if let Some(profile) = &self.profile {
            if cert.profile_id.as_ref() != Some(profile) {
                return false
            }
        }
        true
    }

    /// Parses the query from URI query parameters.
    pub fn from_query(query: Option<&str>) -> Result<Self, String> {
        let mut res = CertQuery::default();
        for (key, value) in url::form_urlencoded::parse(
            query.unwrap_or("").as_bytes()
        ) {
            match key.as_ref() {
                "status" => res.status = Some(value.parse()?),
                "subject" => res.subject = Some(value.into_owned()),
                "profile" => res.profile = Some(value.into_owned()),
                "start" => {
                    res.start = value.parse().map_err(|_| {
                        format!("invalid start '{value}'")
                    })?
                }
                "size" => {
                    res.size = Some(value.parse().map_err(|_| {
                        format!("invalid size '{value}'")
                    })?)
                }
                _ => { }
            }
        }
        Ok(res)
    }

    /// Returns the query string, empty if no filter is set.
    pub fn to_query(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        if let Some(status) = self.status {
            ser.append_pair("status", status.as_str());
        }
        if let Some(subject) = &self.subject {
            ser.append_pair("subject", subject);
        }
        if let Some(profile) = &self.profile {
            ser.append_pair("profile", profile);
        }
        if self.start > 0 {
            ser.append_pair("start", &self.start.to_string());
        }
        if let Some(size) = self.size {
            ser.append_pair("size", &size.to_string());
        }
        ser.finish()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cert_id_formats() {
        assert_eq!("0x1f".parse::<CertId>().unwrap(), CertId::new(31));
        assert_eq!("0X1F".parse::<CertId>().unwrap(), CertId::new(31));
        assert_eq!("31".parse::<CertId>().unwrap(), CertId::new(31));
        assert!("0xzz".parse::<CertId>().is_err());
        assert!("".parse::<CertId>().is_err());
        assert_eq!(CertId::new(31).to_string(), "0x1f");
        assert_eq!(
            serde_json::to_string(&CertId::new(255)).unwrap(), "\"0xff\""
        );
    }

    #[test]
    fn revocation_reason_names_and_codes() {
        assert_eq!(
            "certificate_hold".parse::<RevocationReason>().unwrap(),
            RevocationReason::CertificateHold
        );
        assert_eq!(
            "8".parse::<RevocationReason>().unwrap(),
            RevocationReason::RemoveFromCrl
        );
        assert!("7".parse::<RevocationReason>().is_err());
        assert_eq!(
            serde_json::to_string(&RevocationReason::KeyCompromise).unwrap(),
            "\"Key_Compromise\""
        );
    }

    #[test]
    fn revoke_request_defaults() {
        let req: CertRevokeRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.reason, RevocationReason::Unspecified);
        assert!(req.comments.is_none());
    }

    #[test]
    fn cert_query_string() {
        let query = CertQuery {
            status: Some(CertStatus::Revoked),
            subject: Some("UID=test user".into()),
            profile: None,
            start: 0,
            size: Some(5),
        };
        let s = query.to_query();
        assert_eq!(CertQuery::from_query(Some(&s)).unwrap(), query);
        assert_eq!(CertQuery::from_query(None).unwrap(), CertQuery::default());
        assert!(CertQuery::from_query(Some("size=x")).is_err());
    }
}
