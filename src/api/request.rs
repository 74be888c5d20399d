//! Certificate requests and their review.

use std::{fmt, str};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::cert::CertId;
use super::profile::{PolicySet, Profile, ProfileAttribute, ProfileInput, ProfileOutput};


//------------ RequestId -----------------------------------------------------

/// The identifier of a request, serialized as a decimal string.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        RequestId(id)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId(id)
    }
}

impl str::FromStr for RequestId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(RequestId).map_err(|_| {
            format!("invalid request id '{s}'")
        })
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}


//------------ RequestStatus -------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Canceled,
}

impl RequestStatus {
    /// Returns whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Canceled => "canceled",
        }
    }
}

impl str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" | "complete" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "canceled" => Ok(RequestStatus::Canceled),
            _ => Err(format!("unknown request status '{s}'")),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ RequestType ---------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Enrollment,
    Renewal,
    Revocation,
    Unrevocation,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Enrollment => "enrollment",
            RequestType::Renewal => "renewal",
            RequestType::Revocation => "revocation",
            RequestType::Unrevocation => "unrevocation",
        }
    }
}

impl str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enrollment" => Ok(RequestType::Enrollment),
            "renewal" => Ok(RequestType::Renewal),
            "revocation" => Ok(RequestType::Revocation),
            "unrevocation" => Ok(RequestType::Unrevocation),
            _ => Err(format!("unknown request type '{s}'")),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ OperationResult -----------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationResult {
    Success,
    Failure,
}


//------------ CertEnrollmentRequest -----------------------------------------

/// An enrollment or renewal request as submitted by a client.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertEnrollmentRequest {
    #[serde(rename = "ProfileID", default)]
    pub profile_id: String,

    #[serde(rename = "Renewal", default)]
    pub renewal: bool,

    #[serde(
        rename = "SerialNumber", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_number: Option<CertId>,

    #[serde(rename = "Input", default)]
    pub inputs: Vec<ProfileInput>,

    #[serde(rename = "Output", default)]
    pub outputs: Vec<ProfileOutput>,
}

impl CertEnrollmentRequest {
    /// Creates an empty request template for a profile.
    ///
    /// The inputs carry every attribute the profile's inputs define but no
    /// values.
    pub fn template(profile: &Profile) -> Self {
        CertEnrollmentRequest {
            profile_id: profile.id.clone(),
            renewal: profile.renewal,
            serial_number: None,
            inputs: profile.inputs.clone(),
            outputs: Vec::new(),
        }
    }

    /// Returns the first input with the given class id.
    pub fn get_input(&self, class_id: &str) -> Option<&ProfileInput> {
        self.inputs.iter().find(|input| input.class_id == class_id)
    }

    /// Returns the first non-empty value of the named attribute.
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.inputs.iter().find_map(|input| input.value(name))
    }

    /// Sets the named attribute of the first input of the given class.
    ///
    /// Adds the input if the request does not have one yet.
    pub fn set_attribute_value(
        &mut self, class_id: &str, name: &str, value: &str
    ) {
        let pos = match self.inputs.iter().position(|input| {
            input.class_id == class_id
        }) {
            Some(pos) => pos,
            None => {
                let id = format!("i{}", self.inputs.len() + 1);
                self.inputs.push(ProfileInput::new(id, class_id));
                self.inputs.len() - 1
            }
        };
        let input = &mut self.inputs[pos];
        let attr = match input.get_attribute(name) {
            Some(existing) => existing.clone().with_value(value),
            None => ProfileAttribute::new(name).with_value(value),
        };
        input.add_attribute(attr);
    }
}

impl fmt::Display for CertEnrollmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Profile: {}", self.profile_id)?;
        if self.renewal {
            writeln!(f, "Renewal: true")?;
        }
        if let Some(serial) = self.serial_number {
            writeln!(f, "Serial Number: {serial}")?;
        }
        for input in &self.inputs {
            writeln!(f)?;
            writeln!(
                f, "  Input {}: {}", input.id,
                input.name.as_deref().unwrap_or(&input.class_id)
            )?;
            for attr in &input.attributes {
                writeln!(
                    f, "    {}: {}",
                    attr.name, attr.value.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }
}


//------------ CertRequestInfo -----------------------------------------------

/// The state of a request as shown to its submitter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertRequestInfo {
    #[serde(rename = "requestID")]
    pub id: RequestId,

    #[serde(rename = "requestType")]
    pub request_type: RequestType,

    #[serde(rename = "requestStatus")]
    pub status: RequestStatus,

    #[serde(
        rename = "requestURL", default, skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,

    #[serde(rename = "certId", default, skip_serializing_if = "Option::is_none")]
    pub cert_id: Option<CertId>,

    #[serde(rename = "certURL", default, skip_serializing_if = "Option::is_none")]
    pub cert_url: Option<String>,

    #[serde(
        rename = "certRequestType", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cert_request_type: Option<String>,

    #[serde(rename = "operationResult")]
    pub operation_result: OperationResult,

    #[serde(
        rename = "errorMessage", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl fmt::Display for CertRequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Request ID: {}", self.id)?;
        writeln!(f, "Type: {}", self.request_type)?;
        writeln!(f, "Request Status: {}", self.status)?;
        writeln!(
            f, "Operation Result: {}",
            match self.operation_result {
                OperationResult::Success => "success",
                OperationResult::Failure => "failure",
            }
        )?;
        if let Some(cert) = self.cert_id {
            writeln!(f, "Certificate ID: {cert}")?;
        }
        if let Some(msg) = &self.error_message {
            writeln!(f, "Reason: {msg}")?;
        }
        Ok(())
    }
}


//------------ CertRequestInfos ----------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertRequestInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<CertRequestInfo>,
}

impl fmt::Display for CertRequestInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for entry in &self.entries {
            writeln!(f)?;
            writeln!(f, "  Request ID: {}", entry.id)?;
            writeln!(f, "  Type: {}", entry.request_type)?;
            writeln!(f, "  Request Status: {}", entry.status)?;
            if let Some(cert) = entry.cert_id {
                writeln!(f, "  Certificate ID: {cert}")?;
            }
        }
        Ok(())
    }
}


//------------ CertReviewResponse --------------------------------------------

/// A pending request as presented to an agent for review.
///
/// The same structure is posted back with a review action. The policy sets
/// carry the values the defaults populated; an agent may change them before
/// approving.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CertReviewResponse {
    #[serde(flatten)]
    pub request: CertEnrollmentRequest,

    #[serde(rename = "requestId")]
    pub id: RequestId,

    #[serde(rename = "requestType")]
    pub request_type: RequestType,

    #[serde(rename = "requestStatus")]
    pub status: RequestStatus,

    #[serde(
        rename = "requestOwner", default, skip_serializing_if = "Option::is_none"
    )]
    pub owner: Option<String>,

    #[serde(rename = "requestCreationTime")]
    pub created: DateTime<Utc>,

    #[serde(rename = "requestModificationTime")]
    pub modified: DateTime<Utc>,

    #[serde(
        rename = "requestNotes", default, skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<String>,

    /// The nonce that must accompany the next review action.
    #[serde(default)]
    pub nonce: String,

    #[serde(rename = "ProfilePolicySet", default)]
    pub policy_sets: Vec<PolicySet>,
}

impl CertReviewResponse {
    /// Sets a policy attribute value by name across all policy sets.
    ///
    /// Returns whether an attribute of that name was found.
    pub fn set_policy_value(&mut self, name: &str, value: &str) -> bool {
        let mut found = false;
        for set in &mut self.policy_sets {
            for policy in &mut set.policies {
                if let Some(attr) = policy.default.get_attribute(name) {
                    let attr = attr.clone().with_value(value);
                    policy.default.add_attribute(attr);
                    found = true;
                }
            }
        }
        found
    }
}

impl fmt::Display for CertReviewResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Request ID: {}", self.id)?;
        writeln!(f, "Profile: {}", self.request.profile_id)?;
        writeln!(f, "Type: {}", self.request_type)?;
        writeln!(f, "Status: {}", self.status)?;
        if let Some(owner) = &self.owner {
            writeln!(f, "Owner: {owner}")?;
        }
        writeln!(f, "Created: {}", self.created.to_rfc3339())?;
        writeln!(f, "Modified: {}", self.modified.to_rfc3339())?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        for set in &self.policy_sets {
            writeln!(f)?;
            writeln!(f, "  Policy Set: {}", set.id)?;
            for policy in &set.policies {
                for attr in &policy.default.attributes {
                    writeln!(
                        f, "    {}: {}",
                        attr.name, attr.value.as_deref().unwrap_or("")
                    )?;
                }
            }
        }
        Ok(())
    }
}


//------------ ReviewAction --------------------------------------------------

/// The actions an agent can take on a pending request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReviewAction {
    Approve,
    Reject,
    Cancel,
    Update,
    Validate,
    Assign,
    Unassign,
}

impl ReviewAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Cancel => "cancel",
            ReviewAction::Update => "update",
            ReviewAction::Validate => "validate",
            ReviewAction::Assign => "assign",
            ReviewAction::Unassign => "unassign",
        }
    }
}

impl str::FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            "cancel" => Ok(ReviewAction::Cancel),
            "update" => Ok(ReviewAction::Update),
            "validate" => Ok(ReviewAction::Validate),
            "assign" => Ok(ReviewAction::Assign),
            "unassign" => Ok(ReviewAction::Unassign),
            _ => Err(format!("unknown review action '{s}'")),
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ RequestQuery --------------------------------------------------

/// Filters and paging for request listings.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
    pub request_type: Option<RequestType>,
    pub start: usize,
    pub size: Option<usize>,
}

impl RequestQuery {
    pub fn from_query(query: Option<&str>) -> Result<Self, String> {
        let mut res = RequestQuery::default();
        for (key, value) in url::form_urlencoded::parse(
            query.unwrap_or("").as_bytes()
        ) {
            match key.as_ref() {
                "requestState" => res.status = Some(value.parse()?),
                "requestType" => res.request_type = Some(value.parse()?),
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

    pub fn to_query(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        if let Some(status) = self.status {
            ser.append_pair("requestState", status.as_str());
        }
        if let Some(request_type) = self.request_type {
            ser.append_pair("requestType", request_type.as_str());
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
    use crate::api::profile::{PolicyConstraint, PolicyDefault, ProfilePolicy};

    fn enrollment() -> CertEnrollmentRequest {
        let mut req = CertEnrollmentRequest {
            profile_id: "caUserCert".into(),
            .. Default::default()
        };
        req.set_attribute_value("certReqInputImpl", "cert_request_type", "pkcs10");
        req.set_attribute_value("certReqInputImpl", "cert_request", "PEM");
        req.set_attribute_value("subjectNameInputImpl", "sn_uid", "testuser");
        req
    }

    #[test]
    fn enrollment_attribute_helpers() {
        let req = enrollment();
        assert_eq!(req.inputs.len(), 2);
        assert_eq!(req.inputs[0].id, "i1");
        assert_eq!(req.inputs[1].id, "i2");
        assert_eq!(req.attribute_value("cert_request_type"), Some("pkcs10"));
        assert_eq!(req.attribute_value("sn_uid"), Some("testuser"));
        assert_eq!(req.attribute_value("sn_e"), None);
        assert!(req.get_input("subjectNameInputImpl").is_some());
    }

    #[test]
    fn enrollment_text_lists_inputs() {
        let text = enrollment().to_string();
        assert!(text.starts_with("Profile: caUserCert\n"));
        assert!(text.contains("  Input i1: certReqInputImpl\n"));
        assert!(text.contains("    cert_request_type: pkcs10\n"));
        assert!(text.contains("    sn_uid: testuser\n"));
        assert!(!text.contains("Renewal"));
    }

    #[test]
    fn enrollment_json_names() {
        let req = enrollment();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["ProfileID"], "caUserCert");
        assert_eq!(json["Renewal"], false);
        assert_eq!(json["Input"][0]["ClassID"], "certReqInputImpl");
        let back: CertEnrollmentRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn review_response_flattens_request() {
        let mut set = PolicySet::new("userCertSet");
        let mut default = PolicyDefault::new(
            "Validity Default", "validityDefaultImpl"
        );
        default.add_attribute(ProfileAttribute::new("notAfter").with_value("x"));
        set.policies.push(ProfilePolicy {
            id: "2".into(),
            default,
            constraint: PolicyConstraint::new("No Constraint", "noConstraintImpl"),
        });
        let now = Utc::now();
        let mut review = CertReviewResponse {
            request: enrollment(),
            id: RequestId::new(7),
            request_type: RequestType::Enrollment,
            status: RequestStatus::Pending,
            owner: None,
            created: now,
            modified: now,
            notes: None,
            nonce: "abc".into(),
            policy_sets: vec![set],
        };
        assert!(review.set_policy_value("notAfter", "y"));
        assert!(!review.set_policy_value("unknown", "y"));

        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["ProfileID"], "caUserCert");
        assert_eq!(json["requestId"], "7");
        assert_eq!(json["requestStatus"], "pending");
        assert_eq!(
            json["ProfilePolicySet"][0]["value"][0]["def"]["policyAttribute"]
                [0]["Value"],
            "y"
        );
        let back: CertReviewResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, review);
    }

    #[test]
    fn terminal_states() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Canceled.is_terminal());
    }

    #[test]
    fn request_query_string() {
        let query = RequestQuery {
            status: Some(RequestStatus::Pending),
            request_type: Some(RequestType::Enrollment),
            start: 2,
            size: None,
        };
        assert_eq!(
            query.to_query(), "requestState=pending&requestType=enrollment&start=2"
        );
        assert_eq!(
            RequestQuery::from_query(Some(&query.to_query())).unwrap(), query
        );
    }
}
