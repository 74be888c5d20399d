//! Certificate profiles.
//!
//! A profile describes which inputs an enrollment request must carry, which
//! outputs are produced, and the policy sets that populate and check every
//! certificate issued under it. The field names used on the wire are those
//! of the REST JSON surface.

pub use self::raw::RawProfileError;

mod raw;

use std::fmt;
use serde::{Deserialize, Serialize};


//------------ Descriptor ----------------------------------------------------

/// Describes the syntax of an attribute for user interfaces.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Descriptor {
    #[serde(
        rename = "Syntax", default, skip_serializing_if = "Option::is_none"
    )]
    pub syntax: Option<String>,

    #[serde(
        rename = "Constraint", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub constraint: Option<String>,

    #[serde(
        rename = "Description", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        rename = "DefaultValue", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<String>,
}

impl Descriptor {
    pub fn new(syntax: &str, description: &str) -> Self {
        Descriptor {
            syntax: Some(syntax.to_string()),
            constraint: None,
            description: Some(description.to_string()),
            default_value: None,
        }
    }
}


//------------ ProfileAttribute ----------------------------------------------

/// A named attribute, optionally carrying a value.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileAttribute {
    pub name: String,

    #[serde(
        rename = "Value", default, skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,

    #[serde(
        rename = "Descriptor", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub descriptor: Option<Descriptor>,
}

impl ProfileAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        ProfileAttribute {
            name: name.into(),
            value: None,
            descriptor: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }
}

/// Adds an attribute, replacing an existing one with the same name.
fn put_attribute(list: &mut Vec<ProfileAttribute>, attr: ProfileAttribute) {
    match list.iter_mut().find(|item| item.name == attr.name) {
        Some(existing) => *existing = attr,
        None => list.push(attr),
    }
}

fn take_attribute(
    list: &mut Vec<ProfileAttribute>, name: &str
) -> Option<ProfileAttribute> {
    let pos = list.iter().position(|item| item.name == name)?;
    Some(list.remove(pos))
}

fn find_attribute<'a>(
    list: &'a [ProfileAttribute], name: &str
) -> Option<&'a ProfileAttribute> {
    list.iter().find(|item| item.name == name)
}


//------------ ProfileParameter ----------------------------------------------

/// A configuration parameter of a policy default.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileParameter {
    pub name: String,

    #[serde(default)]
    pub value: String,
}

impl ProfileParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        ProfileParameter { name: name.into(), value: value.into() }
    }
}


//------------ ProfileInput --------------------------------------------------

/// An input an enrollment request has to provide.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileInput {
    pub id: String,

    #[serde(rename = "ClassID")]
    pub class_id: String,

    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "Text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<ProfileAttribute>,

    #[serde(rename = "ConfigAttribute", default)]
    pub config_attributes: Vec<ProfileAttribute>,
}

impl ProfileInput {
    pub fn new(id: impl Into<String>, class_id: impl Into<String>) -> Self {
        ProfileInput {
            id: id.into(),
            class_id: class_id.into(),
            name: None,
            text: None,
            attributes: Vec::new(),
            config_attributes: Vec::new(),
        }
    }

    /// Adds an attribute, replacing any attribute with the same name.
    pub fn add_attribute(&mut self, attr: ProfileAttribute) {
        put_attribute(&mut self.attributes, attr)
    }

    /// Removes the attribute with the given name, returning it.
    pub fn remove_attribute(&mut self, name: &str) -> Option<ProfileAttribute> {
        take_attribute(&mut self.attributes, name)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&ProfileAttribute> {
        find_attribute(&self.attributes, name)
    }

    pub fn add_config_attribute(&mut self, attr: ProfileAttribute) {
        put_attribute(&mut self.config_attributes, attr)
    }

    pub fn remove_config_attribute(
        &mut self, name: &str
    ) -> Option<ProfileAttribute> {
        take_attribute(&mut self.config_attributes, name)
    }

    pub fn get_config_attribute(&self, name: &str) -> Option<&ProfileAttribute> {
        find_attribute(&self.config_attributes, name)
    }

    /// Returns the value of the named attribute if it is set and not empty.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get_attribute(name)
            .and_then(|attr| attr.value.as_deref())
            .filter(|value| !value.is_empty())
    }
}


//------------ ProfileOutput -------------------------------------------------

/// An output produced for an approved request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileOutput {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(rename = "classId")]
    pub class_id: String,

    #[serde(default)]
    pub attributes: Vec<ProfileAttribute>,
}

impl ProfileOutput {
    pub fn new(id: impl Into<String>, class_id: impl Into<String>) -> Self {
        ProfileOutput {
            id: id.into(),
            name: None,
            text: None,
            class_id: class_id.into(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attr: ProfileAttribute) {
        put_attribute(&mut self.attributes, attr)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<ProfileAttribute> {
        take_attribute(&mut self.attributes, name)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&ProfileAttribute> {
        find_attribute(&self.attributes, name)
    }
}


//------------ PolicyDefault -------------------------------------------------

/// Populates part of the certificate being built.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PolicyDefault {
    /// The display name of the default.
    #[serde(rename = "id")]
    pub name: String,

    #[serde(rename = "classId")]
    pub class_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The values this default populated, exposed for review.
    #[serde(rename = "policyAttribute", default)]
    pub attributes: Vec<ProfileAttribute>,

    #[serde(rename = "params", default)]
    pub params: Vec<ProfileParameter>,
}

impl PolicyDefault {
    pub fn new(name: impl Into<String>, class_id: impl Into<String>) -> Self {
        PolicyDefault {
            name: name.into(),
            class_id: class_id.into(),
            description: None,
            attributes: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.iter()
            .find(|param| param.name == name)
            .map(|param| param.value.as_str())
    }

    pub fn set_param(&mut self, name: &str, value: &str) {
        match self.params.iter_mut().find(|param| param.name == name) {
            Some(param) => param.value = value.to_string(),
            None => self.params.push(ProfileParameter::new(name, value)),
        }
    }

    pub fn add_attribute(&mut self, attr: ProfileAttribute) {
        put_attribute(&mut self.attributes, attr)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&ProfileAttribute> {
        find_attribute(&self.attributes, name)
    }
}


//------------ PolicyConstraintValue -----------------------------------------

/// A configured value of a policy constraint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PolicyConstraintValue {
    /// The parameter name.
    #[serde(rename = "id")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Descriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}


//------------ PolicyConstraint ----------------------------------------------

/// Checks part of the certificate being built.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PolicyConstraint {
    /// The display name of the constraint.
    #[serde(rename = "id")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "classId")]
    pub class_id: String,

    #[serde(rename = "constraint", default)]
    pub values: Vec<PolicyConstraintValue>,
}

impl PolicyConstraint {
    pub fn new(name: impl Into<String>, class_id: impl Into<String>) -> Self {
        PolicyConstraint {
            name: name.into(),
            description: None,
            class_id: class_id.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.set_value(name, value);
        self
    }

    /// Returns the configured value, treating empty values as absent.
    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.values.iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_deref())
            .filter(|value| !value.is_empty())
    }

    pub fn set_value(&mut self, name: &str, value: &str) {
        match self.values.iter_mut().find(|item| item.name == name) {
            Some(item) => item.value = Some(value.to_string()),
            None => self.values.push(PolicyConstraintValue {
                name: name.to_string(),
                descriptor: None,
                value: Some(value.to_string()),
            }),
        }
    }
}


//------------ ProfilePolicy -------------------------------------------------

/// Pairs a policy default with a policy constraint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfilePolicy {
    pub id: String,

    #[serde(rename = "def")]
    pub default: PolicyDefault,

    pub constraint: PolicyConstraint,
}


//------------ PolicySet -----------------------------------------------------

/// An ordered list of policies.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PolicySet {
    pub id: String,

    #[serde(rename = "value", default)]
    pub policies: Vec<ProfilePolicy>,
}

impl PolicySet {
    pub fn new(id: impl Into<String>) -> Self {
        PolicySet { id: id.into(), policies: Vec::new() }
    }

    pub fn get_policy(&self, id: &str) -> Option<&ProfilePolicy> {
        self.policies.iter().find(|policy| policy.id == id)
    }
}


//------------ PolicySetList -------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PolicySetList {
    #[serde(rename = "PolicySet", default)]
    pub policy_sets: Vec<PolicySet>,
}


//------------ Profile -------------------------------------------------------

/// A certificate profile.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Profile {
    pub id: String,

    #[serde(rename = "classId")]
    pub class_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(
        rename = "enabledBy", default, skip_serializing_if = "Option::is_none"
    )]
    pub enabled_by: Option<String>,

    #[serde(
        rename = "authenticatorId", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticator_id: Option<String>,

    #[serde(
        rename = "authzAcl", default, skip_serializing_if = "Option::is_none"
    )]
    pub authz_acl: Option<String>,

    #[serde(default)]
    pub renewal: bool,

    #[serde(rename = "xmlOutput", default)]
    pub xml_output: bool,

    #[serde(rename = "Input", default)]
    pub inputs: Vec<ProfileInput>,

    #[serde(rename = "Output", default)]
    pub outputs: Vec<ProfileOutput>,

    #[serde(rename = "PolicySets", default)]
    pub policy_sets: PolicySetList,
}

fn default_visible() -> bool {
    true
}

impl Profile {
    pub fn new(id: impl Into<String>, class_id: impl Into<String>) -> Self {
        Profile {
            id: id.into(),
            class_id: class_id.into(),
            name: None,
            description: None,
            enabled: false,
            visible: true,
            enabled_by: None,
            authenticator_id: None,
            authz_acl: None,
            renewal: false,
            xml_output: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            policy_sets: PolicySetList::default(),
        }
    }

    /// Adds an input, replacing an existing input with the same id.
    pub fn add_input(&mut self, input: ProfileInput) {
        match self.inputs.iter_mut().find(|item| item.id == input.id) {
            Some(existing) => *existing = input,
            None => self.inputs.push(input),
        }
    }

    pub fn remove_input(&mut self, id: &str) -> Option<ProfileInput> {
        let pos = self.inputs.iter().position(|item| item.id == id)?;
        Some(self.inputs.remove(pos))
    }

    pub fn get_input(&self, id: &str) -> Option<&ProfileInput> {
        self.inputs.iter().find(|item| item.id == id)
    }

    /// Adds an output, replacing an existing output with the same id.
    pub fn add_output(&mut self, output: ProfileOutput) {
        match self.outputs.iter_mut().find(|item| item.id == output.id) {
            Some(existing) => *existing = output,
            None => self.outputs.push(output),
        }
    }

    pub fn remove_output(&mut self, id: &str) -> Option<ProfileOutput> {
        let pos = self.outputs.iter().position(|item| item.id == id)?;
        Some(self.outputs.remove(pos))
    }

    pub fn get_output(&self, id: &str) -> Option<&ProfileOutput> {
        self.outputs.iter().find(|item| item.id == id)
    }

    /// Adds a policy set, replacing an existing set with the same id.
    pub fn add_policy_set(&mut self, set: PolicySet) {
        let sets = &mut self.policy_sets.policy_sets;
        match sets.iter_mut().find(|item| item.id == set.id) {
            Some(existing) => *existing = set,
            None => sets.push(set),
        }
    }

    pub fn remove_policy_set(&mut self, id: &str) -> Option<PolicySet> {
        let sets = &mut self.policy_sets.policy_sets;
        let pos = sets.iter().position(|item| item.id == id)?;
        Some(sets.remove(pos))
    }

    pub fn get_policy_set(&self, id: &str) -> Option<&PolicySet> {
        self.policy_sets.policy_sets.iter().find(|item| item.id == id)
    }

    pub fn policy_sets(&self) -> &[PolicySet] {
        &self.policy_sets.policy_sets
    }

    /// Returns the summary used in profile listings.
    pub fn info(&self, service_uri: &str) -> ProfileDataInfo {
        ProfileDataInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            url: Some(format!("{}ca/rest/profiles/{}", service_uri, self.id)),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Profile ID: {}", self.id)?;
        if let Some(name) = &self.name {
            writeln!(f, "Name: {name}")?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "Description: {description}")?;
        }
        writeln!(f, "Enabled: {}", self.enabled)?;
        writeln!(f, "Visible: {}", self.visible)?;
        if let Some(by) = &self.enabled_by {
            writeln!(f, "Enabled By: {by}")?;
        }
        if let Some(auth) = &self.authenticator_id {
            writeln!(f, "Authenticator: {auth}")?;
        }
        for input in &self.inputs {
            writeln!(f)?;
            writeln!(
                f, "  Input {} ({}): {}",
                input.id, input.class_id,
                input.name.as_deref().unwrap_or("")
            )?;
            for attr in &input.attributes {
                writeln!(f, "    {}", attr.name)?;
            }
        }
        for output in &self.outputs {
            writeln!(f)?;
            writeln!(f, "  Output {} ({})", output.id, output.class_id)?;
        }
        for set in self.policy_sets() {
            writeln!(f)?;
            writeln!(f, "  Policy Set: {}", set.id)?;
            for policy in &set.policies {
                writeln!(
                    f, "    {}: {} / {}",
                    policy.id, policy.default.name, policy.constraint.name
                )?;
            }
        }
        Ok(())
    }
}


//------------ ProfileDataInfo -----------------------------------------------

/// Summary information about a profile.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileDataInfo {
    #[serde(rename = "profileId")]
    pub id: String,

    #[serde(
        rename = "profileName", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    #[serde(
        rename = "profileDescription", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        rename = "profileURL", default,
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
}


//------------ ProfileDataInfos ----------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProfileDataInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<ProfileDataInfo>,
}

impl fmt::Display for ProfileDataInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for entry in &self.entries {
            writeln!(f)?;
            writeln!(f, "  Profile ID: {}", entry.id)?;
            if let Some(name) = &entry.name {
                writeln!(f, "  Profile Name: {name}")?;
            }
            if let Some(description) = &entry.description {
                writeln!(f, "  Profile Description: {description}")?;
            }
        }
        Ok(())
    }
}


//------------ RawProfile ----------------------------------------------------

/// A profile in the raw property format.
///
/// This is the representation used by `show --raw` and `add --raw`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RawProfile {
    pub content: String,
}

impl fmt::Display for RawProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.content)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_req_input() -> ProfileInput {
        let mut input = ProfileInput::new("i1", "certReqInputImpl");
        input.name = Some("Certificate Request".into());
        input.add_attribute(
            ProfileAttribute::new("cert_request_type").with_descriptor(
                Descriptor::new("cert_request_type", "Certificate Request Type")
            )
        );
        input.add_attribute(
            ProfileAttribute::new("cert_request").with_descriptor(
                Descriptor::new("cert_request", "Certificate Request")
            )
        );
        input
    }

    #[test]
    fn input_attributes_are_unique_by_name() {
        let mut input = cert_req_input();
        assert_eq!(input.attributes.len(), 2);

        input.add_attribute(
            ProfileAttribute::new("cert_request").with_value("abc")
        );
        assert_eq!(input.attributes.len(), 2);
        assert_eq!(input.value("cert_request"), Some("abc"));

        let removed = input.remove_attribute("cert_request").unwrap();
        assert_eq!(removed.value.as_deref(), Some("abc"));
        assert!(input.get_attribute("cert_request").is_none());
        assert!(input.remove_attribute("cert_request").is_none());
    }

    #[test]
    fn add_then_remove_leaves_nothing() {
        let mut input = ProfileInput::new("i2", "subjectNameInputImpl");
        input.add_config_attribute(ProfileAttribute::new("sn_uid"));
        input.remove_config_attribute("sn_uid");
        assert!(input.get_config_attribute("sn_uid").is_none());

        let mut output = ProfileOutput::new("o1", "certOutputImpl");
        output.add_attribute(ProfileAttribute::new("pretty_cert"));
        output.remove_attribute("pretty_cert");
        assert!(output.get_attribute("pretty_cert").is_none());
    }

    #[test]
    fn profile_json_uses_rest_names() {
        let mut profile = Profile::new("caTest", "caEnrollImpl");
        profile.name = Some("Test".into());
        profile.add_input(cert_req_input());
        profile.add_output(ProfileOutput::new("o1", "certOutputImpl"));
        let mut set = PolicySet::new("userCertSet");
        set.policies.push(ProfilePolicy {
            id: "1".into(),
            default: PolicyDefault::new(
                "Subject Name Default", "userSubjectNameDefaultImpl"
            ),
            constraint: PolicyConstraint::new(
                "Subject Name Constraint", "subjectNameConstraintImpl"
            ).with_value("pattern", "UID=.*"),
        });
        profile.add_policy_set(set);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["classId"], "caEnrollImpl");
        assert_eq!(json["Input"][0]["ClassID"], "certReqInputImpl");
        assert_eq!(
            json["Input"][0]["Attribute"][0]["Descriptor"]["Syntax"],
            "cert_request_type"
        );
        assert_eq!(json["Output"][0]["classId"], "certOutputImpl");
        let policy = &json["PolicySets"]["PolicySet"][0]["value"][0];
        assert_eq!(policy["def"]["classId"], "userSubjectNameDefaultImpl");
        assert_eq!(policy["constraint"]["constraint"][0]["id"], "pattern");
        assert_eq!(policy["constraint"]["constraint"][0]["value"], "UID=.*");

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn minimal_profile_json_gets_defaults() {
        let profile: Profile = serde_json::from_str(
            r#"{"id":"caMin","classId":"caEnrollImpl"}"#
        ).unwrap();
        assert!(!profile.enabled);
        assert!(profile.visible);
        assert!(profile.inputs.is_empty());
        assert!(profile.policy_sets().is_empty());
    }

    #[test]
    fn policy_set_replacement() {
        let mut profile = Profile::new("caTest", "caEnrollImpl");
        profile.add_policy_set(PolicySet::new("a"));
        profile.add_policy_set(PolicySet::new("a"));
        profile.add_policy_set(PolicySet::new("b"));
        assert_eq!(profile.policy_sets().len(), 2);
        assert!(profile.remove_policy_set("a").is_some());
        assert!(profile.get_policy_set("a").is_none());
        assert!(profile.get_policy_set("b").is_some());
    }
}
