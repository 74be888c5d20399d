//! Policy evaluation for certificate profiles.
//!
//! Every policy of a profile pairs a default, which populates part of the
//! certificate template, with a constraint, which checks the result. The
//! class ids used in profiles are resolved to the [`DefaultKind`] and
//! [`ConstraintKind`] enums.

pub use self::constraints::ConstraintKind;
pub use self::defaults::DefaultKind;
pub use self::template::{
    BasicConstraints, CertTemplate, DistinguishedName, ExtKeyUsage,
    GeneralName, KeyAlgorithm, KeyUsage, PublicKeyInfo, SigningAlg,
    SubjectAltNames,
};

mod constraints;
mod defaults;
mod template;

use std::fmt;
use chrono::{DateTime, Duration, Utc};
use crate::api::cert::CertId;
use crate::api::profile::{
    Descriptor, PolicySet, Profile, ProfileAttribute,
};
use crate::api::request::CertEnrollmentRequest;
use crate::commons::PkiResult;
use crate::commons::error::Error;
use crate::constants::{VALIDITY_MAX_DAYS, VALIDITY_MAX_OFFSET_SECS};


//------------ Input and Output Classes --------------------------------------

pub const CERT_REQ_INPUT: &str = "certReqInputImpl";
pub const SUBJECT_NAME_INPUT: &str = "subjectNameInputImpl";
pub const SUBMITTER_INFO_INPUT: &str = "submitterInfoInputImpl";
pub const SERIAL_RENEW_INPUT: &str = "serialNumRenewInputImpl";

pub const CERT_OUTPUT: &str = "certOutputImpl";
pub const PKCS7_OUTPUT: &str = "pkcs7OutputImpl";

/// Returns the attributes an input class asks for.
pub fn input_attributes(class_id: &str) -> Option<Vec<ProfileAttribute>> {
    let attrs: &[(&str, &str, &str)] = match class_id {
        CERT_REQ_INPUT => &[
            ("cert_request_type", "cert_request_type", "Certificate Request Type"),
            ("cert_request", "cert_request", "Certificate Request"),
        ],
        SUBJECT_NAME_INPUT => &[
            ("sn_uid", "string", "UID"),
            ("sn_e", "string", "Email"),
            ("sn_cn", "string", "Common Name"),
            ("sn_ou", "string", "Organizational Unit"),
            ("sn_o", "string", "Organization"),
            ("sn_c", "string", "Country"),
        ],
        SUBMITTER_INFO_INPUT => &[
            ("requestor_name", "string", "Requestor Name"),
            ("requestor_email", "email", "Requestor Email"),
            ("requestor_phone", "string", "Requestor Phone"),
        ],
        SERIAL_RENEW_INPUT => &[
            ("serial_num", "integer", "Serial Number"),
        ],
        _ => return None,
    };
    Some(
        attrs.iter().map(|(name, syntax, description)| {
            ProfileAttribute::new(*name).with_descriptor(
                Descriptor::new(syntax, description)
            )
        }).collect()
    )
}

/// Returns whether an output class is known.
pub fn is_known_output(class_id: &str) -> bool {
    matches!(class_id, CERT_OUTPUT | PKCS7_OUTPUT)
}

/// The subject name input attributes and the name attributes they map to.
const SUBJECT_NAME_ATTRS: [(&str, &str); 6] = [
    ("sn_uid", "UID"),
    ("sn_e", "E"),
    ("sn_cn", "CN"),
    ("sn_ou", "OU"),
    ("sn_o", "O"),
    ("sn_c", "C"),
];


//------------ SubjectLookup -------------------------------------------------

/// Answers whether a subject name is already taken.
pub trait SubjectLookup {
    /// Returns whether a valid certificate other than `exclude` has the
    /// given subject.
    fn subject_in_use(
        &self, subject: &DistinguishedName, exclude: Option<CertId>
    ) -> PkiResult<bool>;
}


//------------ PolicyContext -------------------------------------------------

/// Everything the policies need to know about a request.
pub struct PolicyContext<'a> {
    pub request: &'a CertEnrollmentRequest,

    /// The subject from the CSR or the certificate being renewed.
    pub subject: Option<&'a DistinguishedName>,

    pub public_key: &'a PublicKeyInfo,

    /// The certificate being renewed, if any.
    pub renewal_of: Option<CertId>,

    pub ca_key: KeyAlgorithm,
    pub ca_not_after: DateTime<Utc>,
    pub subjects: &'a dyn SubjectLookup,
    pub now: DateTime<Utc>,
}

impl PolicyContext<'_> {
    /// Replaces `$request.<attr>$` tokens in a pattern.
    ///
    /// Input attribute values take precedence. `$request.cn$` falls back
    /// to the common name of the subject. Unknown attributes are replaced
    /// by an empty string.
    pub fn substitute(
        &self, pattern: &str, subject: Option<&DistinguishedName>
    ) -> String {
        let mut res = String::new();
        let mut rest = pattern;
        while let Some(start) = rest.find("$request.") {
            res.push_str(&rest[..start]);
            let tail = &rest[start + "$request.".len()..];
            let Some(end) = tail.find('$') else {
                res.push_str(&rest[start..]);
                return res
            };
            let attr = &tail[..end];
            let value = self.request.attribute_value(attr).or_else(|| {
                if attr.eq_ignore_ascii_case("cn") {
                    subject.or(self.subject).and_then(|dn| dn.get("CN"))
                }
                else {
                    None
                }
            });
            if let Some(value) = value {
                res.push_str(value)
            }
            rest = &tail[end + 1..];
        }
        res.push_str(rest);
        res
    }

    /// Builds a subject name from the subject name input, if present.
    fn input_subject(&self) -> Option<DistinguishedName> {
        let attrs: Vec<_> = SUBJECT_NAME_ATTRS.iter().filter_map(|(input, key)| {
            self.request.attribute_value(input).map(|value| {
                (key.to_string(), value.to_string())
            })
        }).collect();
        if attrs.is_empty() {
            None
        }
        else {
            Some(DistinguishedName::new(attrs))
        }
    }
}


//------------ PolicyEdit ----------------------------------------------------

/// An agent supplied value for a policy attribute.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PolicyEdit {
    pub set: String,
    pub policy: String,
    pub name: String,
    pub value: String,
}

/// Returns the attribute values in `posted` that differ from `computed`.
pub fn collect_edits(
    computed: &[PolicySet], posted: &[PolicySet]
) -> Vec<PolicyEdit> {
    let mut res = Vec::new();
    for set in posted {
        let Some(computed_set) = computed.iter().find(|s| s.id == set.id) else {
            continue
        };
        for policy in &set.policies {
            let Some(computed_policy) = computed_set.get_policy(&policy.id)
            else {
                continue
            };
            for attr in &policy.default.attributes {
                let Some(value) = attr.value.as_ref() else { continue };
                let current = computed_policy.default
                    .get_attribute(&attr.name)
                    .and_then(|attr| attr.value.as_ref());
                if current.is_some() && current != Some(value) {
                    res.push(PolicyEdit {
                        set: set.id.clone(),
                        policy: policy.id.clone(),
                        name: attr.name.clone(),
                        value: value.clone(),
                    })
                }
            }
        }
    }
    res
}

/// Adds new edits to existing ones, replacing edits of the same attribute.
pub fn merge_edits(existing: &mut Vec<PolicyEdit>, new: Vec<PolicyEdit>) {
    for edit in new {
        existing.retain(|item| {
            item.set != edit.set
                || item.policy != edit.policy
                || item.name != edit.name
        });
        existing.push(edit);
    }
}


//------------ ConstraintViolation -------------------------------------------

/// A request does not satisfy a policy constraint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConstraintViolation {
    /// The id of the violated policy.
    pub policy: String,

    /// The display name of the constraint.
    pub constraint: String,

    pub msg: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "Request rejected by policy '{}' ({}): {}",
            self.policy, self.constraint, self.msg
        )
    }
}


//------------ Evaluation ----------------------------------------------------

/// Builds the certificate template for a request.
///
/// Applies the defaults of all policies in order, then the edits, and
/// finally resolves the signing algorithm against the CA key.
pub fn build_template(
    profile: &Profile, ctx: &PolicyContext, edits: &[PolicyEdit],
) -> PkiResult<CertTemplate> {
    let mut template = CertTemplate::default();
    for set in profile.policy_sets() {
        for policy in &set.policies {
            let kind = default_kind(profile, &policy.default.class_id)?;
            kind.apply(&policy.default, ctx, &mut template).map_err(|err| {
                Error::RequestInvalid(format!("policy '{}': {}", policy.id, err))
            })?;
        }
    }

    for edit in edits {
        let policy = profile.get_policy_set(&edit.set)
            .and_then(|set| set.get_policy(&edit.policy))
            .ok_or_else(|| {
                Error::RequestInvalid(format!(
                    "unknown policy '{}' in set '{}'", edit.policy, edit.set
                ))
            })?;
        let kind = default_kind(profile, &policy.default.class_id)?;
        kind.set_attribute(&mut template, &edit.name, &edit.value)
            .map_err(|err| {
                Error::RequestInvalid(format!(
                    "policy '{}' attribute '{}': {}",
                    edit.policy, edit.name, err
                ))
            })?;
    }

    match template.signing_alg {
        None => {
            template.signing_alg = Some(SigningAlg::default_for(ctx.ca_key))
        }
        Some(alg) if alg.key_algorithm() != ctx.ca_key => {
            return Err(Error::RequestInvalid(format!(
                "signing algorithm {} cannot be used with a {} CA key",
                alg, ctx.ca_key
            )))
        }
        _ => { }
    }

    Ok(template)
}

/// Checks the template against every constraint of the profile.
///
/// Returns the first violation as `Error::RequestConstraint`.
pub fn validate(
    profile: &Profile, ctx: &PolicyContext, template: &CertTemplate,
) -> PkiResult<()> {
    for set in profile.policy_sets() {
        for policy in &set.policies {
            let kind = constraint_kind(profile, &policy.constraint.class_id)?;
            if let Some(msg) = kind.check(&policy.constraint, template, ctx)? {
                return Err(Error::RequestConstraint(ConstraintViolation {
                    policy: policy.id.clone(),
                    constraint: policy.constraint.name.clone(),
                    msg,
                }))
            }
        }
    }
    Ok(())
}

/// Returns the policy sets of a profile with the template values filled in.
pub fn review_policy_sets(
    profile: &Profile, template: &CertTemplate
) -> PkiResult<Vec<PolicySet>> {
    let mut sets = profile.policy_sets().to_vec();
    for set in &mut sets {
        for policy in &mut set.policies {
            let kind = default_kind(profile, &policy.default.class_id)?;
            for attr in kind.attributes(template) {
                policy.default.add_attribute(attr);
            }
        }
    }
    Ok(sets)
}

/// Checks that a profile only uses known classes with valid parameters.
pub fn check_profile(profile: &Profile) -> PkiResult<()> {
    for input in &profile.inputs {
        if input_attributes(&input.class_id).is_none() {
            return Err(Error::invalid_profile(
                &profile.id,
                format_args!("unknown input class '{}'", input.class_id)
            ))
        }
    }
    for output in &profile.outputs {
        if !is_known_output(&output.class_id) {
            return Err(Error::invalid_profile(
                &profile.id,
                format_args!("unknown output class '{}'", output.class_id)
            ))
        }
    }
    for set in profile.policy_sets() {
        for policy in &set.policies {
            default_kind(profile, &policy.default.class_id)?
                .check_params(&policy.default)
                .map_err(|err| {
                    Error::invalid_profile(
                        &profile.id,
                        format_args!("policy '{}' default: {}", policy.id, err)
                    )
                })?;
            constraint_kind(profile, &policy.constraint.class_id)?
                .check_params(&policy.constraint)
                .map_err(|err| {
                    Error::invalid_profile(
                        &profile.id,
                        format_args!(
                            "policy '{}' constraint: {}", policy.id, err
                        )
                    )
                })?;
        }
    }
    Ok(())
}

fn default_kind(profile: &Profile, class_id: &str) -> PkiResult<DefaultKind> {
    class_id.parse().map_err(|err| Error::invalid_profile(&profile.id, err))
}

fn constraint_kind(
    profile: &Profile, class_id: &str
) -> PkiResult<ConstraintKind> {
    class_id.parse().map_err(|err| Error::invalid_profile(&profile.id, err))
}


//------------ Parameter Helpers ---------------------------------------------

/// Parses a boolean parameter. Missing or empty values are `false`.
fn parse_bool(name: &str, value: Option<&str>) -> Result<bool, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => {
            Err(format!("invalid boolean '{value}' for '{name}'"))
        }
    }
}

/// Parses a tri-state parameter: `true`, `false`, or `-` for don't care.
fn parse_tristate(
    name: &str, value: Option<&str>
) -> Result<Option<bool>, String> {
    match value.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        value => parse_bool(name, value).map(Some),
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &str, value: Option<&str>, default: T
) -> Result<T, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| {
            format!("invalid number '{value}' for '{name}'")
        })
    }
}

/// Parses a validity length in days.
fn parse_days(
    name: &str, value: Option<&str>, default: i64
) -> Result<Duration, String> {
    let days = parse_number(name, value, default)?;
    if !(1..=VALIDITY_MAX_DAYS).contains(&days) {
        return Err(format!(
            "'{name}' must be between 1 and {VALIDITY_MAX_DAYS} days"
        ))
    }
    Duration::try_days(days).ok_or_else(|| format!("'{name}' out of range"))
}

/// Parses an offset in seconds from the current time.
fn parse_offset(name: &str, value: Option<&str>) -> Result<Duration, String> {
    let secs: i64 = parse_number(name, value, 0)?;
    if !(-VALIDITY_MAX_OFFSET_SECS..=VALIDITY_MAX_OFFSET_SECS).contains(&secs) {
        return Err(format!(
            "'{name}' must not exceed {VALIDITY_MAX_OFFSET_SECS} seconds"
        ))
    }
    Duration::try_seconds(secs).ok_or_else(|| format!("'{name}' out of range"))
}

/// Adds a duration to a time, failing instead of overflowing.
fn add_duration(
    time: DateTime<Utc>, duration: Duration
) -> Result<DateTime<Utc>, String> {
    time.checked_add_signed(duration).ok_or_else(|| {
        format!("time {time} plus {duration} is out of range")
    })
}

/// Splits a comma separated list, ignoring empty items.
fn parse_list(value: Option<&str>) -> Vec<String> {
    value.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Checks that an OID is in dotted decimal form.
fn check_oid(oid: &str) -> Result<(), String> {
    let mut count = 0;
    for arc in oid.split('.') {
        if arc.is_empty() || !arc.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid OID '{oid}'"))
        }
        count += 1;
    }
    if count < 2 {
        return Err(format!("invalid OID '{oid}'"))
    }
    Ok(())
}


//============ Tests =========================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use crate::api::profile::{PolicyConstraint, PolicyDefault, ProfilePolicy};

    pub struct NoSubjects;

    impl SubjectLookup for NoSubjects {
        fn subject_in_use(
            &self, _subject: &DistinguishedName, _exclude: Option<CertId>
        ) -> PkiResult<bool> {
            Ok(false)
        }
    }

    pub struct AllSubjects;

    impl SubjectLookup for AllSubjects {
        fn subject_in_use(
            &self, _subject: &DistinguishedName, exclude: Option<CertId>
        ) -> PkiResult<bool> {
            Ok(exclude.is_none())
        }
    }

    pub fn ec_key_info() -> PublicKeyInfo {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        let der = PKey::from_ec_key(key).unwrap().public_key_to_der().unwrap();
        let key = PKey::public_key_from_der(&der).unwrap();
        PublicKeyInfo::from_pkey(&key).unwrap()
    }

    pub fn context<'a>(
        request: &'a CertEnrollmentRequest,
        subject: Option<&'a DistinguishedName>,
        key: &'a PublicKeyInfo,
        subjects: &'a dyn SubjectLookup,
    ) -> PolicyContext<'a> {
        let now = Utc::now();
        PolicyContext {
            request,
            subject,
            public_key: key,
            renewal_of: None,
            ca_key: KeyAlgorithm::Ec,
            ca_not_after: now + chrono::Duration::days(3650),
            subjects,
            now,
        }
    }

    fn policy(
        id: &str, default: PolicyDefault, constraint: PolicyConstraint
    ) -> ProfilePolicy {
        ProfilePolicy { id: id.into(), default, constraint }
    }

    pub fn user_profile() -> Profile {
        let mut profile = Profile::new("testUserCert", "caEnrollImpl");
        let mut set = PolicySet::new("userCertSet");
        set.policies.push(policy(
            "1",
            PolicyDefault::new("Subject Name Default", "userSubjectNameDefaultImpl"),
            PolicyConstraint::new("Subject Name Constraint", "subjectNameConstraintImpl")
                .with_value("pattern", "UID=.*"),
        ));
        set.policies.push(policy(
            "2",
            PolicyDefault::new("Validity Default", "validityDefaultImpl")
                .with_param("range", "180")
                .with_param("startTime", "0"),
            PolicyConstraint::new("Validity Constraint", "validityConstraintImpl")
                .with_value("range", "365")
                .with_value("notBeforeCheck", "false")
                .with_value("notAfterCheck", "false"),
        ));
        set.policies.push(policy(
            "3",
            PolicyDefault::new("Key Default", "userKeyDefaultImpl"),
            PolicyConstraint::new("Key Constraint", "keyConstraintImpl")
                .with_value("keyType", "-")
                .with_value("keyParameters", "2048,3072,4096,nistp256,nistp384"),
        ));
        set.policies.push(policy(
            "4",
            PolicyDefault::new("Key Usage Default", "keyUsageExtDefaultImpl")
                .with_param("keyUsageCritical", "true")
                .with_param("keyUsageDigitalSignature", "true")
                .with_param("keyUsageKeyEncipherment", "true"),
            PolicyConstraint::new("Key Usage Constraint", "keyUsageExtConstraintImpl")
                .with_value("keyUsageCritical", "true")
                .with_value("keyUsageKeyCertSign", "false"),
        ));
        set.policies.push(policy(
            "5",
            PolicyDefault::new("Signing Alg", "signingAlgDefaultImpl")
                .with_param("signingAlg", "-"),
            PolicyConstraint::new("No Constraint", "noConstraintImpl"),
        ));
        profile.add_policy_set(set);
        profile
    }

    #[test]
    fn substitute_request_attributes() {
        let mut request = CertEnrollmentRequest::default();
        request.set_attribute_value(SUBJECT_NAME_INPUT, "sn_uid", "jdoe");
        let subject: DistinguishedName = "CN=www.example.com".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);

        assert_eq!(
            ctx.substitute("UID=$request.sn_uid$,O=$request.missing$", None),
            "UID=jdoe,O="
        );
        assert_eq!(ctx.substitute("$request.cn$", None), "www.example.com");
        assert_eq!(ctx.substitute("broken $request.x", None), "broken $request.x");
    }

    #[test]
    fn build_and_validate_user_cert() {
        let profile = user_profile();
        check_profile(&profile).unwrap();

        let request = CertEnrollmentRequest::default();
        let subject: DistinguishedName = "UID=jdoe,O=EXAMPLE".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);

        let template = build_template(&profile, &ctx, &[]).unwrap();
        assert_eq!(template.subject.as_ref(), Some(&subject));
        assert_eq!(template.signing_alg, Some(SigningAlg::Sha256WithEc));
        let (not_before, not_after) = template.validity().unwrap();
        assert_eq!((not_after - not_before).num_days(), 180);
        validate(&profile, &ctx, &template).unwrap();
    }

    #[test]
    fn every_violated_constraint_rejects() {
        let profile = user_profile();
        let request = CertEnrollmentRequest::default();
        let key = ec_key_info();

        // Subject does not match the pattern.
        let subject: DistinguishedName = "CN=jdoe".parse().unwrap();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);
        let template = build_template(&profile, &ctx, &[]).unwrap();
        match validate(&profile, &ctx, &template) {
            Err(Error::RequestConstraint(violation)) => {
                assert_eq!(violation.policy, "1")
            }
            other => panic!("expected violation, got {other:?}"),
        }

        // Validity extended beyond the allowed range by an agent edit.
        let subject: DistinguishedName = "UID=jdoe".parse().unwrap();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);
        let not_after = (Utc::now() + chrono::Duration::days(400))
            .format("%Y-%m-%d %H:%M:%S").to_string();
        let edits = vec![PolicyEdit {
            set: "userCertSet".into(),
            policy: "2".into(),
            name: "notAfter".into(),
            value: not_after,
        }];
        let template = build_template(&profile, &ctx, &edits).unwrap();
        match validate(&profile, &ctx, &template) {
            Err(Error::RequestConstraint(violation)) => {
                assert_eq!(violation.policy, "2")
            }
            other => panic!("expected violation, got {other:?}"),
        }

        // Key usage flag the constraint forbids.
        let edits = vec![PolicyEdit {
            set: "userCertSet".into(),
            policy: "4".into(),
            name: "keyUsageKeyCertSign".into(),
            value: "true".into(),
        }];
        let template = build_template(&profile, &ctx, &edits).unwrap();
        match validate(&profile, &ctx, &template) {
            Err(Error::RequestConstraint(violation)) => {
                assert_eq!(violation.policy, "4")
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn signing_alg_must_match_ca_key() {
        let profile = user_profile();
        let request = CertEnrollmentRequest::default();
        let subject: DistinguishedName = "UID=jdoe".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);
        let edits = vec![PolicyEdit {
            set: "userCertSet".into(),
            policy: "5".into(),
            name: "signingAlg".into(),
            value: "SHA256withRSA".into(),
        }];
        assert!(matches!(
            build_template(&profile, &ctx, &edits),
            Err(Error::RequestInvalid(_))
        ));
    }

    #[test]
    fn review_and_collect_edits() {
        let profile = user_profile();
        let request = CertEnrollmentRequest::default();
        let subject: DistinguishedName = "UID=jdoe".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);
        let template = build_template(&profile, &ctx, &[]).unwrap();

        let computed = review_policy_sets(&profile, &template).unwrap();
        let name = computed[0].get_policy("1").unwrap()
            .default.get_attribute("name").unwrap();
        assert_eq!(name.value.as_deref(), Some("UID=jdoe"));
        assert!(collect_edits(&computed, &computed).is_empty());

        let mut posted = computed.clone();
        let policy = &mut posted[0].policies[0];
        policy.default.add_attribute(
            ProfileAttribute::new("name").with_value("UID=jane")
        );
        let edits = collect_edits(&computed, &posted);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].value, "UID=jane");

        let mut existing = edits.clone();
        merge_edits(&mut existing, vec![PolicyEdit {
            value: "UID=joe".into(), ..edits[0].clone()
        }]);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].value, "UID=joe");
    }

    #[test]
    fn check_profile_rejects_unknown_classes_and_bad_params() {
        let mut profile = user_profile();
        profile.policy_sets.policy_sets[0].policies[0].constraint
            .set_value("pattern", "UID=(");
        assert!(matches!(
            check_profile(&profile), Err(Error::ProfileInvalid(_, _))
        ));

        let mut profile = user_profile();
        profile.policy_sets.policy_sets[0].policies[1].default.class_id =
            "fooDefaultImpl".into();
        assert!(check_profile(&profile).is_err());

        let mut profile = user_profile();
        profile.add_input(crate::api::profile::ProfileInput::new(
            "i1", "fooInputImpl"
        ));
        assert!(check_profile(&profile).is_err());
    }

    #[test]
    fn check_profile_bounds_validity_params() {
        let with_default = |name: &str, value: &str| {
            let mut profile = user_profile();
            profile.policy_sets.policy_sets[0].policies[1].default
                .set_param(name, value);
            profile
        };
        let with_constraint = |name: &str, value: &str| {
            let mut profile = user_profile();
            profile.policy_sets.policy_sets[0].policies[1].constraint
                .set_value(name, value);
            profile
        };

        for profile in [
            with_default("range", "100000000"),
            with_default("range", "0"),
            with_default("startTime", "9223372036854775807"),
            with_default("startTime", "-9223372036854775808"),
            with_constraint("range", "100000000"),
            with_constraint("notBeforeGracePeriod", "9223372036854775807"),
        ] {
            assert!(matches!(
                check_profile(&profile), Err(Error::ProfileInvalid(_, _))
            ));
        }

        assert!(check_profile(&with_default("range", "36500")).is_ok());
        assert!(check_profile(&with_default("startTime", "-86400")).is_ok());
        assert!(
            check_profile(&with_constraint("notBeforeGracePeriod", "3600"))
                .is_ok()
        );
    }

    #[test]
    fn oversized_validity_fails_without_panic() {
        // A stored profile that never went through the checks.
        let mut profile = user_profile();
        profile.policy_sets.policy_sets[0].policies[1].default
            .set_param("range", "100000000");
        let request = CertEnrollmentRequest::default();
        let subject: DistinguishedName = "UID=jdoe".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);
        assert!(build_template(&profile, &ctx, &[]).is_err());
    }

    #[test]
    fn oids_and_flags() {
        assert!(check_oid("1.3.6.1.5.5.7.3.1").is_ok());
        assert!(check_oid("1").is_err());
        assert!(check_oid("1..2").is_err());
        assert_eq!(parse_tristate("x", Some("-")), Ok(None));
        assert_eq!(parse_tristate("x", Some("TRUE")), Ok(Some(true)));
        assert!(parse_bool("x", Some("yes")).is_err());
    }
}
