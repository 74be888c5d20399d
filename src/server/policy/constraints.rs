//! Policy constraints.

use std::str;
use regex::Regex;
use crate::api::profile::PolicyConstraint;
use crate::commons::PkiResult;
use super::{
    add_duration, check_oid, parse_bool, parse_days, parse_list,
    parse_number, parse_offset, parse_tristate, CertTemplate, KeyAlgorithm,
    KeyUsage, PolicyContext, SigningAlg,
};


/// The default longest validity in days.
const DEFAULT_RANGE: i64 = 365;


//------------ ConstraintKind ------------------------------------------------

/// The known policy constraints.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstraintKind {
    NoConstraint,
    SubjectName,
    Validity,
    Key,
    KeyUsage,
    ExtendedKeyUsage,
    BasicConstraints,
    SigningAlg,
    UniqueSubjectName,
}

impl ConstraintKind {
    const ALL: [ConstraintKind; 9] = [
        ConstraintKind::NoConstraint,
        ConstraintKind::SubjectName,
        ConstraintKind::Validity,
        ConstraintKind::Key,
        ConstraintKind::KeyUsage,
        ConstraintKind::ExtendedKeyUsage,
        ConstraintKind::BasicConstraints,
        ConstraintKind::SigningAlg,
        ConstraintKind::UniqueSubjectName,
    ];

    pub fn class_id(self) -> &'static str {
        match self {
            ConstraintKind::NoConstraint => "noConstraintImpl",
            ConstraintKind::SubjectName => "subjectNameConstraintImpl",
            ConstraintKind::Validity => "validityConstraintImpl",
            ConstraintKind::Key => "keyConstraintImpl",
            ConstraintKind::KeyUsage => "keyUsageExtConstraintImpl",
            ConstraintKind::ExtendedKeyUsage => {
                "extendedKeyUsageExtConstraintImpl"
            }
            ConstraintKind::BasicConstraints => {
                "basicConstraintsExtConstraintImpl"
            }
            ConstraintKind::SigningAlg => "signingAlgConstraintImpl",
            ConstraintKind::UniqueSubjectName => {
                "uniqueSubjectNameConstraintImpl"
            }
        }
    }

    /// Checks the values of a constraint in a profile.
    pub fn check_params(
        self, constraint: &PolicyConstraint
    ) -> Result<(), String> {
        let value = |name| constraint.get_value(name);
        match self {
            ConstraintKind::SubjectName => {
                subject_pattern(value("pattern"))?;
            }
            ConstraintKind::Validity => {
                parse_days("range", value("range"), DEFAULT_RANGE)?;
                parse_offset(
                    "notBeforeGracePeriod", value("notBeforeGracePeriod")
                )?;
                parse_bool("notBeforeCheck", value("notBeforeCheck"))?;
                parse_bool("notAfterCheck", value("notAfterCheck"))?;
            }
            ConstraintKind::Key => {
                key_type(value("keyType"))?;
                for param in parse_list(value("keyParameters")) {
                    if param.parse::<u32>().is_err()
                        && !param.starts_with("nistp")
                    {
                        return Err(format!("invalid key parameter '{param}'"))
                    }
                }
            }
            ConstraintKind::KeyUsage => {
                for name in KeyUsage::NAMES {
                    parse_tristate(name, value(name))?;
                }
            }
            ConstraintKind::ExtendedKeyUsage => {
                parse_tristate(
                    "exKeyUsageCritical", value("exKeyUsageCritical")
                )?;
                for oid in parse_list(value("exKeyUsageOIDs")) {
                    check_oid(&oid)?;
                }
            }
            ConstraintKind::BasicConstraints => {
                parse_tristate(
                    "basicConstraintsCritical",
                    value("basicConstraintsCritical")
                )?;
                parse_tristate(
                    "basicConstraintsIsCA", value("basicConstraintsIsCA")
                )?;
                parse_number::<i64>(
                    "basicConstraintsMinPathLen",
                    value("basicConstraintsMinPathLen"), -1
                )?;
                parse_number::<i64>(
                    "basicConstraintsMaxPathLen",
                    value("basicConstraintsMaxPathLen"), -1
                )?;
            }
            ConstraintKind::SigningAlg => {
                for alg in parse_list(value("signingAlgsAllowed")) {
                    alg.parse::<SigningAlg>()?;
                }
            }
            ConstraintKind::NoConstraint
            | ConstraintKind::UniqueSubjectName => { }
        }
        Ok(())
    }

    /// Checks a template.
    ///
    /// Returns a message describing the violation if the template does not
    /// satisfy the constraint.
    pub fn check(
        self,
        constraint: &PolicyConstraint,
        template: &CertTemplate,
        ctx: &PolicyContext,
    ) -> PkiResult<Option<String>> {
        self.check_template(constraint, template, ctx).map(Result::err)
    }

    fn check_template(
        self,
        constraint: &PolicyConstraint,
        template: &CertTemplate,
        ctx: &PolicyContext,
    ) -> PkiResult<Result<(), String>> {
        let value = |name| constraint.get_value(name);
        Ok(match self {
            ConstraintKind::NoConstraint => Ok(()),
            ConstraintKind::SubjectName => {
                check_subject_name(value("pattern"), template)
            }
            ConstraintKind::Validity => {
                check_validity(constraint, template, ctx)
            }
            ConstraintKind::Key => check_key(constraint, template),
            ConstraintKind::KeyUsage => {
                check_key_usage(constraint, template)
            }
            ConstraintKind::ExtendedKeyUsage => {
                check_ext_key_usage(constraint, template)
            }
            ConstraintKind::BasicConstraints => {
                check_basic_constraints(constraint, template)
            }
            ConstraintKind::SigningAlg => {
                check_signing_alg(value("signingAlgsAllowed"), template)
            }
            ConstraintKind::UniqueSubjectName => {
                match template.subject.as_ref() {
                    Some(subject) => {
                        if ctx.subjects.subject_in_use(
                            subject, ctx.renewal_of
                        )? {
                            Err(format!(
                                "subject name '{subject}' is already in use"
                            ))
                        }
                        else {
                            Ok(())
                        }
                    }
                    None => Err("no subject name".into()),
                }
            }
        })
    }
}

impl str::FromStr for ConstraintKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied()
            .find(|kind| kind.class_id() == s)
            .ok_or_else(|| format!("unknown policy constraint '{s}'"))
    }
}


//------------ Checks --------------------------------------------------------

/// Compiles the pattern so that it has to match the entire name.
fn subject_pattern(pattern: Option<&str>) -> Result<Regex, String> {
    let pattern = pattern.unwrap_or(".*");
    Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
        format!("invalid pattern '{pattern}': {err}")
    })
}

fn check_subject_name(
    pattern: Option<&str>, template: &CertTemplate
) -> Result<(), String> {
    let subject = template.subject.as_ref().ok_or("no subject name")?;
    let subject = subject.to_string();
    if subject_pattern(pattern)?.is_match(&subject) {
        Ok(())
    }
    else {
        Err(format!("subject name '{subject}' does not match the pattern"))
    }
}

fn check_validity(
    constraint: &PolicyConstraint,
    template: &CertTemplate,
    ctx: &PolicyContext,
) -> Result<(), String> {
    let value = |name| constraint.get_value(name);
    let (not_before, not_after) = match (
        template.not_before, template.not_after
    ) {
        (Some(not_before), Some(not_after)) => (not_before, not_after),
        _ => return Err("no validity period".into())
    };
    if not_after <= not_before {
        return Err("notAfter must be later than notBefore".into())
    }

    let range = parse_days("range", value("range"), DEFAULT_RANGE)?;
    if not_after.signed_duration_since(not_before) > range {
        return Err(format!(
            "validity period exceeds {} days", range.num_days()
        ))
    }

    if parse_bool("notBeforeCheck", value("notBeforeCheck"))? {
        let grace = parse_offset(
            "notBeforeGracePeriod", value("notBeforeGracePeriod")
        )?;
        if not_before > add_duration(ctx.now, grace)? {
            return Err("notBefore is too far in the future".into())
        }
    }

    if parse_bool("notAfterCheck", value("notAfterCheck"))?
        && not_after > ctx.ca_not_after
    {
        return Err(
            "notAfter is later than the CA certificate's notAfter".into()
        )
    }
    Ok(())
}

fn key_type(value: Option<&str>) -> Result<Option<KeyAlgorithm>, String> {
    match value.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("RSA") => {
            Ok(Some(KeyAlgorithm::Rsa))
        }
        Some(value) if value.eq_ignore_ascii_case("EC") => {
            Ok(Some(KeyAlgorithm::Ec))
        }
        Some(value) => Err(format!("invalid key type '{value}'"))
    }
}

fn check_key(
    constraint: &PolicyConstraint, template: &CertTemplate
) -> Result<(), String> {
    let key = template.public_key.as_ref().ok_or("no public key")?;
    if let Some(key_type) = key_type(constraint.get_value("keyType"))? {
        if key.key_type != key_type {
            return Err(format!("key type {} is not allowed", key.key_type))
        }
    }
    let allowed = parse_list(constraint.get_value("keyParameters"));
    if allowed.is_empty() {
        return Ok(())
    }
    let param = match key.curve.as_ref() {
        Some(curve) => curve.clone(),
        None => key.size.to_string(),
    };
    if allowed.contains(&param) {
        Ok(())
    }
    else {
        Err(format!("{} key parameter {} is not allowed", key.key_type, param))
    }
}

fn check_key_usage(
    constraint: &PolicyConstraint, template: &CertTemplate
) -> Result<(), String> {
    let usage = template.key_usage.unwrap_or_default();
    for name in KeyUsage::NAMES {
        let Some(expected) = parse_tristate(name, constraint.get_value(name))?
        else {
            continue
        };
        if usage.get(name) != Some(expected) {
            return Err(format!("{name} must be {expected}"))
        }
    }
    Ok(())
}

fn check_ext_key_usage(
    constraint: &PolicyConstraint, template: &CertTemplate
) -> Result<(), String> {
    let Some(usage) = template.ext_key_usage.as_ref() else {
        return Ok(())
    };
    if let Some(critical) = parse_tristate(
        "exKeyUsageCritical", constraint.get_value("exKeyUsageCritical")
    )? {
        if usage.critical != critical {
            return Err(format!("exKeyUsageCritical must be {critical}"))
        }
    }
    let allowed = parse_list(constraint.get_value("exKeyUsageOIDs"));
    if allowed.is_empty() {
        return Ok(())
    }
    match usage.oids.iter().find(|oid| !allowed.contains(oid)) {
        Some(oid) => Err(format!("extended key usage {oid} is not allowed")),
        None => Ok(())
    }
}

fn check_basic_constraints(
    constraint: &PolicyConstraint, template: &CertTemplate
) -> Result<(), String> {
    let value = |name| constraint.get_value(name);
    let bc = template.basic_constraints.unwrap_or_default();

    if let Some(critical) = parse_tristate(
        "basicConstraintsCritical", value("basicConstraintsCritical")
    )? {
        if bc.critical != critical {
            return Err(format!("basicConstraintsCritical must be {critical}"))
        }
    }
    if let Some(is_ca) = parse_tristate(
        "basicConstraintsIsCA", value("basicConstraintsIsCA")
    )? {
        if bc.is_ca != is_ca {
            return Err(format!("basicConstraintsIsCA must be {is_ca}"))
        }
    }
    if !bc.is_ca {
        return Ok(())
    }

    // An unlimited path length is -1 just like an unset limit.
    let path_len = bc.path_len.map(i64::from).unwrap_or(-1);
    let min = parse_number::<i64>(
        "basicConstraintsMinPathLen", value("basicConstraintsMinPathLen"), -1
    )?;
    let max = parse_number::<i64>(
        "basicConstraintsMaxPathLen", value("basicConstraintsMaxPathLen"), -1
    )?;
    if min >= 0 && path_len != -1 && path_len < min {
        return Err(format!("path length must be at least {min}"))
    }
    if max >= 0 && (path_len == -1 || path_len > max) {
        return Err(format!("path length must be at most {max}"))
    }
    Ok(())
}

fn check_signing_alg(
    allowed: Option<&str>, template: &CertTemplate
) -> Result<(), String> {
    let allowed = parse_list(allowed)
        .iter()
        .map(|alg| alg.parse::<SigningAlg>())
        .collect::<Result<Vec<_>, _>>()?;
    if allowed.is_empty() {
        return Ok(())
    }
    let alg = template.signing_alg.ok_or("no signing algorithm")?;
    if allowed.contains(&alg) {
        Ok(())
    }
    else {
        Err(format!("signing algorithm {alg} is not allowed"))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::api::request::CertEnrollmentRequest;
    use crate::server::policy::{
        BasicConstraints, DistinguishedName, ExtKeyUsage,
    };
    use crate::server::policy::tests::{
        context, ec_key_info, AllSubjects, NoSubjects,
    };

    fn check(
        kind: ConstraintKind,
        constraint: PolicyConstraint,
        template: &CertTemplate,
    ) -> Option<String> {
        let request = CertEnrollmentRequest::default();
        let key = ec_key_info();
        let ctx = context(&request, None, &key, &NoSubjects);
        kind.check_params(&constraint).unwrap();
        kind.check(&constraint, template, &ctx).unwrap()
    }

    #[test]
    fn subject_name_pattern_matches_whole_name() {
        let constraint = PolicyConstraint::new("c", "subjectNameConstraintImpl")
            .with_value("pattern", "UID=.*");
        let mut template = CertTemplate {
            subject: Some("UID=jdoe,O=EXAMPLE".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(check(ConstraintKind::SubjectName, constraint.clone(), &template), None);

        template.subject = Some("CN=foo,UID=jdoe".parse().unwrap());
        assert!(check(ConstraintKind::SubjectName, constraint, &template).is_some());
    }

    #[test]
    fn validity_checks() {
        let now = Utc::now();
        let mut template = CertTemplate {
            not_before: Some(now),
            not_after: Some(now + Duration::days(30)),
            ..Default::default()
        };
        let constraint = PolicyConstraint::new("v", "validityConstraintImpl")
            .with_value("range", "31")
            .with_value("notBeforeCheck", "true")
            .with_value("notBeforeGracePeriod", "60")
            .with_value("notAfterCheck", "true");
        assert_eq!(check(ConstraintKind::Validity, constraint.clone(), &template), None);

        template.not_after = Some(now + Duration::days(32));
        assert!(check(ConstraintKind::Validity, constraint.clone(), &template).is_some());

        template.not_before = Some(now + Duration::days(1));
        assert!(check(ConstraintKind::Validity, constraint.clone(), &template).is_some());

        let long = PolicyConstraint::new("v", "validityConstraintImpl")
            .with_value("range", "36500")
            .with_value("notAfterCheck", "true");
        template.not_before = Some(now);
        template.not_after = Some(now + Duration::days(3651));
        assert!(check(ConstraintKind::Validity, long, &template).is_some());
    }

    #[test]
    fn key_checks() {
        let template = CertTemplate {
            public_key: Some(ec_key_info()),
            ..Default::default()
        };
        let rsa_only = PolicyConstraint::new("k", "keyConstraintImpl")
            .with_value("keyType", "RSA")
            .with_value("keyParameters", "2048,4096");
        assert!(check(ConstraintKind::Key, rsa_only, &template).is_some());

        let ec = PolicyConstraint::new("k", "keyConstraintImpl")
            .with_value("keyType", "EC")
            .with_value("keyParameters", "nistp256,nistp384");
        assert_eq!(check(ConstraintKind::Key, ec, &template), None);

        let p521 = PolicyConstraint::new("k", "keyConstraintImpl")
            .with_value("keyType", "-")
            .with_value("keyParameters", "nistp521");
        assert!(check(ConstraintKind::Key, p521, &template).is_some());
    }

    #[test]
    fn extension_checks() {
        let template = CertTemplate {
            ext_key_usage: Some(ExtKeyUsage {
                critical: false,
                oids: vec!["1.3.6.1.5.5.7.3.1".into()],
            }),
            basic_constraints: Some(BasicConstraints {
                critical: true, is_ca: true, path_len: Some(2)
            }),
            ..Default::default()
        };

        let eku = PolicyConstraint::new("e", "extendedKeyUsageExtConstraintImpl")
            .with_value("exKeyUsageCritical", "-")
            .with_value("exKeyUsageOIDs", "1.3.6.1.5.5.7.3.1,1.3.6.1.5.5.7.3.2");
        assert_eq!(check(ConstraintKind::ExtendedKeyUsage, eku, &template), None);
        let eku = PolicyConstraint::new("e", "extendedKeyUsageExtConstraintImpl")
            .with_value("exKeyUsageOIDs", "1.3.6.1.5.5.7.3.2");
        assert!(check(ConstraintKind::ExtendedKeyUsage, eku, &template).is_some());

        let bc = PolicyConstraint::new("b", "basicConstraintsExtConstraintImpl")
            .with_value("basicConstraintsIsCA", "true")
            .with_value("basicConstraintsMinPathLen", "0")
            .with_value("basicConstraintsMaxPathLen", "1");
        assert!(check(ConstraintKind::BasicConstraints, bc, &template).is_some());
        let bc = PolicyConstraint::new("b", "basicConstraintsExtConstraintImpl")
            .with_value("basicConstraintsIsCA", "false");
        assert!(check(ConstraintKind::BasicConstraints, bc, &template).is_some());
    }

    #[test]
    fn signing_alg_allowed() {
        let template = CertTemplate {
            signing_alg: Some(SigningAlg::Sha256WithEc),
            ..Default::default()
        };
        let allowed = PolicyConstraint::new("s", "signingAlgConstraintImpl")
            .with_value("signingAlgsAllowed", "SHA256withEC,SHA384withEC");
        assert_eq!(check(ConstraintKind::SigningAlg, allowed, &template), None);
        let allowed = PolicyConstraint::new("s", "signingAlgConstraintImpl")
            .with_value("signingAlgsAllowed", "SHA512withEC");
        assert!(check(ConstraintKind::SigningAlg, allowed, &template).is_some());
    }

    #[test]
    fn unique_subject_name() {
        let subject: DistinguishedName = "CN=taken".parse().unwrap();
        let template = CertTemplate {
            subject: Some(subject),
            ..Default::default()
        };
        let constraint = PolicyConstraint::new(
            "u", "uniqueSubjectNameConstraintImpl"
        );
        let request = CertEnrollmentRequest::default();
        let key = ec_key_info();

        let mut ctx = context(&request, None, &key, &AllSubjects);
        assert!(
            ConstraintKind::UniqueSubjectName
                .check(&constraint, &template, &ctx).unwrap().is_some()
        );

        // Renewing the certificate that holds the name is fine.
        ctx.renewal_of = Some(crate::api::cert::CertId::new(7));
        assert_eq!(
            ConstraintKind::UniqueSubjectName
                .check(&constraint, &template, &ctx).unwrap(),
            None
        );
    }
}
