//! Policy defaults.

use std::str;
use chrono::{NaiveDateTime, TimeZone, Utc};
use crate::api::profile::{Descriptor, PolicyDefault, ProfileAttribute};
use super::{
    add_duration, check_oid, parse_bool, parse_days, parse_list,
    parse_number, parse_offset, BasicConstraints,
    CertTemplate, ExtKeyUsage, GeneralName, KeyUsage,
    PolicyContext, SigningAlg, SubjectAltNames,
};


/// The time format of validity attributes.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The default validity in days.
const DEFAULT_RANGE: i64 = 180;


//------------ DefaultKind ---------------------------------------------------

/// The known policy defaults.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DefaultKind {
    UserSubjectName,
    SubjectName,
    UserKey,
    Validity,
    KeyUsage,
    ExtendedKeyUsage,
    BasicConstraints,
    SubjectAltName,
    SigningAlg,
    SubjectKeyIdentifier,
    AuthorityKeyIdentifier,
    NoDefault,
}

impl DefaultKind {
    pub fn class_id(self) -> &'static str {
        match self {
            DefaultKind::UserSubjectName => "userSubjectNameDefaultImpl",
            DefaultKind::SubjectName => "subjectNameDefaultImpl",
            DefaultKind::UserKey => "userKeyDefaultImpl",
            DefaultKind::Validity => "validityDefaultImpl",
            DefaultKind::KeyUsage => "keyUsageExtDefaultImpl",
            DefaultKind::ExtendedKeyUsage => "extendedKeyUsageExtDefaultImpl",
            DefaultKind::BasicConstraints => "basicConstraintsExtDefaultImpl",
            DefaultKind::SubjectAltName => "subjectAltNameExtDefaultImpl",
            DefaultKind::SigningAlg => "signingAlgDefaultImpl",
            DefaultKind::SubjectKeyIdentifier => {
                "subjectKeyIdentifierExtDefaultImpl"
            }
            DefaultKind::AuthorityKeyIdentifier => {
                "authorityKeyIdentifierExtDefaultImpl"
            }
            DefaultKind::NoDefault => "noDefaultImpl",
        }
    }

    const ALL: [DefaultKind; 12] = [
        DefaultKind::UserSubjectName,
        DefaultKind::SubjectName,
        DefaultKind::UserKey,
        DefaultKind::Validity,
        DefaultKind::KeyUsage,
        DefaultKind::ExtendedKeyUsage,
        DefaultKind::BasicConstraints,
        DefaultKind::SubjectAltName,
        DefaultKind::SigningAlg,
        DefaultKind::SubjectKeyIdentifier,
        DefaultKind::AuthorityKeyIdentifier,
        DefaultKind::NoDefault,
    ];

    /// Checks the parameters of a default in a profile.
    pub fn check_params(self, default: &PolicyDefault) -> Result<(), String> {
        let param = |name| default.get_param(name);
        match self {
            DefaultKind::SubjectName => {
                if param("name").is_none_or(|name| name.trim().is_empty()) {
                    return Err("missing parameter 'name'".into())
                }
            }
            DefaultKind::Validity => {
                parse_days("range", param("range"), DEFAULT_RANGE)?;
                parse_offset("startTime", param("startTime"))?;
            }
            DefaultKind::KeyUsage => {
                for name in KeyUsage::NAMES {
                    parse_bool(name, param(name))?;
                }
            }
            DefaultKind::ExtendedKeyUsage => {
                parse_bool("exKeyUsageCritical", param("exKeyUsageCritical"))?;
                for oid in parse_list(param("exKeyUsageOIDs")) {
                    check_oid(&oid)?;
                }
            }
            DefaultKind::BasicConstraints => {
                basic_constraints(default)?;
            }
            DefaultKind::SubjectAltName => {
                parse_bool(
                    "subjAltNameExtCritical", param("subjAltNameExtCritical")
                )?;
                for (name_type, _) in alt_name_patterns(default)? {
                    GeneralName::from_type(&name_type, "127.0.0.1")?;
                }
            }
            DefaultKind::SigningAlg => {
                signing_alg(param("signingAlg"))?;
            }
            DefaultKind::UserSubjectName
            | DefaultKind::UserKey
            | DefaultKind::SubjectKeyIdentifier
            | DefaultKind::AuthorityKeyIdentifier
            | DefaultKind::NoDefault => { }
        }
        Ok(())
    }

    /// Populates the template.
    pub fn apply(
        self,
        default: &PolicyDefault,
        ctx: &PolicyContext,
        template: &mut CertTemplate,
    ) -> Result<(), String> {
        let param = |name| default.get_param(name);
        match self {
            DefaultKind::UserSubjectName => {
                let subject = ctx.subject
                    .filter(|subject| !subject.is_empty())
                    .cloned()
                    .or_else(|| ctx.input_subject())
                    .ok_or("request does not contain a subject name")?;
                template.subject = Some(subject);
            }
            DefaultKind::SubjectName => {
                let name = ctx.substitute(
                    param("name").unwrap_or_default(), None
                );
                template.subject = Some(name.parse()?);
            }
            DefaultKind::UserKey => {
                template.public_key = Some(ctx.public_key.clone());
            }
            DefaultKind::Validity => {
                let range = parse_days("range", param("range"), DEFAULT_RANGE)?;
                let start = parse_offset("startTime", param("startTime"))?;
                let not_before = add_duration(ctx.now, start)?;
                template.not_before = Some(not_before);
                template.not_after = Some(add_duration(not_before, range)?);
            }
            DefaultKind::KeyUsage => {
                let mut usage = KeyUsage::default();
                for name in KeyUsage::NAMES {
                    usage.set(name, parse_bool(name, param(name))?);
                }
                template.key_usage = Some(usage);
            }
            DefaultKind::ExtendedKeyUsage => {
                template.ext_key_usage = Some(ExtKeyUsage {
                    critical: parse_bool(
                        "exKeyUsageCritical", param("exKeyUsageCritical")
                    )?,
                    oids: parse_list(param("exKeyUsageOIDs")),
                });
            }
            DefaultKind::BasicConstraints => {
                template.basic_constraints = Some(basic_constraints(default)?);
            }
            DefaultKind::SubjectAltName => {
                let mut names = Vec::new();
                for (name_type, pattern) in alt_name_patterns(default)? {
                    let value = ctx.substitute(
                        &pattern, template.subject.as_ref()
                    );
                    if !value.trim().is_empty() {
                        names.push(
                            GeneralName::from_type(&name_type, value.trim())?
                        );
                    }
                }
                template.subject_alt_names = if names.is_empty() {
                    None
                }
                else {
                    Some(SubjectAltNames {
                        critical: parse_bool(
                            "subjAltNameExtCritical",
                            param("subjAltNameExtCritical")
                        )?,
                        names,
                    })
                };
            }
            DefaultKind::SigningAlg => {
                template.signing_alg = signing_alg(param("signingAlg"))?;
            }
            DefaultKind::SubjectKeyIdentifier => {
                template.subject_key_id = true;
            }
            DefaultKind::AuthorityKeyIdentifier => {
                template.authority_key_id = true;
            }
            DefaultKind::NoDefault => { }
        }
        Ok(())
    }

    /// Returns the values this default put into the template.
    pub fn attributes(self, template: &CertTemplate) -> Vec<ProfileAttribute> {
        match self {
            DefaultKind::UserSubjectName | DefaultKind::SubjectName => {
                vec![attribute(
                    "name", "string", "Subject Name",
                    template.subject.as_ref().map(ToString::to_string)
                )]
            }
            DefaultKind::UserKey => {
                let key = template.public_key.as_ref();
                vec![
                    attribute(
                        "TYPE", "string", "Key Type",
                        key.map(|key| key.key_type.to_string())
                    ),
                    attribute(
                        "LEN", "string", "Key Length",
                        key.map(|key| match key.curve.as_ref() {
                            Some(curve) => curve.clone(),
                            None => key.size.to_string(),
                        })
                    ),
                ]
            }
            DefaultKind::Validity => {
                vec![
                    attribute(
                        "notBefore", "string", "Not Before",
                        template.not_before.map(|time| {
                            time.format(TIME_FORMAT).to_string()
                        })
                    ),
                    attribute(
                        "notAfter", "string", "Not After",
                        template.not_after.map(|time| {
                            time.format(TIME_FORMAT).to_string()
                        })
                    ),
                ]
            }
            DefaultKind::KeyUsage => {
                KeyUsage::NAMES.iter().map(|name| {
                    attribute(
                        name, "boolean", name,
                        template.key_usage.and_then(|usage| {
                            usage.get(name).map(|flag| flag.to_string())
                        })
                    )
                }).collect()
            }
            DefaultKind::ExtendedKeyUsage => {
                let usage = template.ext_key_usage.as_ref();
                vec![
                    attribute(
                        "exKeyUsageCritical", "boolean", "Criticality",
                        usage.map(|usage| usage.critical.to_string())
                    ),
                    attribute(
                        "exKeyUsageOIDs", "string_list", "Comma-Separated OIDs",
                        usage.map(|usage| usage.oids.join(","))
                    ),
                ]
            }
            DefaultKind::BasicConstraints => {
                let constraints = template.basic_constraints;
                vec![
                    attribute(
                        "basicConstraintsCritical", "boolean", "Criticality",
                        constraints.map(|bc| bc.critical.to_string())
                    ),
                    attribute(
                        "basicConstraintsIsCA", "boolean", "Is CA",
                        constraints.map(|bc| bc.is_ca.to_string())
                    ),
                    attribute(
                        "basicConstraintsPathLen", "integer", "Path Length",
                        constraints.map(|bc| match bc.path_len {
                            Some(len) => len.to_string(),
                            None => "-1".to_string(),
                        })
                    ),
                ]
            }
            DefaultKind::SubjectAltName => {
                let names = template.subject_alt_names.as_ref();
                vec![
                    attribute(
                        "subjAltNameExtCritical", "boolean", "Criticality",
                        Some(names.is_some_and(|names| names.critical).to_string())
                    ),
                    attribute(
                        "subjAltNames", "string_list", "General Names",
                        Some(names.map(|names| {
                            names.names.iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(",")
                        }).unwrap_or_default())
                    ),
                ]
            }
            DefaultKind::SigningAlg => {
                vec![attribute(
                    "signingAlg", "choice", "Signing Algorithm",
                    Some(match template.signing_alg {
                        Some(alg) => alg.to_string(),
                        None => "-".to_string(),
                    })
                )]
            }
            DefaultKind::SubjectKeyIdentifier
            | DefaultKind::AuthorityKeyIdentifier
            | DefaultKind::NoDefault => Vec::new(),
        }
    }

    /// Applies an agent edited value to the template.
    pub fn set_attribute(
        self, template: &mut CertTemplate, name: &str, value: &str
    ) -> Result<(), String> {
        let value = value.trim();
        match (self, name) {
            (DefaultKind::UserSubjectName, "name")
            | (DefaultKind::SubjectName, "name") => {
                template.subject = Some(value.parse()?);
            }
            (DefaultKind::Validity, "notBefore") => {
                template.not_before = Some(parse_time(value)?);
            }
            (DefaultKind::Validity, "notAfter") => {
                template.not_after = Some(parse_time(value)?);
            }
            (DefaultKind::KeyUsage, _) => {
                let flag = parse_bool(name, Some(value))?;
                let mut usage = template.key_usage.unwrap_or_default();
                if !usage.set(name, flag) {
                    return Err("unknown attribute".into())
                }
                template.key_usage = Some(usage);
            }
            (DefaultKind::ExtendedKeyUsage, "exKeyUsageCritical") => {
                template.ext_key_usage.get_or_insert_with(Default::default)
                    .critical = parse_bool(name, Some(value))?;
            }
            (DefaultKind::ExtendedKeyUsage, "exKeyUsageOIDs") => {
                let oids = parse_list(Some(value));
                for oid in &oids {
                    check_oid(oid)?;
                }
                template.ext_key_usage.get_or_insert_with(Default::default)
                    .oids = oids;
            }
            (DefaultKind::BasicConstraints, "basicConstraintsCritical") => {
                template.basic_constraints.get_or_insert_with(Default::default)
                    .critical = parse_bool(name, Some(value))?;
            }
            (DefaultKind::BasicConstraints, "basicConstraintsIsCA") => {
                template.basic_constraints.get_or_insert_with(Default::default)
                    .is_ca = parse_bool(name, Some(value))?;
            }
            (DefaultKind::BasicConstraints, "basicConstraintsPathLen") => {
                template.basic_constraints.get_or_insert_with(Default::default)
                    .path_len = path_len(Some(value))?;
            }
            (DefaultKind::SubjectAltName, "subjAltNameExtCritical") => {
                let critical = parse_bool(name, Some(value))?;
                if let Some(names) = template.subject_alt_names.as_mut() {
                    names.critical = critical
                }
            }
            (DefaultKind::SubjectAltName, "subjAltNames") => {
                let names = parse_list(Some(value)).iter()
                    .map(|name| name.parse())
                    .collect::<Result<Vec<GeneralName>, _>>()?;
                if names.is_empty() {
                    template.subject_alt_names = None
                }
                else {
                    template.subject_alt_names
                        .get_or_insert_with(Default::default)
                        .names = names;
                }
            }
            (DefaultKind::SigningAlg, "signingAlg") => {
                template.signing_alg = signing_alg(Some(value))?;
            }
            (DefaultKind::UserKey, "TYPE" | "LEN") => {
                return Err("attribute cannot be changed".into())
            }
            _ => return Err("unknown attribute".into())
        }
        Ok(())
    }
}

impl str::FromStr for DefaultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied()
            .find(|kind| kind.class_id() == s)
            .ok_or_else(|| format!("unknown policy default '{s}'"))
    }
}


//------------ Helpers -------------------------------------------------------

fn attribute(
    name: &str, syntax: &str, description: &str, value: Option<String>
) -> ProfileAttribute {
    let attr = ProfileAttribute::new(name).with_descriptor(
        Descriptor::new(syntax, description)
    );
    match value {
        Some(value) => attr.with_value(value),
        None => attr,
    }
}

fn parse_time(value: &str) -> Result<chrono::DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map(|time| Utc.from_utc_datetime(&time))
        .map_err(|_| format!("invalid time '{value}'"))
}

/// Parses a path length where -1 means unlimited.
fn path_len(value: Option<&str>) -> Result<Option<u32>, String> {
    let len: i64 = parse_number("basicConstraintsPathLen", value, -1)?;
    match len {
        -1 => Ok(None),
        len if len >= 0 => u32::try_from(len).map(Some).map_err(|_| {
            format!("path length {len} too large")
        }),
        len => Err(format!("invalid path length {len}"))
    }
}

fn basic_constraints(
    default: &PolicyDefault
) -> Result<BasicConstraints, String> {
    let is_ca = parse_bool(
        "basicConstraintsIsCA", default.get_param("basicConstraintsIsCA")
    )?;
    Ok(BasicConstraints {
        critical: parse_bool(
            "basicConstraintsCritical",
            default.get_param("basicConstraintsCritical")
        )?,
        is_ca,
        path_len: if is_ca {
            path_len(default.get_param("basicConstraintsPathLen"))?
        }
        else {
            None
        },
    })
}

fn signing_alg(value: Option<&str>) -> Result<Option<SigningAlg>, String> {
    match value.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        Some(value) => value.parse().map(Some),
    }
}

/// Returns the configured general name types and patterns.
fn alt_name_patterns(
    default: &PolicyDefault
) -> Result<Vec<(String, String)>, String> {
    let count: usize = parse_number(
        "subjAltNameNumGNs", default.get_param("subjAltNameNumGNs"), 0
    )?;
    let mut res = Vec::with_capacity(count);
    for i in 0..count {
        let name_type = default.get_param(&format!("subjAltExtType_{i}"))
            .ok_or_else(|| format!("missing parameter 'subjAltExtType_{i}'"))?;
        let pattern = default.get_param(&format!("subjAltExtPattern_{i}"))
            .unwrap_or_default();
        res.push((name_type.trim().to_string(), pattern.to_string()));
    }
    Ok(res)
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::CertEnrollmentRequest;
    use crate::server::policy::{DistinguishedName, SUBJECT_NAME_INPUT};
    use crate::server::policy::tests::{context, ec_key_info, NoSubjects};

    #[test]
    fn subject_name_from_inputs() {
        let mut request = CertEnrollmentRequest::default();
        request.set_attribute_value(SUBJECT_NAME_INPUT, "sn_uid", "jdoe");
        request.set_attribute_value(SUBJECT_NAME_INPUT, "sn_o", "EXAMPLE");
        let empty = DistinguishedName::default();
        let key = ec_key_info();
        let ctx = context(&request, Some(&empty), &key, &NoSubjects);

        let mut template = CertTemplate::default();
        DefaultKind::UserSubjectName.apply(
            &PolicyDefault::new("n", "userSubjectNameDefaultImpl"),
            &ctx, &mut template
        ).unwrap();
        assert_eq!(template.subject.unwrap().to_string(), "UID=jdoe,O=EXAMPLE");

        let no_inputs = CertEnrollmentRequest::default();
        let ctx = context(&no_inputs, None, &key, &NoSubjects);
        assert!(DefaultKind::UserSubjectName.apply(
            &PolicyDefault::new("n", "userSubjectNameDefaultImpl"),
            &ctx, &mut CertTemplate::default()
        ).is_err());
    }

    #[test]
    fn subject_alt_names_from_patterns() {
        let request = CertEnrollmentRequest::default();
        let subject: DistinguishedName = "CN=www.example.com".parse().unwrap();
        let key = ec_key_info();
        let ctx = context(&request, Some(&subject), &key, &NoSubjects);

        let default = PolicyDefault::new("san", "subjectAltNameExtDefaultImpl")
            .with_param("subjAltNameExtCritical", "false")
            .with_param("subjAltNameNumGNs", "2")
            .with_param("subjAltExtType_0", "DNSName")
            .with_param("subjAltExtPattern_0", "$request.cn$")
            .with_param("subjAltExtType_1", "RFC822Name")
            .with_param("subjAltExtPattern_1", "$request.requestor_email$");
        DefaultKind::SubjectAltName.check_params(&default).unwrap();

        let mut template = CertTemplate {
            subject: Some(subject.clone()),
            ..Default::default()
        };
        DefaultKind::SubjectAltName.apply(&default, &ctx, &mut template)
            .unwrap();
        let names = template.subject_alt_names.as_ref().unwrap();
        assert_eq!(
            names.names, vec![GeneralName::Dns("www.example.com".into())]
        );

        let attrs = DefaultKind::SubjectAltName.attributes(&template);
        assert_eq!(
            attrs[1].value.as_deref(), Some("DNSName:www.example.com")
        );

        DefaultKind::SubjectAltName.set_attribute(
            &mut template, "subjAltNames",
            "DNSName:a.example.com,IPAddress:192.0.2.1"
        ).unwrap();
        assert_eq!(template.subject_alt_names.unwrap().names.len(), 2);
    }

    #[test]
    fn basic_constraints_path_len() {
        let default = PolicyDefault::new("bc", "basicConstraintsExtDefaultImpl")
            .with_param("basicConstraintsCritical", "true")
            .with_param("basicConstraintsIsCA", "true")
            .with_param("basicConstraintsPathLen", "-1");
        assert_eq!(
            basic_constraints(&default).unwrap(),
            BasicConstraints { critical: true, is_ca: true, path_len: None }
        );
        let default = default.with_param("basicConstraintsPathLen", "-2");
        assert!(DefaultKind::BasicConstraints.check_params(&default).is_err());
    }

    #[test]
    fn validity_edits() {
        let mut template = CertTemplate::default();
        DefaultKind::Validity.set_attribute(
            &mut template, "notBefore", "2030-01-01 00:00:00"
        ).unwrap();
        assert!(DefaultKind::Validity.set_attribute(
            &mut template, "notAfter", "tomorrow"
        ).is_err());
        assert!(DefaultKind::Validity.set_attribute(
            &mut template, "range", "10"
        ).is_err());
        assert_eq!(
            DefaultKind::Validity.attributes(&template)[0].value.as_deref(),
            Some("2030-01-01 00:00:00")
        );
    }

    #[test]
    fn class_ids() {
        for kind in DefaultKind::ALL {
            assert_eq!(kind.class_id().parse::<DefaultKind>(), Ok(kind));
        }
        assert!("fooDefaultImpl".parse::<DefaultKind>().is_err());
    }
}
