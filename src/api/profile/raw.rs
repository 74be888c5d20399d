//! The raw property format of profiles.
//!
//! Each line holds a `key=value` pair. Inputs, outputs, policy sets and the
//! policies within a set are enumerated by comma separated `list` keys and
//! described by keys prefixed with their id.

use std::fmt;
use std::fmt::Write as _;
use super::{
    PolicyConstraint, PolicyDefault, PolicySet, Profile, ProfileInput,
    ProfileOutput, ProfilePolicy,
};


//------------ Profile raw conversion ----------------------------------------

impl Profile {
    /// Parses a profile from the raw property format.
    pub fn from_raw(content: &str) -> Result<Self, RawProfileError> {
        let props = Properties::parse(content)?;

        let mut profile = Profile::new(
            props.required("profileId")?, props.required("classId")?
        );
        profile.name = props.get("name");
        profile.description = props.get("desc");
        profile.visible = props.flag("visible", true)?;
        profile.enabled = props.flag("enable", false)?;
        profile.enabled_by = props.get("enableBy");
        profile.authenticator_id = props.get("auth.instance_id");
        profile.authz_acl = props.get("authz.acl");
        profile.renewal = props.flag("renewal", false)?;
        profile.xml_output = props.flag("xmlOutput", false)?;

        for id in props.list("input.list") {
            let mut input = ProfileInput::new(
                id, props.required(&format!("input.{id}.class_id"))?
            );
            input.name = props.get(&format!("input.{id}.name"));
            profile.inputs.push(input);
        }

        for id in props.list("output.list") {
            let mut output = ProfileOutput::new(
                id, props.required(&format!("output.{id}.class_id"))?
            );
            output.name = props.get(&format!("output.{id}.name"));
            profile.outputs.push(output);
        }

        for set_id in props.list("policyset.list") {
            let mut set = PolicySet::new(set_id);
            for policy_id in props.list(&format!("policyset.{set_id}.list")) {
                let prefix = format!("policyset.{set_id}.{policy_id}");

                let mut default = PolicyDefault::new(
                    props.get(&format!("{prefix}.default.name"))
                        .unwrap_or_default(),
                    props.required(&format!("{prefix}.default.class_id"))?,
                );
                for (name, value) in props.prefixed(
                    &format!("{prefix}.default.params.")
                ) {
                    default.set_param(name, value);
                }

                let mut constraint = PolicyConstraint::new(
                    props.get(&format!("{prefix}.constraint.name"))
                        .unwrap_or_default(),
                    props.required(&format!("{prefix}.constraint.class_id"))?,
                );
                for (name, value) in props.prefixed(
                    &format!("{prefix}.constraint.params.")
                ) {
                    constraint.set_value(name, value);
                }

                set.policies.push(ProfilePolicy {
                    id: policy_id.to_string(),
                    default,
                    constraint,
                });
            }
            profile.policy_sets.policy_sets.push(set);
        }

        Ok(profile)
    }

    /// Writes the profile in the raw property format.
    ///
    /// Descriptors and attribute values are not part of the format.
    pub fn to_raw(&self) -> String {
        let mut res = String::new();
        let mut put = |key: &str, value: &str| {
            let _ = writeln!(res, "{key}={value}");
        };

        put("profileId", &self.id);
        put("classId", &self.class_id);
        if let Some(name) = &self.name {
            put("name", name);
        }
        if let Some(desc) = &self.description {
            put("desc", desc);
        }
        put("visible", bool_str(self.visible));
        put("enable", bool_str(self.enabled));
        if let Some(by) = &self.enabled_by {
            put("enableBy", by);
        }
        if let Some(auth) = &self.authenticator_id {
            put("auth.instance_id", auth);
        }
        if let Some(acl) = &self.authz_acl {
            put("authz.acl", acl);
        }
        put("renewal", bool_str(self.renewal));
        put("xmlOutput", bool_str(self.xml_output));

        put("input.list", &join(self.inputs.iter().map(|i| i.id.as_str())));
        for input in &self.inputs {
            put(&format!("input.{}.class_id", input.id), &input.class_id);
            if let Some(name) = &input.name {
                put(&format!("input.{}.name", input.id), name);
            }
        }

        put("output.list", &join(self.outputs.iter().map(|o| o.id.as_str())));
        for output in &self.outputs {
            put(&format!("output.{}.class_id", output.id), &output.class_id);
            if let Some(name) = &output.name {
                put(&format!("output.{}.name", output.id), name);
            }
        }

        put(
            "policyset.list",
            &join(self.policy_sets().iter().map(|s| s.id.as_str()))
        );
        for set in self.policy_sets() {
            put(
                &format!("policyset.{}.list", set.id),
                &join(set.policies.iter().map(|p| p.id.as_str()))
            );
            for policy in &set.policies {
                let prefix = format!("policyset.{}.{}", set.id, policy.id);
                put(
                    &format!("{prefix}.constraint.class_id"),
                    &policy.constraint.class_id
                );
                put(
                    &format!("{prefix}.constraint.name"),
                    &policy.constraint.name
                );
                for value in &policy.constraint.values {
                    if let Some(v) = &value.value {
                        put(
                            &format!(
                                "{prefix}.constraint.params.{}", value.name
                            ),
                            v
                        );
                    }
                }
                put(
                    &format!("{prefix}.default.class_id"),
                    &policy.default.class_id
                );
                put(&format!("{prefix}.default.name"), &policy.default.name);
                for param in &policy.default.params {
                    put(
                        &format!("{prefix}.default.params.{}", param.name),
                        &param.value
                    );
                }
            }
        }

        res
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}


//------------ Properties ----------------------------------------------------

/// The key-value pairs of a raw profile in file order.
struct Properties<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Properties<'a> {
    fn parse(content: &'a str) -> Result<Self, RawProfileError> {
        let mut entries: Vec<(&str, &str)> = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                RawProfileError::Syntax { line: idx + 1, content: line.into() }
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(RawProfileError::Syntax {
                    line: idx + 1, content: line.into()
                })
            }
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(RawProfileError::Duplicate(key.into()))
            }
            entries.push((key, value));
        }
        Ok(Properties { entries })
    }

    fn value(&self, key: &str) -> Option<&'a str> {
        self.entries.iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, value)| *value)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.value(key).map(ToString::to_string)
    }

    fn required(&self, key: &str) -> Result<String, RawProfileError> {
        self.get(key).ok_or_else(|| RawProfileError::Missing(key.into()))
    }

    fn flag(&self, key: &str, dflt: bool) -> Result<bool, RawProfileError> {
        match self.value(key).map(str::trim) {
            None | Some("") => Ok(dflt),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(RawProfileError::InvalidFlag {
                key: key.into(), value: other.into()
            })
        }
    }

    fn list(&self, key: &str) -> Vec<&'a str> {
        self.value(key).map(|value| {
            value.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect()
        }).unwrap_or_default()
    }

    fn prefixed<'s>(
        &'s self, prefix: &'s str
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 's {
        self.entries.iter().filter_map(move |&(key, value)| {
            key.strip_prefix(prefix).map(|name| (name, value))
        })
    }
}


//------------ RawProfileError -----------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawProfileError {
    Syntax { line: usize, content: String },
    Duplicate(String),
    Missing(String),
    InvalidFlag { key: String, value: String },
}

impl fmt::Display for RawProfileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawProfileError::Syntax { line, content } => {
                write!(f, "line {line}: expected 'key=value', found '{content}'")
            }
            RawProfileError::Duplicate(key) => {
                write!(f, "duplicate property '{key}'")
            }
            RawProfileError::Missing(key) => {
                write!(f, "missing property '{key}'")
            }
            RawProfileError::InvalidFlag { key, value } => {
                write!(
                    f, "property '{key}' must be 'true' or 'false', found '{value}'"
                )
            }
        }
    }
}

impl std::error::Error for RawProfileError {}


//============ Tests =========================================================
