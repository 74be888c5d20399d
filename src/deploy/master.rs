//! The master dictionary of a deployment.
//!
//! All values describing a new instance are collected into one flat
//! dictionary. Templates are rendered from it and the instance layout is
//! derived from it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use log::LevelFilter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use super::DeployError;
use super::ini::{self, Ini, Options};


/// The built-in defaults, overridden by the deployment file.
const BUILT_IN_DEFAULTS: &[(&str, &str)] = &[
    ("pki_instance_name", "pki-tomcat"),
    ("pki_instance_root", "%(pki_root_prefix)s/var/lib/pki"),
    ("pki_configuration_root", "%(pki_root_prefix)s/etc/pki"),
    ("pki_log_root", "%(pki_root_prefix)s/var/log/pki"),
    ("pki_registry_root", "%(pki_root_prefix)s/etc/sysconfig/pki"),
    ("pki_web_server", "tomcat"),
    ("pki_hostname", "localhost"),
    ("pki_dns_domainname", "example.com"),
    ("pki_bind_address", "0.0.0.0"),
    ("pki_http_port", "8080"),
    ("pki_https_port", "8443"),
    ("pki_ajp_port", "8009"),
    ("pki_tomcat_server_port", "8005"),
    ("pki_log_level", "info"),
    ("pki_admin_uid", "caadmin"),
    ("pki_admin_name", "%(pki_admin_uid)s"),
    ("pki_admin_email", "%(pki_admin_name)s@%(pki_dns_domainname)s"),
    ("pki_security_domain_name", "%(pki_dns_domainname)s Security Domain"),
    (
        "pki_ca_signing_subject_dn",
        "cn=CA Signing Certificate,o=%(pki_security_domain_name)s"
    ),
    ("pki_ca_signing_key_type", "rsa"),
    ("pki_ca_signing_key_size", "2048"),
    ("pki_ca_signing_validity_days", "7305"),
    ("pki_random_serial_numbers_enable", "False"),
];

/// Keys that must have a non-empty value.
const REQUIRED: &[&str] = &[
    "pki_instance_name",
    "pki_hostname",
    "pki_admin_uid",
    "pki_admin_password",
    "pki_ca_signing_subject_dn",
];

/// Keys holding port numbers. All ports of an instance must differ.
const PORTS: &[&str] = &[
    "pki_http_port",
    "pki_https_port",
    "pki_ajp_port",
    "pki_tomcat_server_port",
];

/// Keys holding booleans. They are normalized to `true` or `false`.
const BOOLEANS: &[&str] = &["pki_random_serial_numbers_enable"];

lazy_static::lazy_static! {
    static ref INSTANCE_NAME: Regex = Regex::new(
        "^[A-Za-z0-9][A-Za-z0-9._-]*$"
    ).expect("valid regex");
}


//------------ Subsystem -----------------------------------------------------

/// The subsystems a deployment file can describe.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Subsystem {
    #[serde(rename = "CA")]
    Ca,
    #[serde(rename = "KRA")]
    Kra,
    #[serde(rename = "OCSP")]
    Ocsp,
    #[serde(rename = "TKS")]
    Tks,
    #[serde(rename = "TPS")]
    Tps,
}

impl Subsystem {
    /// Returns the name of the section configuring the subsystem.
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Ca => "CA",
            Subsystem::Kra => "KRA",
            Subsystem::Ocsp => "OCSP",
            Subsystem::Tks => "TKS",
            Subsystem::Tps => "TPS",
        }
    }

    pub fn is_supported(self) -> bool {
        self == Subsystem::Ca
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CA" => Ok(Subsystem::Ca),
            "KRA" => Ok(Subsystem::Kra),
            "OCSP" => Ok(Subsystem::Ocsp),
            "TKS" => Ok(Subsystem::Tks),
            "TPS" => Ok(Subsystem::Tps),
            _ => Err(format!("unknown subsystem '{s}'")),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ MasterDict ----------------------------------------------------

/// The flattened values of a deployment.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MasterDict(BTreeMap<String, String>);

impl MasterDict {
    /// Builds the dictionary for a subsystem.
    ///
    /// Values are layered, later ones winning: the built-in defaults, the
    /// file's `[DEFAULT]` and `[Common]` sections, the web server section,
    /// the subsystem section and finally `overrides`. The result only
    /// depends on the arguments.
    pub fn build(
        ini: &Ini,
        subsystem: Subsystem,
        root_prefix: &Path,
        overrides: &Options,
        now: DateTime<Utc>,
    ) -> Result<Self, DeployError> {
        if !subsystem.is_supported() {
            return Err(DeployError::UnsupportedSubsystem(subsystem))
        }
        let section = subsystem.as_str();
        if !ini.has_section(section) {
            return Err(DeployError::Ini(ini::IniError::NoSection(
                section.into()
            )))
        }

        let mut raw = Options::new();
        raw.insert(
            "pki_root_prefix".into(),
            root_prefix.to_string_lossy().trim_end_matches('/').to_string()
        );
        for (key, value) in BUILT_IN_DEFAULTS {
            raw.insert(key.to_string(), value.to_string());
        }
        raw.extend(ini.defaults().clone());
        if let Some(common) = ini.section("Common") {
            raw.extend(common.clone());
        }

        let overrides: Options = overrides.iter().map(|(k, v)| {
            (k.to_ascii_lowercase(), v.clone())
        }).collect();

        // The web server may be chosen by any later layer.
        let mut outer = raw.clone();
        if let Some(own) = ini.section(section) {
            outer.extend(own.clone());
        }
        outer.extend(overrides.clone());
        let web_server = match outer.get("pki_web_server") {
            Some(server) => ini::interpolate("pki_web_server", server, &outer)?,
            None => "tomcat".into(),
        };
        let web_section = match web_server.to_ascii_lowercase().as_str() {
            "tomcat" => "Tomcat",
            "apache" => "Apache",
            _ => {
                return Err(DeployError::invalid(
                    "pki_web_server",
                    format!("unknown web server '{web_server}'")
                ))
            }
        };
        if let Some(web) = ini.section(web_section) {
            raw.extend(web.clone());
        }
        if let Some(own) = ini.section(section) {
            raw.extend(own.clone());
        }
        raw.extend(overrides);

        let mut dict = MasterDict(
            raw.iter().map(|(key, value)| {
                ini::interpolate(key, value, &raw)
                    .map(|value| (key.clone(), value))
            }).collect::<Result<_, _>>()?
        );
        dict.validate()?;
        dict.derive(subsystem, now);
        Ok(dict)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value of a key that must be present.
    pub fn require(&self, key: &str) -> Result<&str, DeployError> {
        self.get(key).filter(|value| !value.is_empty()).ok_or_else(|| {
            DeployError::invalid(key, "missing required value")
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the slots for rendering templates.
    ///
    /// Slot names are the upper-cased keys.
    pub fn slots(&self) -> BTreeMap<String, String> {
        self.0.iter().map(|(key, value)| {
            (key.to_ascii_uppercase(), value.clone())
        }).collect()
    }

    fn validate(&mut self) -> Result<(), DeployError> {
        for key in REQUIRED {
            self.require(key)?;
        }

        let name = self.require("pki_instance_name")?;
        if !INSTANCE_NAME.is_match(name) {
            return Err(DeployError::invalid(
                "pki_instance_name", format!("invalid instance name '{name}'")
            ))
        }

        let mut ports = BTreeSet::new();
        for key in PORTS {
            let value = self.require(key)?;
            let port = value.parse::<u16>().ok().filter(|port| *port > 0)
                .ok_or_else(|| {
                    DeployError::invalid(key, format!("invalid port '{value}'"))
                })?;
            if !ports.insert(port) {
                return Err(DeployError::invalid(
                    key, format!("port {port} is used more than once")
                ))
            }
        }

        let level = self.require("pki_log_level")?;
        if LevelFilter::from_str(level).is_err() {
            return Err(DeployError::invalid(
                "pki_log_level", format!("unknown log level '{level}'")
            ))
        }

        let key_type = self.require("pki_ca_signing_key_type")?;
        if !matches!(key_type.to_ascii_lowercase().as_str(), "rsa" | "ec") {
            return Err(DeployError::invalid(
                "pki_ca_signing_key_type",
                format!("unknown key type '{key_type}'")
            ))
        }
        for key in ["pki_ca_signing_key_size", "pki_ca_signing_validity_days"] {
            let value = self.require(key)?;
            if value.parse::<u32>().is_err() {
                return Err(DeployError::invalid(
                    key, format!("expected a number, got '{value}'")
                ))
            }
        }

        for key in BOOLEANS {
            let value = self.require(key)?;
            let flag = parse_bool(value).ok_or_else(|| {
                DeployError::invalid(key, format!("not a boolean: '{value}'"))
            })?;
            self.0.insert(key.to_string(), flag.to_string());
        }
        Ok(())
    }

    /// Adds the keys derived from the configured values.
    fn derive(&mut self, subsystem: Subsystem, now: DateTime<Utc>) {
        let value = |dict: &Self, key: &str| {
            dict.get(key).unwrap_or_default().to_string()
        };
        let name = value(self, "pki_instance_name");
        let subsystem_type = subsystem.as_str().to_ascii_lowercase();
        let instance_path = format!(
            "{}/{name}", value(self, "pki_instance_root")
        );
        let subsystem_path = format!("{instance_path}/{subsystem_type}");
        let conf_path = format!(
            "{}/{name}", value(self, "pki_configuration_root")
        );
        let database_path = format!("{subsystem_path}/data");

        let derived = [
            ("pki_subsystem", subsystem.as_str().to_string()),
            ("pki_subsystem_type", subsystem_type),
            ("pki_logs_path", format!("{}/{name}", value(self, "pki_log_root"))),
            ("pki_server_config_file", format!("{conf_path}/pkid.conf")),
            (
                "pki_registry_file",
                format!("{}/{name}.json", value(self, "pki_registry_root"))
            ),
            (
                "pki_uri",
                format!(
                    "https://{}:{}/",
                    value(self, "pki_hostname"),
                    value(self, "pki_https_port")
                )
            ),
            ("pki_storage_uri", format!("local://{database_path}/")),
            ("pki_instance_path", instance_path),
            ("pki_subsystem_path", subsystem_path),
            ("pki_conf_path", conf_path),
            ("pki_database_path", database_path),
            (
                "pki_install_time",
                now.format("%a %b %e %H:%M:%S %Y").to_string()
            ),
            ("pki_timestamp", now.format("%Y%m%d%H%M%S").to_string()),
        ];
        for (key, value) in derived {
            self.0.insert(key.to_string(), value);
        }
    }
}

/// Parses a boolean such as `yes`, `off` or `1`.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DEPLOYMENT: &str = "\
[DEFAULT]
pki_admin_password = Secret.123
pki_instance_name = pki-test

[Tomcat]
pki_https_port = 18443
pki_http_port = 18080

[Apache]
pki_https_port = 443

[CA]
pki_admin_uid = ca-%(pki_instance_name)s
pki_random_serial_numbers_enable = Yes
";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
    }

    fn build(
        content: &str, overrides: &[(&str, &str)]
    ) -> Result<MasterDict, DeployError> {
        let overrides = overrides.iter().map(|(k, v)| {
            (k.to_string(), v.to_string())
        }).collect();
        MasterDict::build(
            &Ini::parse(content).unwrap(), Subsystem::Ca,
            Path::new("/tmp/root/"), &overrides, now()
        )
    }

    #[test]
    fn build_layers_and_derived_keys() {
        let dict = build(DEPLOYMENT, &[]).unwrap();
        assert_eq!(dict.get("pki_https_port"), Some("18443"));
        assert_eq!(dict.get("pki_admin_uid"), Some("ca-pki-test"));
        assert_eq!(dict.get("pki_admin_email"), Some("ca-pki-test@example.com"));
        assert_eq!(dict.get("pki_random_serial_numbers_enable"), Some("true"));
        assert_eq!(dict.get("pki_subsystem"), Some("CA"));
        assert_eq!(dict.get("pki_subsystem_type"), Some("ca"));
        assert_eq!(
            dict.get("pki_instance_path"), Some("/tmp/root/var/lib/pki/pki-test")
        );
        assert_eq!(
            dict.get("pki_subsystem_path"),
            Some("/tmp/root/var/lib/pki/pki-test/ca")
        );
        assert_eq!(
            dict.get("pki_server_config_file"),
            Some("/tmp/root/etc/pki/pki-test/pkid.conf")
        );
        assert_eq!(
            dict.get("pki_registry_file"),
            Some("/tmp/root/etc/sysconfig/pki/pki-test.json")
        );
        assert_eq!(
            dict.get("pki_storage_uri"),
            Some("local:///tmp/root/var/lib/pki/pki-test/ca/data/")
        );
        assert_eq!(dict.get("pki_uri"), Some("https://localhost:18443/"));
        assert_eq!(dict.get("pki_timestamp"), Some("20260301123005"));
        assert_eq!(dict.get("pki_install_time"), Some("Sun Mar  1 12:30:05 2026"));
        assert_eq!(
            dict.slots().get("PKI_INSTANCE_NAME").map(String::as_str),
            Some("pki-test")
        );
    }

    #[test]
    fn build_is_deterministic() {
        assert_eq!(build(DEPLOYMENT, &[]).unwrap(), build(DEPLOYMENT, &[]).unwrap());
    }

    #[test]
    fn build_time_only_changes_timestamps() {
        let ini = Ini::parse(DEPLOYMENT).unwrap();
        let build_at = |now| MasterDict::build(
            &ini, Subsystem::Ca, Path::new("/tmp/root/"), &Options::new(), now
        ).unwrap();
        let earlier = build_at(now());
        let later = build_at(Utc.with_ymd_and_hms(2027, 7, 4, 8, 0, 0).unwrap());

        let changed: Vec<_> = earlier.iter().filter(|(key, value)| {
            later.get(key) != Some(*value)
        }).map(|(key, _)| key).collect();
        assert_eq!(changed, vec!["pki_install_time", "pki_timestamp"]);
        assert_eq!(earlier.iter().count(), later.iter().count());
        assert_eq!(later.get("pki_timestamp"), Some("20270704080000"));
    }

    #[test]
    fn web_server_from_subsystem_section() {
        let content = DEPLOYMENT.replace(
            "[CA]\n", "[CA]\npki_web_server = Apache\n"
        );
        let dict = build(&content, &[]).unwrap();
        assert_eq!(dict.get("pki_https_port"), Some("443"));
        assert_eq!(dict.get("pki_http_port"), Some("8080"));

        let dict = build(&content, &[("pki_web_server", "tomcat")]).unwrap();
        assert_eq!(dict.get("pki_https_port"), Some("18443"));
    }

    #[test]
    fn web_server_and_overrides() {
        let dict = build(
            DEPLOYMENT,
            &[("pki_web_server", "apache"), ("PKI_HOSTNAME", "ca.example.com")]
        ).unwrap();
        assert_eq!(dict.get("pki_https_port"), Some("443"));
        assert_eq!(dict.get("pki_uri"), Some("https://ca.example.com:443/"));

        assert!(matches!(
            build(DEPLOYMENT, &[("pki_web_server", "nginx")]),
            Err(DeployError::Invalid(key, _)) if key == "pki_web_server"
        ));
    }

    #[test]
    fn validation() {
        let invalid = |overrides: &[(&str, &str)], expected: &str| {
            match build(DEPLOYMENT, overrides) {
                Err(DeployError::Invalid(key, _)) => assert_eq!(key, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        };
        invalid(&[("pki_admin_password", "")], "pki_admin_password");
        invalid(&[("pki_https_port", "0")], "pki_https_port");
        invalid(&[("pki_https_port", "70000")], "pki_https_port");
        invalid(&[("pki_ajp_port", "18080")], "pki_ajp_port");
        invalid(&[("pki_log_level", "chatty")], "pki_log_level");
        invalid(&[("pki_instance_name", "../etc")], "pki_instance_name");
        invalid(
            &[("pki_random_serial_numbers_enable", "maybe")],
            "pki_random_serial_numbers_enable"
        );

        let ini = Ini::parse(DEPLOYMENT).unwrap();
        assert!(matches!(
            MasterDict::build(
                &ini, Subsystem::Kra, Path::new("/"), &Options::new(), now()
            ),
            Err(DeployError::UnsupportedSubsystem(Subsystem::Kra))
        ));
        assert!(matches!(
            build("[Tomcat]\n", &[]),
            Err(DeployError::Ini(ini::IniError::NoSection(_)))
        ));
    }
}
