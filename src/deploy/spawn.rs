//! Installing and removing instances.

use std::fmt;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use crate::cli::options::args::KeyValue;
use crate::commons::file;
use super::DeployError;
use super::ini::{Ini, Options};
use super::master::{MasterDict, Subsystem};
use super::template;


/// The template for the server configuration.
const PKID_CONF_TEMPLATE: &str = include_str!("../../defaults/pkid.conf.in");

/// Where instance manifests are kept below the root prefix.
const REGISTRY_DIR: &str = "etc/sysconfig/pki";


//------------ SpawnOptions --------------------------------------------------

/// The command line options of `pkispawn`.
#[derive(clap::Parser)]
#[command(version, about = "Installs a PKI server instance.")]
pub struct SpawnOptions {
    /// The subsystem to install
    #[arg(short, long, default_value = "CA")]
    pub subsystem: Subsystem,

    /// Path to the deployment file
    #[arg(short = 'f', long = "file", value_name = "path")]
    pub file: PathBuf,

    /// Prefix for all paths of the instance
    #[arg(short = 'p', long = "root", value_name = "path", default_value = "/")]
    pub root: PathBuf,

    /// Override a value of the deployment file
    #[arg(long = "set", value_name = "key=value")]
    pub overrides: Vec<KeyValue>,

    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl SpawnOptions {
    pub fn log_level(&self) -> LevelFilter {
        verbosity(self.verbose)
    }
}


//------------ DestroyOptions ------------------------------------------------

/// The command line options of `pkidestroy`.
#[derive(clap::Parser)]
#[command(version, about = "Removes a PKI server instance.")]
pub struct DestroyOptions {
    /// The name of the instance
    #[arg(short, long, value_name = "name")]
    pub instance: String,

    /// The subsystem to remove
    #[arg(short, long, default_value = "CA")]
    pub subsystem: Subsystem,

    /// Prefix for all paths of the instance
    #[arg(short = 'p', long = "root", value_name = "path", default_value = "/")]
    pub root: PathBuf,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl DestroyOptions {
    pub fn log_level(&self) -> LevelFilter {
        verbosity(self.verbose)
    }
}

fn verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}


//------------ Manifest ------------------------------------------------------

/// What was installed for an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Manifest {
    pub instance_name: String,
    pub subsystem: Subsystem,
    pub install_time: String,
    pub service_uri: String,
    pub config_file: PathBuf,

    /// Created directories, parents first.
    pub directories: Vec<PathBuf>,

    pub files: Vec<PathBuf>,
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Instance: {}", self.instance_name)?;
        writeln!(f, "Subsystem: {}", self.subsystem)?;
        writeln!(f, "Installed: {}", self.install_time)?;
        writeln!(f, "Service URI: {}", self.service_uri)?;
        writeln!(f, "Configuration: {}", self.config_file.display())
    }
}


//------------ spawn ---------------------------------------------------------

/// Installs a new instance.
pub fn spawn(
    options: &SpawnOptions, now: DateTime<Utc>
) -> Result<Manifest, DeployError> {
    let ini = Ini::parse(&file::read_to_string(&options.file)?)?;
    let overrides: Options = options.overrides.iter().map(|item| {
        (item.key.clone(), item.value.clone())
    }).collect();
    let dict = MasterDict::build(
        &ini, options.subsystem, &options.root, &overrides, now
    )?;
    for (key, value) in dict.iter() {
        if key.contains("password") {
            debug!("{key} = ********");
        }
        else {
            debug!("{key} = {value}");
        }
    }

    let name = dict.require("pki_instance_name")?.to_string();
    let instance_path = PathBuf::from(dict.require("pki_instance_path")?);
    let registry_file = PathBuf::from(dict.require("pki_registry_file")?);
    if instance_path.exists() || registry_file.exists() {
        return Err(DeployError::InstanceExists(name))
    }

    let config = template::render(PKID_CONF_TEMPLATE, &dict.slots())?;
    let config_file = PathBuf::from(dict.require("pki_server_config_file")?);
    let logs_path = PathBuf::from(dict.require("pki_logs_path")?);
    let archive = logs_path.join("archives").join(format!(
        "spawn_deployment.cfg.{}", dict.require("pki_timestamp")?
    ));

    let manifest = Manifest {
        instance_name: name,
        subsystem: options.subsystem,
        install_time: dict.require("pki_install_time")?.to_string(),
        service_uri: dict.require("pki_uri")?.to_string(),
        config_file: config_file.clone(),
        directories: vec![
            instance_path,
            PathBuf::from(dict.require("pki_subsystem_path")?),
            PathBuf::from(dict.require("pki_database_path")?),
            PathBuf::from(dict.require("pki_conf_path")?),
            logs_path,
        ],
        files: vec![config_file.clone(), archive.clone(), registry_file.clone()],
    };

    if options.dry_run {
        info!("Dry run, not installing instance '{}'", manifest.instance_name);
        return Ok(manifest)
    }

    for dir in &manifest.directories {
        info!("Creating directory {}", dir.display());
        file::create_dir_all(dir)?;
    }
    info!("Writing {}", config_file.display());
    file::save(config.as_bytes(), &config_file)?;
    file::save(&file::read(&options.file)?, &archive)?;

    let json = serde_json::to_vec_pretty(&manifest).map_err(|err| {
        DeployError::Manifest(err.to_string())
    })?;
    file::save(&json, &registry_file)?;
    info!(
        "Installed {} subsystem of instance '{}'",
        manifest.subsystem, manifest.instance_name
    );
    Ok(manifest)
}


//------------ destroy -------------------------------------------------------

/// Returns the path of the manifest of an instance.
pub fn registry_file(root: &Path, instance: &str) -> PathBuf {
    root.join(REGISTRY_DIR).join(format!("{instance}.json"))
}

/// Removes an instance installed by [`spawn`].
pub fn destroy(options: &DestroyOptions) -> Result<Manifest, DeployError> {
    let path = registry_file(&options.root, &options.instance);
    if !path.exists() {
        return Err(DeployError::InstanceUnknown(options.instance.clone()))
    }
    let manifest: Manifest = serde_json::from_slice(
        &file::read(&path)?
    ).map_err(|err| DeployError::Manifest(err.to_string()))?;
    if manifest.subsystem != options.subsystem {
        return Err(DeployError::InstanceUnknown(format!(
            "{} ({})", options.instance, options.subsystem
        )))
    }

    for path in &manifest.files {
        if path.exists() {
            debug!("Removing {}", path.display());
            file::delete_file(path)?;
        }
    }
    for dir in manifest.directories.iter().rev() {
        info!("Removing directory {}", dir.display());
        file::remove_dir_all(dir)?;
    }
    if path.exists() {
        file::delete_file(&path)?;
    }
    info!(
        "Removed {} subsystem of instance '{}'",
        manifest.subsystem, manifest.instance_name
    );
    Ok(manifest)
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::config::Config;

    const DEPLOYMENT: &str = "\
[DEFAULT]
pki_admin_password = Secret.123

[CA]
pki_instance_name = pki-spawn-test
pki_random_serial_numbers_enable = on
";

    fn spawn_options(root: &Path, file: &Path, extra: &[&str]) -> SpawnOptions {
        let mut args = vec![
            "pkispawn".to_string(), "-s".into(), "CA".into(),
            "-f".into(), file.display().to_string(),
            "-p".into(), root.display().to_string(),
        ];
        args.extend(extra.iter().map(ToString::to_string));
        SpawnOptions::try_parse_from(args).unwrap()
    }

    #[test]
    fn spawn_and_destroy() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("deployment.cfg");
        file::save(DEPLOYMENT.as_bytes(), &file).unwrap();

        let dry = spawn(
            &spawn_options(root.path(), &file, &["--dry-run"]), Utc::now()
        ).unwrap();
        assert!(!dry.directories[0].exists());
        assert!(!dry.config_file.exists());

        let options = spawn_options(
            root.path(), &file, &["--set", "pki_https_port=9443", "-v"]
        );
        assert_eq!(options.log_level(), LevelFilter::Debug);
        let manifest = spawn(&options, Utc::now()).unwrap();
        assert_eq!(manifest.instance_name, "pki-spawn-test");
        assert_eq!(manifest.service_uri, "https://localhost:9443/");
        for path in manifest.directories.iter().chain(manifest.files.iter()) {
            assert!(path.exists(), "missing {}", path.display());
        }

        let config = Config::read_config(
            manifest.config_file.to_str().unwrap()
        ).unwrap();
        config.verify().unwrap();
        assert_eq!(config.port, 9443);
        assert!(config.random_serial_numbers);
        assert_eq!(config.admin_token.as_ref(), "Secret.123");
        assert_eq!(config.service_uri, "https://localhost:9443/");

        assert!(matches!(
            spawn(&options, Utc::now()), Err(DeployError::InstanceExists(_))
        ));

        let destroy_options = DestroyOptions::try_parse_from([
            "pkidestroy", "-i", "pki-spawn-test",
            "-p", root.path().to_str().unwrap(),
        ]).unwrap();
        let removed = destroy(&destroy_options).unwrap();
        assert_eq!(removed, manifest);
        for path in manifest.directories.iter().chain(manifest.files.iter()) {
            assert!(!path.exists(), "left {}", path.display());
        }
        assert!(file.exists());
        assert!(matches!(
            destroy(&destroy_options), Err(DeployError::InstanceUnknown(_))
        ));
    }

    #[test]
    fn spawn_errors() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing.cfg");
        assert!(matches!(
            spawn(&spawn_options(root.path(), &missing, &[]), Utc::now()),
            Err(DeployError::Io(_))
        ));

        let file = root.path().join("deployment.cfg");
        file::save(b"[CA]\npki_instance_name = x\n", &file).unwrap();
        assert!(matches!(
            spawn(&spawn_options(root.path(), &file, &[]), Utc::now()),
            Err(DeployError::Invalid(key, _)) if key == "pki_admin_password"
        ));

        let options = SpawnOptions::try_parse_from([
            "pkispawn", "-s", "KRA", "-f", file.to_str().unwrap(),
        ]).unwrap();
        assert!(matches!(
            spawn(&options, Utc::now()),
            Err(DeployError::UnsupportedSubsystem(Subsystem::Kra))
        ));
    }
}
