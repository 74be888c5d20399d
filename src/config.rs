//! Configuration of the server.

use std::{env, fmt, io};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::{LevelFilter, error};
use serde::de;
use serde::{Deserialize, Deserializer};
#[cfg(unix)]
use syslog::Facility;
use url::Url;
use crate::api::admin::Token;
use crate::commons::storage::KeyValueError;
use crate::constants::{
    PKI_DEFAULT_CONFIG_FILE, PKI_ENV_ADMIN_TOKEN, PKI_ENV_LOG_LEVEL,
    VALIDITY_MAX_DAYS,
};
use crate::daemon::http::tls_keys;


//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    fn port() -> u16 {
        8443
    }

    fn https_mode() -> HttpsMode {
        HttpsMode::Generate
    }

    fn data_dir() -> PathBuf {
        PathBuf::from("./data")
    }

    fn service_uri() -> String {
        "https://localhost:8443/".to_string()
    }

    fn log_level() -> LevelFilter {
        match env::var(PKI_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!(
                        "Unrecognized value for log level in env var {}",
                        PKI_ENV_LOG_LEVEL
                    );
                    ::std::process::exit(1);
                }
            },
            _ => LevelFilter::Info,
        }
    }

    fn log_type() -> LogType {
        LogType::File
    }

    fn log_file() -> PathBuf {
        PathBuf::from("./pkid.log")
    }

    fn syslog_facility() -> String {
        "daemon".to_string()
    }

    fn admin_token() -> Token {
        match env::var(PKI_ENV_ADMIN_TOKEN) {
            Ok(token) => Token::from(token),
            Err(_) => {
                eprintln!(
                    "You MUST provide a value for the admin token, either \
                     by setting \"admin_token\" in the config file, or by \
                     setting the {} environment variable.",
                    PKI_ENV_ADMIN_TOKEN
                );
                ::std::process::exit(1);
            }
        }
    }

    fn post_limit_api() -> u64 {
        256 * 1024 // 256kB
    }

    fn ca_subject() -> String {
        "CN=CA Signing Certificate,O=EXAMPLE".to_string()
    }

    fn ca_key_type() -> KeyType {
        KeyType::Rsa
    }

    fn ca_key_size() -> u32 {
        2048
    }

    fn ca_validity_days() -> u32 {
        7305
    }

    fn random_serial_numbers() -> bool {
        false
    }

    fn expiry_check_seconds() -> u64 {
        3600
    }

    fn max_list_size() -> usize {
        100
    }
}


//------------ Config --------------------------------------------------------

/// Global configuration for the server.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "ConfigDefaults::ip")]
    ip: IpAddr,

    #[serde(default = "ConfigDefaults::port")]
    pub port: u16,

    #[serde(default = "ConfigDefaults::https_mode")]
    pub https_mode: HttpsMode,

    #[serde(default = "ConfigDefaults::data_dir")]
    pub data_dir: PathBuf,

    /// Where state is kept, `local://<data_dir>` if not set.
    #[serde(default)]
    storage_uri: Option<Url>,

    #[serde(default)]
    pub pid_file: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::service_uri")]
    pub service_uri: String,

    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "deserialize_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    #[serde(default = "ConfigDefaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,

    #[serde(default = "ConfigDefaults::admin_token")]
    pub admin_token: Token,

    #[serde(default = "ConfigDefaults::post_limit_api")]
    pub post_limit_api: u64,

    #[serde(default = "ConfigDefaults::ca_subject")]
    pub ca_subject: String,

    #[serde(default = "ConfigDefaults::ca_key_type")]
    pub ca_key_type: KeyType,

    /// RSA modulus bits, or the EC curve size in bits.
    #[serde(default = "ConfigDefaults::ca_key_size")]
    pub ca_key_size: u32,

    #[serde(default = "ConfigDefaults::ca_validity_days")]
    pub ca_validity_days: u32,

    #[serde(default = "ConfigDefaults::random_serial_numbers")]
    pub random_serial_numbers: bool,

    #[serde(default = "ConfigDefaults::expiry_check_seconds")]
    pub expiry_check_seconds: u64,

    #[serde(default = "ConfigDefaults::max_list_size")]
    pub max_list_size: usize,
}

/// # Accessors
impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn https_mode(&self) -> &HttpsMode {
        &self.https_mode
    }

    pub fn https_cert_file(&self) -> PathBuf {
        tls_keys::cert_file_path(&self.data_dir)
    }

    pub fn https_key_file(&self) -> PathBuf {
        tls_keys::key_file_path(&self.data_dir)
    }

    pub fn pid_file(&self) -> PathBuf {
        match &self.pid_file {
            None => self.data_dir.join("pkid.pid"),
            Some(file) => file.clone(),
        }
    }

    /// Returns the storage URI.
    ///
    /// Only available after the config has been resolved, which
    /// [`Config::create`] does.
    pub fn storage_uri(&self) -> Result<&Url, KeyValueError> {
        self.storage_uri.as_ref().ok_or_else(|| {
            KeyValueError::UnknownLocation(
                self.data_dir.display().to_string()
            )
        })
    }

    /// Returns the service URI without trailing slash.
    pub fn service_base(&self) -> &str {
        self.service_uri.trim_end_matches('/')
    }
}

/// # Create
impl Config {
    /// Returns the config for the given file or the default location.
    ///
    /// The config is read, resolved and verified. Logging is not set up
    /// yet, use [`Config::init_logging`] for that.
    pub fn create(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let file = config_file.unwrap_or(PKI_DEFAULT_CONFIG_FILE);
        let mut config = Self::read_config(file)?;
        config.resolve()?;
        config.verify()?;
        Ok(config)
    }

    pub fn read_config(file: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file).map_err(|e| {
            ConfigError::Other(format!("Cannot read config file '{file}': {e}"))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Fills in values derived from other values.
    fn resolve(&mut self) -> Result<(), ConfigError> {
        if self.storage_uri.is_none() {
            let data_dir = std::path::absolute(&self.data_dir)?;
            let uri = Url::from_directory_path(&data_dir).map_err(|_| {
                ConfigError::Other(format!(
                    "Cannot use data dir '{}' as storage location",
                    data_dir.display()
                ))
            })?;
            self.storage_uri = Some(uri);
        }
        Ok(())
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::other("Port number must not be 0"));
        }

        if !self.service_uri.ends_with('/') {
            return Err(ConfigError::other("service URI must end with '/'"));
        }
        match Url::parse(&self.service_uri) {
            Ok(uri) if uri.scheme() == "https" || uri.scheme() == "http" => {}
            _ => {
                return Err(ConfigError::Other(format!(
                    "Invalid service uri: {}", self.service_uri
                )))
            }
        }

        match self.storage_uri.as_ref().map(Url::scheme) {
            None | Some("local") | Some("file") | Some("memory") => {}
            Some(other) => {
                return Err(ConfigError::Other(format!(
                    "Unsupported storage uri scheme: {other}"
                )))
            }
        }

        match self.ca_key_type {
            KeyType::Rsa => {
                if !(2048..=8192).contains(&self.ca_key_size) {
                    return Err(ConfigError::other(
                        "ca_key_size for RSA must be between 2048 and 8192",
                    ));
                }
            }
            KeyType::Ec => {
                if !matches!(self.ca_key_size, 256 | 384 | 521) {
                    return Err(ConfigError::other(
                        "ca_key_size for EC must be 256, 384, or 521",
                    ));
                }
            }
        }

        if self.ca_subject.trim().is_empty() {
            return Err(ConfigError::other("ca_subject must not be empty"));
        }

        if self.ca_validity_days < 1
            || i64::from(self.ca_validity_days) > VALIDITY_MAX_DAYS
        {
            return Err(ConfigError::Other(format!(
                "ca_validity_days must be between 1 and {VALIDITY_MAX_DAYS}"
            )));
        }

        if self.expiry_check_seconds < 1 {
            return Err(ConfigError::other(
                "expiry_check_seconds must be at least 1",
            ));
        }

        if self.max_list_size < 1 {
            return Err(ConfigError::other("max_list_size must be at least 1"));
        }

        if self.https_mode == HttpsMode::Existing {
            if !self.https_cert_file().exists() {
                return Err(ConfigError::Other(format!(
                    "https_mode is 'existing' but '{}' is missing",
                    self.https_cert_file().display()
                )));
            }
            if !self.https_key_file().exists() {
                return Err(ConfigError::Other(format!(
                    "https_mode is 'existing' but '{}' is missing",
                    self.https_key_file().display()
                )));
            }
        }

        Ok(())
    }

    /// Creates a config for running a server in tests.
    ///
    /// The server listens on localhost at the given port using plain HTTP
    /// and keeps its state in memory.
    pub fn test(data_dir: &Path, port: u16, admin_token: Token) -> Self {
        let storage_uri = Url::parse(&format!(
            "memory://{}", hex::encode(rand::random::<[u8; 8]>())
        )).ok();
        Config {
            ip: ConfigDefaults::ip(),
            port,
            https_mode: HttpsMode::Disable,
            data_dir: data_dir.to_path_buf(),
            storage_uri,
            pid_file: None,
            service_uri: format!("http://localhost:{port}/"),
            log_level: LevelFilter::Debug,
            log_type: LogType::Stderr,
            log_file: ConfigDefaults::log_file(),
            syslog_facility: ConfigDefaults::syslog_facility(),
            admin_token,
            post_limit_api: ConfigDefaults::post_limit_api(),
            ca_subject: "CN=Test CA,O=EXAMPLE".to_string(),
            ca_key_type: KeyType::Ec,
            ca_key_size: 256,
            ca_validity_days: ConfigDefaults::ca_validity_days(),
            random_serial_numbers: false,
            expiry_check_seconds: ConfigDefaults::expiry_check_seconds(),
            max_list_size: ConfigDefaults::max_list_size(),
        }
    }
}

/// # Logging
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(&self.log_file),
            LogType::Stderr => self.stderr_logger(),
            #[cfg(unix)]
            LogType::Syslog => {
                let facility = Facility::from_str(&self.syslog_facility)
                    .map_err(|_| {
                        ConfigError::other("Invalid syslog_facility")
                    })?;
                self.syslog_logger(facility)
            }
            #[cfg(not(unix))]
            LogType::Syslog => {
                Err(ConfigError::other(
                    "syslog is not supported on this platform"
                ))
            }
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        init_stderr_logging(self.log_level)
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string = format!(
                    "Failed to open log file '{}': {}", path.display(), err
                );
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| {
                ConfigError::Other(format!("Failed to init file logging: {e}"))
            })
    }

    /// Creates a syslog logger and configures correctly.
    #[cfg(unix)]
    fn syslog_logger(
        &self, facility: syslog::Facility
    ) -> Result<(), ConfigError> {
        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from("pkid"));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| {
                syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514))
            });
        match logger {
            Ok(logger) => self
                .fern_logger()
                .chain(logger)
                .apply()
                .map_err(|e| {
                    ConfigError::Other(format!("Failed to init syslog: {e}"))
                }),
            Err(err) => {
                let msg = format!("Cannot connect to syslog: {err}");
                Err(ConfigError::Other(msg))
            }
        }
    }

    /// Creates and returns a fern logger with log level tweaks
    fn fern_logger(&self) -> fern::Dispatch {
        fern_dispatch(self.log_level)
    }
}

/// Sets up logging to stderr at the given level.
///
/// This is used by the tools that run without a server config.
pub fn init_stderr_logging(log_level: LevelFilter) -> Result<(), ConfigError> {
    fern_dispatch(log_level)
        .chain(io::stderr())
        .apply()
        .map_err(|e| {
            ConfigError::Other(format!("Failed to init stderr logging: {e}"))
        })
}

/// Creates a fern dispatch with our format and the noisy crates quieted.
fn fern_dispatch(log_level: LevelFilter) -> fern::Dispatch {
    // suppress overly noisy logging
    let framework_level = log_level.min(LevelFilter::Warn);
    let pki_framework_level = log_level.min(LevelFilter::Debug);

    let show_target = log_level == LevelFilter::Trace
        || log_level == LevelFilter::Debug;
    fern::Dispatch::new()
        .format(move |out, message, record| {
            if show_target {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    message
                ))
            }
        })
        .level(log_level)
        .level_for("rustls", framework_level)
        .level_for("hyper", framework_level)
        .level_for("hyper_util", framework_level)
        .level_for("mio", framework_level)
        .level_for("reqwest", framework_level)
        .level_for("tokio_reactor", framework_level)
        .level_for("want", framework_level)
        .level_for("tracing::span", framework_level)
        .level_for("h2", framework_level)
        .level_for("pki::commons::storage", pki_framework_level)
        .level_for("pki::commons::file", pki_framework_level)
}


//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}


//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(de::Error::custom(format!(
                "expected \"stderr\", \"file\" or \"syslog\", \
                 found: \"{string}\""
            ))),
        }
    }
}


//------------ HttpsMode -----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HttpsMode {
    /// Use the key and certificate found in the data dir.
    Existing,

    /// Generate a self-signed key and certificate if needed.
    Generate,

    /// Serve plain HTTP.
    Disable,
}

impl HttpsMode {
    pub fn is_generate_https_cert(&self) -> bool {
        *self == HttpsMode::Generate
    }

    pub fn is_disabled(&self) -> bool {
        *self == HttpsMode::Disable
    }
}

impl<'de> Deserialize<'de> for HttpsMode {
    fn deserialize<D>(d: D) -> Result<HttpsMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "existing" => Ok(HttpsMode::Existing),
            "generate" => Ok(HttpsMode::Generate),
            "disable" => Ok(HttpsMode::Disable),
            _ => Err(de::Error::custom(format!(
                "expected \"existing\", \"generate\", or \"disable\", \
                 found: \"{string}\""
            ))),
        }
    }
}


//------------ KeyType -------------------------------------------------------

/// The algorithm of the CA signing key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyType {
    Rsa,
    Ec,
}

impl<'de> Deserialize<'de> for KeyType {
    fn deserialize<D>(d: D) -> Result<KeyType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyType::Rsa),
            "ec" => Ok(KeyType::Ec),
            _ => Err(de::Error::custom(format!(
                "expected \"rsa\" or \"ec\", found: \"{string}\""
            ))),
        }
    }
}


fn deserialize_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    LevelFilter::from_str(&string).map_err(|_| {
        de::Error::custom(format!("invalid log level: \"{string}\""))
    })
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        admin_token = "secret"
        log_level = "info"
    "#;

    fn parse(toml: &str) -> Config {
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve().unwrap();
        config
    }

    #[test]
    fn should_apply_defaults() {
        let c = parse(MINIMAL);
        let expected_socket_addr: SocketAddr = ([127, 0, 0, 1], 8443).into();
        assert_eq!(c.socket_addr(), expected_socket_addr);
        assert_eq!(c.https_mode, HttpsMode::Generate);
        assert_eq!(c.ca_key_type, KeyType::Rsa);
        assert_eq!(c.storage_uri().unwrap().scheme(), "file");
        assert!(c.pid_file().ends_with("pkid.pid"));
        c.verify().unwrap();
    }

    #[test]
    fn should_parse_all_keys() {
        let c = parse(r#"
            ip = "0.0.0.0"
            port = 9443
            https_mode = "disable"
            data_dir = "/var/lib/pki/ca"
            storage_uri = "memory://ca"
            log_level = "debug"
            log_type = "stderr"
            admin_token = "secret"
            service_uri = "https://ca.example.com:9443/"
            ca_subject = "CN=Example CA"
            ca_key_type = "ec"
            ca_key_size = 384
            random_serial_numbers = true
            expiry_check_seconds = 60
        "#);
        assert_eq!(c.port, 9443);
        assert!(c.https_mode.is_disabled());
        assert_eq!(c.storage_uri().unwrap().as_str(), "memory://ca");
        assert_eq!(c.log_level, LevelFilter::Debug);
        assert_eq!(c.log_type, LogType::Stderr);
        assert_eq!(c.ca_key_type, KeyType::Ec);
        assert!(c.random_serial_numbers);
        assert_eq!(c.service_base(), "https://ca.example.com:9443");
        c.verify().unwrap();
    }

    #[test]
    fn should_reject_bad_values() {
        assert!(toml::from_str::<Config>(
            "admin_token = \"x\"\nhttps_mode = \"sometimes\""
        ).is_err());
        assert!(toml::from_str::<Config>(
            "admin_token = \"x\"\nlog_level = \"loud\""
        ).is_err());

        let c = parse("admin_token = \"x\"\nservice_uri = \"https://a\"");
        assert!(c.verify().is_err());

        let c = parse(
            "admin_token = \"x\"\nca_key_type = \"ec\"\nca_key_size = 2048"
        );
        assert!(c.verify().is_err());

        let c = parse("admin_token = \"x\"\nca_validity_days = 100000000");
        assert!(c.verify().is_err());
        let c = parse("admin_token = \"x\"\nca_validity_days = 36500");
        c.verify().unwrap();
    }

    #[test]
    fn should_set_correct_log_levels() {
        use log::Level as LL;

        fn void_logger(level: &str) -> Box<dyn log::Log> {
            let c = parse(&format!(
                "admin_token = \"secret\"\nlog_level = \"{level}\""
            ));
            let void_output = fern::Output::writer(Box::new(io::sink()), "");
            let (_, void_logger) = c.fern_logger().chain(void_output).into_log();
            void_logger
        }

        fn for_target_at_level(target: &str, level: LL) -> log::Metadata {
            log::Metadata::builder().target(target).level(level).build()
        }

        for config_level in ["error", "warn", "info", "debug", "trace"] {
            let log = void_logger(config_level);
            let config_level = LL::from_str(config_level).unwrap();

            for level in [LL::Error, LL::Warn, LL::Info, LL::Debug, LL::Trace] {
                // Our own code logs at the configured level.
                assert_eq!(
                    log.enabled(&for_target_at_level("pki", level)),
                    level <= config_level
                );

                // Frameworks never log more than warnings.
                assert_eq!(
                    log.enabled(&for_target_at_level("hyper", level)),
                    level <= config_level && level <= LL::Warn
                );

                // Storage never logs at trace.
                assert_eq!(
                    log.enabled(
                        &for_target_at_level("pki::commons::storage", level)
                    ),
                    level <= config_level && level <= LL::Debug
                );
            }
        }
    }
}
