//! Various crate-wide constants.

//------------ Binary Names -------------------------------------------------

/// The friendly name of the `pkid` binary.
pub const PKI_SERVER_APP: &str = "PKI Certificate Server";

/// The friendly name of the `pkic` binary.
pub const PKI_CLIENT_APP: &str = "PKI Client";

/// The friendly name of the `pkispawn` binary.
pub const PKI_SPAWN_APP: &str = "PKI Instance Installer";

/// The version of this crate.
pub const PKI_VERSION: &str = env!("CARGO_PKG_VERSION");


//------------ Config Files Paths -------------------------------------------

/// The default path to the server config file.
pub const PKI_DEFAULT_CONFIG_FILE: &str = "/etc/pki/pkid.conf";

/// The default root under which instances are deployed.
pub const PKI_DEFAULT_INSTANCE_ROOT: &str = "/var/lib/pki";


//------------ Environment Variables ----------------------------------------

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It will
/// be overwritten by the config file. The default is “info.”
pub const PKI_ENV_LOG_LEVEL: &str = "PKI_LOG_LEVEL";

/// The environment variable with the admin token.
///
/// Used when the config file does not contain an `admin_token`.
pub const PKI_ENV_ADMIN_TOKEN: &str = "PKI_ADMIN_TOKEN";

/// The environment variable indicating to log HTTP requests.
///
/// If this variable is set, the HTTP server will log all requests at log
/// level “info.”
pub const PKI_ENV_HTTP_LOG_INFO: &str = "PKI_HTTP_LOG_INFO";

/// The environment variable that makes the client print API calls and exit.
pub const PKI_CLI_API_ENV: &str = "PKI_CLI_API";

/// The environment variable with additional HTTPS root certificates.
///
/// This is a colon separated list of paths to PEM files.
pub const PKI_HTTPS_ROOT_CERTS_ENV: &str = "PKI_HTTPS_ROOT_CERTS";


//------------ HTTP ---------------------------------------------------------

/// The base path of the REST API.
pub const REST_BASE: &str = "ca/rest";

/// The timeout of requests made by the client.
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 120;

/// Maximum length of a user agent we will log.
pub const HTTP_USER_AGENT_TRUNCATE: usize = 256;

/// The sub directory of the data dir holding the HTTPS key and certificate.
pub const HTTPS_SUB_DIR: &str = "ssl";


//------------ Users and Groups ---------------------------------------------

/// The id of the built-in actor authenticated by the admin token.
pub const ACTOR_ID_ADMIN: &str = "admin";

/// The id of the actor used for unauthenticated requests.
pub const ACTOR_ID_ANON: &str = "anonymous";

/// The id of the actor used for background tasks.
pub const ACTOR_ID_SYSTEM: &str = "system";

/// The group whose members may administer profiles, users and groups.
pub const GROUP_ADMINISTRATORS: &str = "Administrators";

/// The group whose members may review requests and revoke certificates.
pub const GROUP_AGENTS: &str = "Certificate Manager Agents";


//------------ Profiles -----------------------------------------------------

/// The profile id recorded on the CA signing certificate.
pub const CA_SIGNING_PROFILE: &str = "caCACert";

/// The authenticator id that auto-approves requests from agents.
pub const AUTHENTICATOR_AGENT: &str = "AgentCertAuth";

/// The longest validity in days a profile or the CA may ask for.
pub const VALIDITY_MAX_DAYS: i64 = 36_500;

/// The largest offset in seconds a validity may start before or after now.
pub const VALIDITY_MAX_OFFSET_SECS: i64 = 366 * 24 * 3600;


//------------ Storage ------------------------------------------------------

/// Storage namespace for profiles.
pub const NS_PROFILES: &str = "profiles";

/// Storage namespace for certificate requests.
pub const NS_REQUESTS: &str = "requests";

/// Storage namespace for issued certificates.
pub const NS_CERTS: &str = "certs";

/// Storage namespace for users.
pub const NS_USERS: &str = "users";

/// Storage namespace for groups.
pub const NS_GROUPS: &str = "groups";

/// Storage namespace for the CA keys and counters.
pub const NS_CA: &str = "ca";
