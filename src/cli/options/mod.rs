//! The options for the PKI client.

//------------ Sub-modules ---------------------------------------------------

pub mod args;
mod cert;
mod group;
mod profile;
mod request;
mod server;
mod user;


//------------ Content -------------------------------------------------------

use clap::Parser;
use url::Url;
use crate::api::admin::Token;
use super::client::PkiClient;
use super::report::{Report, ReportFormat};


//------------ Options -------------------------------------------------------

/// The command line options for the PKI client.
#[derive(clap::Parser)]
#[command(
    version,
    about = "The PKI command line client.",
)]
pub struct Options {
    #[command(flatten)]
    pub general: GeneralOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Options {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won’t result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn client(&self) -> PkiClient {
        PkiClient::new(
            self.general.server.clone(), self.general.token.clone()
        )
    }
}


//------------ GeneralOptions ------------------------------------------------

/// The options common between all commands.
#[derive(clap::Args)]
pub struct GeneralOptions {
    /// The full URI to the PKI server.
    #[arg(
        short, long,
        env = "PKI_CLI_SERVER",
        default_value = "https://localhost:8443/"
    )]
    pub server: Url,

    /// The token to authenticate with.
    #[arg(short, long, env = "PKI_CLI_TOKEN")]
    pub token: Option<Token>,

    /// Report format: text or json
    #[arg(
        short, long,
        env = "PKI_CLI_FORMAT",
        default_value = "text",
    )]
    pub format: ReportFormat,

    /// Only show the API call and exit.
    #[arg(long)]
    pub api: bool,
}


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// Show server info.
    Info(server::Info),

    /// Check that the server is up.
    Health(server::Health),

    /// Manage certificate profiles
    #[command(subcommand)]
    Profile(profile::Command),

    /// Submit and review certificate requests
    #[command(subcommand)]
    Request(request::Command),

    /// Show and revoke certificates
    #[command(subcommand)]
    Cert(cert::Command),

    /// Manage users
    #[command(subcommand)]
    User(user::Command),

    /// Manage groups
    #[command(subcommand)]
    Group(group::Command),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::Info(cmd) => cmd.run(client).await.into(),
            Self::Health(cmd) => cmd.run(client).await.into(),
            Self::Profile(cmd) => cmd.run(client).await,
            Self::Request(cmd) => cmd.run(client).await,
            Self::Cert(cmd) => cmd.run(client).await,
            Self::User(cmd) => cmd.run(client).await,
            Self::Group(cmd) => cmd.run(client).await,
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_general_options() {
        let options = Options::try_parse_from([
            "pkic", "-s", "https://ca.example.com:8443/", "-t", "secret",
            "-f", "json", "profile", "list",
        ]).unwrap();
        assert_eq!(
            options.general.server.as_str(), "https://ca.example.com:8443/"
        );
        assert_eq!(options.general.format, ReportFormat::Json);
        assert_eq!(
            options.client().token().map(AsRef::as_ref), Some("secret")
        );
        assert!(!options.general.api);
        assert!(Options::try_parse_from(["pkic", "-f", "yaml", "info"]).is_err());
    }

    #[test]
    fn command_structure() {
        use clap::CommandFactory;
        Options::command().debug_assert();
    }
}
