//! Showing and revoking certificates.

use crate::api::cert::{
    CertDataInfos, CertId, CertQuery, CertRevokeRequest, CertStatus,
    RevocationReason,
};
use crate::api::request::CertRequestInfo;
use crate::cli::client::PkiClient;
use crate::cli::report::Report;
use crate::commons::httpclient;


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// List certificates
    List(List),

    /// Show a certificate
    Show(Show),

    /// Revoke a certificate (agents only)
    Revoke(Revoke),

    /// Release a certificate from hold (agents only)
    ReleaseHold(ReleaseHold),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::List(cmd) => cmd.run(client).await.into(),
            Self::Show(cmd) => cmd.run(client).await,
            Self::Revoke(cmd) => cmd.run(client).await.into(),
            Self::ReleaseHold(cmd) => cmd.run(client).await.into(),
        }
    }
}


//------------ List ----------------------------------------------------------

#[derive(clap::Args)]
pub struct List {
    /// Only show certificates with this status
    #[arg(long)]
    status: Option<CertStatus>,

    /// Only show certificates whose subject contains this text
    #[arg(long)]
    subject: Option<String>,

    /// Only show certificates issued with this profile
    #[arg(long)]
    profile: Option<String>,

    /// Number of entries to skip
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Maximum number of entries to show
    #[arg(long)]
    size: Option<usize>,
}

impl List {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertDataInfos, httpclient::Error> {
        client.certs_list(&CertQuery {
            status: self.status,
            subject: self.subject,
            profile: self.profile,
            start: self.start,
            size: self.size,
        }).await
    }
}


//------------ Show ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Show {
    /// The serial number, decimal or hex with a 0x prefix
    serial: CertId,

    /// Only show the PEM encoded certificate
    #[arg(long)]
    pem: bool,
}

impl Show {
    pub async fn run(self, client: &PkiClient) -> Report {
        let cert = client.cert_show(self.serial).await;
        if self.pem {
            cert.map(|cert| cert.encoded).into()
        }
        else {
            cert.into()
        }
    }
}


//------------ Revoke --------------------------------------------------------

#[derive(clap::Args)]
pub struct Revoke {
    /// The serial number, decimal or hex with a 0x prefix
    serial: CertId,

    /// The revocation reason by name or code
    #[arg(long, default_value = "Unspecified")]
    reason: RevocationReason,

    /// Comments to record with the revocation
    #[arg(long)]
    comments: Option<String>,
}

impl Revoke {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertRequestInfo, httpclient::Error> {
        client.cert_revoke(
            self.serial,
            &CertRevokeRequest {
                reason: self.reason,
                comments: self.comments,
                invalidity_date: None,
            }
        ).await
    }
}


//------------ ReleaseHold ---------------------------------------------------

#[derive(clap::Args)]
pub struct ReleaseHold {
    /// The serial number, decimal or hex with a 0x prefix
    serial: CertId,
}

impl ReleaseHold {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertRequestInfo, httpclient::Error> {
        client.cert_unrevoke(self.serial).await
    }
}
