//! Managing certificate profiles.

use std::path::{Path, PathBuf};
use crate::api::admin::Paging;
use crate::api::profile::{Profile, ProfileDataInfos, RawProfile};
use crate::cli::client::PkiClient;
use crate::cli::error::Error;
use crate::cli::report::Report;
use crate::commons::httpclient;
use super::args;


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// List the profiles
    List(List),

    /// Show a profile
    Show(Show),

    /// Add a new, disabled profile
    Add(Add),

    /// Replace a disabled profile
    Modify(Modify),

    /// Enable a profile for enrollment
    Enable(Id),

    /// Disable a profile
    Disable(Id),

    /// Delete a disabled profile
    Delete(Id),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::List(cmd) => cmd.run(client).await.into(),
            Self::Show(cmd) => cmd.run(client).await,
            Self::Add(cmd) => cmd.run(client).await,
            Self::Modify(cmd) => cmd.run(client).await,
            Self::Enable(id) => client.profile_enable(&id.id).await.into(),
            Self::Disable(id) => client.profile_disable(&id.id).await.into(),
            Self::Delete(id) => client.profile_delete(&id.id).await.into(),
        }
    }
}


//------------ Id ------------------------------------------------------------

#[derive(clap::Args)]
pub struct Id {
    /// The profile id
    pub id: String,
}


//------------ List ----------------------------------------------------------

#[derive(clap::Args)]
pub struct List {
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
    ) -> Result<ProfileDataInfos, httpclient::Error> {
        client.profiles_list(
            Paging { start: self.start, size: self.size }
        ).await
    }
}


//------------ Show ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Show {
    #[command(flatten)]
    id: Id,

    /// Show the profile in the raw configuration format
    #[arg(long)]
    raw: bool,
}

impl Show {
    pub async fn run(self, client: &PkiClient) -> Report {
        if self.raw {
            client.profile_show_raw(&self.id.id).await.into()
        }
        else {
            client.profile_show(&self.id.id).await.into()
        }
    }
}


//------------ Add -----------------------------------------------------------

#[derive(clap::Args)]
pub struct Add {
    /// Path to the profile, JSON unless --raw is given
    #[arg(long, short, value_name = "path")]
    input: PathBuf,

    /// The input is in the raw configuration format
    #[arg(long)]
    raw: bool,
}

impl Add {
    pub async fn run(self, client: &PkiClient) -> Report {
        if self.raw {
            let raw = match read_raw(&self.input) {
                Ok(raw) => raw,
                Err(err) => return Report::from_error(err),
            };
            client.profile_add_raw(&raw).await.into()
        }
        else {
            let profile = match args::read_json::<Profile>(&self.input) {
                Ok(profile) => profile,
                Err(err) => return Report::from_error(err),
            };
            client.profile_add(&profile).await.into()
        }
    }
}


//------------ Modify --------------------------------------------------------

#[derive(clap::Args)]
pub struct Modify {
    #[command(flatten)]
    id: Id,

    /// Path to the profile, JSON unless --raw is given
    #[arg(long, short, value_name = "path")]
    input: PathBuf,

    /// The input is in the raw configuration format
    #[arg(long)]
    raw: bool,
}

impl Modify {
    pub async fn run(self, client: &PkiClient) -> Report {
        if self.raw {
            let raw = match read_raw(&self.input) {
                Ok(raw) => raw,
                Err(err) => return Report::from_error(err),
            };
            client.profile_modify_raw(&self.id.id, &raw).await.into()
        }
        else {
            let profile = match args::read_json::<Profile>(&self.input) {
                Ok(profile) => profile,
                Err(err) => return Report::from_error(err),
            };
            client.profile_modify(&self.id.id, &profile).await.into()
        }
    }
}

fn read_raw(path: &Path) -> Result<RawProfile, Error> {
    args::read_text(path).map(|content| RawProfile { content })
}
