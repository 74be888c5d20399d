//! Managing users.

use crate::api::admin::Paging;
use crate::api::user::{UserData, UserInfos};
use crate::cli::client::PkiClient;
use crate::cli::report::Report;
use crate::commons::httpclient;


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// List users
    List(List),

    /// Show a user
    Show(UserId),

    /// Add a user
    Add(Add),

    /// Change the details of a user
    Modify(Modify),

    /// Delete a user
    Delete(UserId),

    /// Issue a new token for a user, replacing the current one
    Token(UserId),

    /// Show the groups of a user
    Membership(UserId),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::List(cmd) => cmd.run(client).await.into(),
            Self::Show(user) => client.user_show(&user.id).await.into(),
            Self::Add(cmd) => cmd.run(client).await.into(),
            Self::Modify(cmd) => cmd.run(client).await.into(),
            Self::Delete(user) => client.user_delete(&user.id).await.into(),
            Self::Token(user) => client.user_token(&user.id).await.into(),
            Self::Membership(user) => {
                client.user_memberships(&user.id).await.into()
            }
        }
    }
}


//------------ UserId --------------------------------------------------------

#[derive(clap::Args)]
pub struct UserId {
    /// The user id
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
    ) -> Result<UserInfos, httpclient::Error> {
        client.users_list(Paging { start: self.start, size: self.size }).await
    }
}


//------------ Details -------------------------------------------------------

#[derive(clap::Args)]
pub struct Details {
    /// Email address
    #[arg(long)]
    email: Option<String>,

    /// Phone number
    #[arg(long)]
    phone: Option<String>,

    /// Account state
    #[arg(long)]
    state: Option<String>,

    /// User type
    #[arg(long = "type")]
    user_type: Option<String>,
}

impl Details {
    fn into_user(self, id: &str, full_name: &str) -> UserData {
        UserData {
            email: self.email,
            phone: self.phone,
            state: self.state,
            user_type: self.user_type,
            ..UserData::new(id, full_name)
        }
    }
}


//------------ Add -----------------------------------------------------------

#[derive(clap::Args)]
pub struct Add {
    #[command(flatten)]
    user: UserId,

    /// Full name of the user
    #[arg(long)]
    full_name: String,

    #[command(flatten)]
    details: Details,
}

impl Add {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<UserData, httpclient::Error> {
        let user = self.details.into_user(&self.user.id, &self.full_name);
        client.user_add(&user).await
    }
}


//------------ Modify --------------------------------------------------------

#[derive(clap::Args)]
pub struct Modify {
    #[command(flatten)]
    user: UserId,

    /// New full name of the user
    #[arg(long)]
    full_name: Option<String>,

    #[command(flatten)]
    details: Details,
}

impl Modify {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<UserData, httpclient::Error> {
        let user = self.details.into_user(
            &self.user.id, self.full_name.as_deref().unwrap_or_default()
        );
        client.user_modify(&self.user.id, &user).await
    }
}
