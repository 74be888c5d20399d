//! Managing groups.

use crate::api::admin::Paging;
use crate::api::user::{GroupData, GroupInfos};
use crate::cli::client::PkiClient;
use crate::cli::report::Report;
use crate::commons::httpclient;


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// List groups
    List(List),

    /// Show a group
    Show(GroupId),

    /// Add a group
    Add(Details),

    /// Change the description of a group
    Modify(Details),

    /// Delete a group
    Delete(GroupId),

    /// List the members of a group
    MemberList(GroupId),

    /// Add a user to a group
    MemberAdd(Member),

    /// Remove a user from a group
    MemberDel(Member),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::List(cmd) => cmd.run(client).await.into(),
            Self::Show(group) => client.group_show(&group.id).await.into(),
            Self::Add(details) => {
                client.group_add(&details.into_group()).await.into()
            }
            Self::Modify(details) => {
                let group = details.into_group();
                client.group_modify(&group.id, &group).await.into()
            }
            Self::Delete(group) => {
                client.group_delete(&group.id).await.into()
            }
            Self::MemberList(group) => {
                client.group_members(&group.id).await.into()
            }
            Self::MemberAdd(member) => {
                client.group_member_add(
                    &member.group.id, &member.user
                ).await.map(|member| member.id).into()
            }
            Self::MemberDel(member) => {
                client.group_member_remove(
                    &member.group.id, &member.user
                ).await.into()
            }
        }
    }
}


//------------ GroupId -------------------------------------------------------

#[derive(clap::Args)]
pub struct GroupId {
    /// The group id
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
    ) -> Result<GroupInfos, httpclient::Error> {
        client.groups_list(Paging { start: self.start, size: self.size }).await
    }
}


//------------ Details -------------------------------------------------------

#[derive(clap::Args)]
pub struct Details {
    #[command(flatten)]
    group: GroupId,

    /// Description of the group
    #[arg(long)]
    description: Option<String>,
}

impl Details {
    fn into_group(self) -> GroupData {
        GroupData::new(&self.group.id, self.description.as_deref())
    }
}


//------------ Member --------------------------------------------------------

#[derive(clap::Args)]
pub struct Member {
    #[command(flatten)]
    group: GroupId,

    /// The user id of the member
    user: String,
}
