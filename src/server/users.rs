//! Users, groups and group membership.
//!
//! Users authenticate with a bearer token. Only the SHA-256 digest of the
//! token is stored, the token itself is handed out once by
//! [`UserManager::issue_token`]. Membership is kept on the group.

use std::sync::Mutex;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::api::admin::Token;
use crate::api::user::{
    GroupData, GroupInfos, GroupMemberData, GroupMemberInfos, UserData,
    UserInfos, UserToken,
};
use crate::commons::{PkiEmptyResult, PkiResult};
use crate::commons::error::Error;
use crate::commons::storage::KeyValueStore;
use crate::config::Config;
use crate::constants::{
    GROUP_ADMINISTRATORS, GROUP_AGENTS, NS_GROUPS, NS_USERS,
};

lazy_static::lazy_static! {
    static ref USER_ID: Regex = Regex::new(
        r"^[a-zA-Z0-9_][a-zA-Z0-9_.@-]*$"
    ).expect("valid regex");
    static ref GROUP_ID: Regex = Regex::new(
        r"^[a-zA-Z0-9_][a-zA-Z0-9_. -]*$"
    ).expect("valid regex");
}


//------------ UserRecord ----------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize)]
struct UserRecord {
    data: UserData,

    /// The hex encoded digest of the current token.
    #[serde(default)]
    token_digest: Option<String>,
}


//------------ GroupRecord ---------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize)]
struct GroupRecord {
    data: GroupData,

    #[serde(default)]
    members: Vec<String>,
}


//------------ UserManager ---------------------------------------------------

#[derive(Debug)]
pub struct UserManager {
    users: KeyValueStore,
    groups: KeyValueStore,

    /// Serializes updates across both stores.
    lock: Mutex<()>,

    max_list_size: usize,
}

/// # Set up
impl UserManager {
    /// Opens the stores and adds missing built-in groups.
    pub fn create(config: &Config) -> PkiResult<Self> {
        let manager = UserManager {
            users: KeyValueStore::create(config.storage_uri()?, NS_USERS)?,
            groups: KeyValueStore::create(config.storage_uri()?, NS_GROUPS)?,
            lock: Mutex::new(()),
            max_list_size: config.max_list_size,
        };
        for (id, description) in [
            (GROUP_ADMINISTRATORS, "Administrators"),
            (GROUP_AGENTS, "Agents for Certificate Manager"),
        ] {
            if !manager.groups.has(id)? {
                manager.groups.store(id, &GroupRecord {
                    data: GroupData::new(id, Some(description)),
                    members: Vec::new(),
                })?;
            }
        }
        Ok(manager)
    }

    fn page<T: Clone>(
        &self, items: &[T], start: usize, size: Option<usize>
    ) -> Vec<T> {
        let size = size.unwrap_or(self.max_list_size).min(self.max_list_size);
        items.iter().skip(start).take(size).cloned().collect()
    }
}

/// # Users
impl UserManager {
    pub fn list_users(
        &self, start: usize, size: Option<usize>
    ) -> PkiResult<UserInfos> {
        let users: Vec<_> = self.users.values::<UserRecord>()?
            .into_iter()
            .map(|record| record.data)
            .collect();
        Ok(UserInfos {
            total: users.len(),
            entries: self.page(&users, start, size),
        })
    }

    pub fn show_user(&self, id: &str) -> PkiResult<UserData> {
        self.get_user(id).map(|record| record.data)
    }

    /// Adds a user. The id is taken from `UserID`, or `id` if empty.
    pub fn add_user(&self, mut user: UserData) -> PkiResult<UserData> {
        if user.user_id.is_empty() {
            user.user_id = user.id.clone();
        }
        user.id = user.user_id.clone();
        if !USER_ID.is_match(&user.id) {
            return Err(Error::UserInvalidId(user.id))
        }
        let _lock = self.lock.lock().expect("poisoned lock");
        if self.users.has(&user.id)? {
            return Err(Error::UserDuplicate(user.id))
        }
        self.users.store(&user.id, &UserRecord {
            data: user.clone(), token_digest: None
        })?;
        info!("Added user '{}'", user.id);
        Ok(user)
    }

    pub fn modify_user(&self, id: &str, user: UserData) -> PkiResult<UserData> {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.get_user(id)?;
        record.data.update(user);
        self.users.store(id, &record)?;
        info!("Modified user '{id}'");
        Ok(record.data)
    }

    /// Deletes a user and removes it from all groups.
    pub fn delete_user(&self, id: &str) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        self.get_user(id)?;
        for mut group in self.groups.values::<GroupRecord>()? {
            if group.members.iter().any(|member| member == id) {
                group.members.retain(|member| member != id);
                self.groups.store(&group.data.id, &group)?;
            }
        }
        self.users.delete(id)?;
        info!("Deleted user '{id}'");
        Ok(())
    }

    /// Creates a new token for a user, replacing any previous one.
    pub fn issue_token(&self, id: &str) -> PkiResult<UserToken> {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.get_user(id)?;
        let token = Token::random();
        record.token_digest = Some(token.digest()?);
        self.users.store(id, &record)?;
        info!("Issued new token for user '{id}'");
        Ok(UserToken { user_id: id.to_string(), token })
    }

    /// Returns the id of the user holding the token.
    pub fn authenticate(&self, token: &Token) -> PkiResult<Option<String>> {
        let digest = token.digest()?;
        Ok(self.users.values::<UserRecord>()?.into_iter().find_map(|record| {
            (record.token_digest.as_deref() == Some(digest.as_str()))
                .then_some(record.data.id)
        }))
    }

    /// Returns the groups the user is a member of.
    pub fn memberships(&self, id: &str) -> PkiResult<GroupInfos> {
        self.get_user(id)?;
        let groups: Vec<_> = self.groups.values::<GroupRecord>()?
            .into_iter()
            .filter(|group| group.members.iter().any(|member| member == id))
            .map(|group| group.data)
            .collect();
        Ok(GroupInfos { total: groups.len(), entries: groups })
    }

    pub fn is_member(&self, user: &str, group: &str) -> PkiResult<bool> {
        Ok(self.groups.get::<GroupRecord>(group)?.is_some_and(|group| {
            group.members.iter().any(|member| member == user)
        }))
    }

    fn get_user(&self, id: &str) -> PkiResult<UserRecord> {
        if !USER_ID.is_match(id) {
            return Err(Error::UserUnknown(id.to_string()))
        }
        self.users.get(id)?.ok_or_else(|| Error::UserUnknown(id.to_string()))
    }
}

/// # Groups
impl UserManager {
    pub fn list_groups(
        &self, start: usize, size: Option<usize>
    ) -> PkiResult<GroupInfos> {
        let groups: Vec<_> = self.groups.values::<GroupRecord>()?
            .into_iter()
            .map(|record| record.data)
            .collect();
        Ok(GroupInfos {
            total: groups.len(),
            entries: self.page(&groups, start, size),
        })
    }

    pub fn show_group(&self, id: &str) -> PkiResult<GroupData> {
        self.get_group(id).map(|record| record.data)
    }

    /// Adds a group. The id is taken from `GroupID`, or `id` if empty.
    pub fn add_group(&self, mut group: GroupData) -> PkiResult<GroupData> {
        if group.group_id.is_empty() {
            group.group_id = group.id.clone();
        }
        group.id = group.group_id.clone();
        if !GROUP_ID.is_match(&group.id) {
            return Err(Error::GroupInvalidId(group.id))
        }
        let _lock = self.lock.lock().expect("poisoned lock");
        if self.groups.has(&group.id)? {
            return Err(Error::GroupDuplicate(group.id))
        }
        self.groups.store(&group.id, &GroupRecord {
            data: group.clone(), members: Vec::new()
        })?;
        info!("Added group '{}'", group.id);
        Ok(group)
    }

    /// Changes the description of a group.
    pub fn modify_group(
        &self, id: &str, group: GroupData
    ) -> PkiResult<GroupData> {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.get_group(id)?;
        if group.description.is_some() {
            record.data.description = group.description;
        }
        self.groups.store(id, &record)?;
        info!("Modified group '{id}'");
        Ok(record.data)
    }

    pub fn delete_group(&self, id: &str) -> PkiEmptyResult {
        if id == GROUP_ADMINISTRATORS || id == GROUP_AGENTS {
            return Err(Error::GroupBuiltIn(id.to_string()))
        }
        let _lock = self.lock.lock().expect("poisoned lock");
        self.get_group(id)?;
        self.groups.delete(id)?;
        info!("Deleted group '{id}'");
        Ok(())
    }

    pub fn members(&self, id: &str) -> PkiResult<GroupMemberInfos> {
        let record = self.get_group(id)?;
        Ok(GroupMemberInfos {
            total: record.members.len(),
            entries: record.members.into_iter().map(|id| {
                GroupMemberData { id }
            }).collect(),
        })
    }

    pub fn add_member(
        &self, group: &str, user: &str
    ) -> PkiResult<GroupMemberData> {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.get_group(group)?;
        self.get_user(user)?;
        if record.members.iter().any(|member| member == user) {
            return Err(Error::GroupMemberDuplicate(
                group.to_string(), user.to_string()
            ))
        }
        record.members.push(user.to_string());
        self.groups.store(group, &record)?;
        info!("Added user '{user}' to group '{group}'");
        Ok(GroupMemberData { id: user.to_string() })
    }

    pub fn remove_member(&self, group: &str, user: &str) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.get_group(group)?;
        if !record.members.iter().any(|member| member == user) {
            return Err(Error::GroupMemberUnknown(
                group.to_string(), user.to_string()
            ))
        }
        record.members.retain(|member| member != user);
        self.groups.store(group, &record)?;
        info!("Removed user '{user}' from group '{group}'");
        Ok(())
    }

    fn get_group(&self, id: &str) -> PkiResult<GroupRecord> {
        if !GROUP_ID.is_match(id) {
            return Err(Error::GroupUnknown(id.to_string()))
        }
        self.groups.get(id)?.ok_or_else(|| {
            Error::GroupUnknown(id.to_string())
        })
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn manager() -> UserManager {
        let config = Config::test(Path::new("/tmp"), 8443, Token::from("x"));
        UserManager::create(&config).unwrap()
    }

    #[test]
    fn users_and_tokens() {
        let manager = manager();
        let mut user = UserData::new("", "Test User");
        user.user_id = "testuser".into();
        let added = manager.add_user(user.clone()).unwrap();
        assert_eq!(added.id, "testuser");
        assert!(matches!(
            manager.add_user(user), Err(Error::UserDuplicate(_))
        ));
        assert!(matches!(
            manager.add_user(UserData::new("../x", "Bad")),
            Err(Error::UserInvalidId(_))
        ));

        let mut change = UserData::new("testuser", "");
        change.email = Some("test@example.com".into());
        let modified = manager.modify_user("testuser", change).unwrap();
        assert_eq!(modified.full_name, "Test User");
        assert_eq!(modified.email.as_deref(), Some("test@example.com"));

        let first = manager.issue_token("testuser").unwrap();
        assert_eq!(
            manager.authenticate(&first.token).unwrap().as_deref(),
            Some("testuser")
        );
        let second = manager.issue_token("testuser").unwrap();
        assert!(manager.authenticate(&first.token).unwrap().is_none());
        assert!(manager.authenticate(&second.token).unwrap().is_some());

        assert_eq!(manager.list_users(0, None).unwrap().total, 1);
        manager.delete_user("testuser").unwrap();
        assert!(matches!(
            manager.show_user("testuser"), Err(Error::UserUnknown(_))
        ));
    }

    #[test]
    fn groups_and_members() {
        let manager = manager();
        assert_eq!(manager.list_groups(0, None).unwrap().total, 2);
        assert!(matches!(
            manager.delete_group(GROUP_AGENTS), Err(Error::GroupBuiltIn(_))
        ));

        manager.add_user(UserData::new("agent", "Agent")).unwrap();
        manager.add_group(GroupData::new("Auditors", None)).unwrap();
        assert!(matches!(
            manager.add_group(GroupData::new("Auditors", None)),
            Err(Error::GroupDuplicate(_))
        ));
        manager.modify_group(
            "Auditors", GroupData::new("Auditors", Some("Log readers"))
        ).unwrap();
        assert_eq!(
            manager.show_group("Auditors").unwrap().description.as_deref(),
            Some("Log readers")
        );

        manager.add_member(GROUP_AGENTS, "agent").unwrap();
        manager.add_member("Auditors", "agent").unwrap();
        assert!(matches!(
            manager.add_member(GROUP_AGENTS, "agent"),
            Err(Error::GroupMemberDuplicate(_, _))
        ));
        assert!(matches!(
            manager.add_member(GROUP_AGENTS, "nobody"),
            Err(Error::UserUnknown(_))
        ));
        assert!(manager.is_member("agent", GROUP_AGENTS).unwrap());
        assert_eq!(manager.memberships("agent").unwrap().total, 2);

        manager.remove_member("Auditors", "agent").unwrap();
        assert!(matches!(
            manager.remove_member("Auditors", "agent"),
            Err(Error::GroupMemberUnknown(_, _))
        ));

        manager.delete_user("agent").unwrap();
        assert_eq!(manager.members(GROUP_AGENTS).unwrap().total, 0);
        manager.delete_group("Auditors").unwrap();
        assert!(matches!(
            manager.show_group("Auditors"), Err(Error::GroupUnknown(_))
        ));
    }
}
