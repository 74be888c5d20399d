//! Users and groups.

use std::fmt;
use serde::{Deserialize, Serialize};
use super::admin::Token;


//------------ UserData ------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserData {
    pub id: String,

    #[serde(rename = "UserID")]
    pub user_id: String,

    #[serde(rename = "FullName", default)]
    pub full_name: String,

    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "Phone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl UserData {
    pub fn new(id: &str, full_name: &str) -> Self {
        UserData {
            id: id.to_string(),
            user_id: id.to_string(),
            full_name: full_name.to_string(),
            email: None,
            phone: None,
            state: None,
            user_type: None,
        }
    }

    /// Applies the changeable fields of `other`.
    ///
    /// Fields not set in `other` are kept. An empty full name is ignored.
    pub fn update(&mut self, other: UserData) {
        if !other.full_name.is_empty() {
            self.full_name = other.full_name;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        if other.phone.is_some() {
            self.phone = other.phone;
        }
        if other.state.is_some() {
            self.state = other.state;
        }
        if other.user_type.is_some() {
            self.user_type = other.user_type;
        }
    }
}

impl fmt::Display for UserData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "User ID: {}", self.user_id)?;
        writeln!(f, "Full name: {}", self.full_name)?;
        if let Some(email) = &self.email {
            writeln!(f, "Email: {email}")?;
        }
        if let Some(phone) = &self.phone {
            writeln!(f, "Phone: {phone}")?;
        }
        if let Some(state) = &self.state {
            writeln!(f, "State: {state}")?;
        }
        if let Some(user_type) = &self.user_type {
            writeln!(f, "Type: {user_type}")?;
        }
        Ok(())
    }
}


//------------ UserInfos -----------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<UserData>,
}

impl fmt::Display for UserInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for user in &self.entries {
            writeln!(f)?;
            writeln!(f, "  User ID: {}", user.user_id)?;
            writeln!(f, "  Full name: {}", user.full_name)?;
        }
        Ok(())
    }
}


//------------ GroupData -----------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupData {
    pub id: String,

    #[serde(rename = "GroupID")]
    pub group_id: String,

    #[serde(
        rename = "Description", default, skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl GroupData {
    pub fn new(id: &str, description: Option<&str>) -> Self {
        GroupData {
            id: id.to_string(),
            group_id: id.to_string(),
            description: description.map(ToString::to_string),
        }
    }
}

impl fmt::Display for GroupData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Group ID: {}", self.group_id)?;
        if let Some(description) = &self.description {
            writeln!(f, "Description: {description}")?;
        }
        Ok(())
    }
}


//------------ GroupInfos ----------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<GroupData>,
}

impl fmt::Display for GroupInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for group in &self.entries {
            writeln!(f)?;
            writeln!(f, "  Group ID: {}", group.group_id)?;
            if let Some(description) = &group.description {
                writeln!(f, "  Description: {description}")?;
            }
        }
        Ok(())
    }
}


//------------ GroupMemberData -----------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupMemberData {
    /// The user id of the member.
    pub id: String,
}


//------------ GroupMemberInfos ----------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupMemberInfos {
    pub total: usize,

    #[serde(default)]
    pub entries: Vec<GroupMemberData>,
}

impl fmt::Display for GroupMemberInfos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} entries matched", self.total)?;
        for member in &self.entries {
            writeln!(f, "  User: {}", member.id)?;
        }
        Ok(())
    }
}


//------------ UserToken -----------------------------------------------------

/// A freshly issued token.
///
/// The server only keeps a digest, so this is the only time the token is
/// ever shown.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserToken {
    #[serde(rename = "UserID")]
    pub user_id: String,

    pub token: Token,
}

impl fmt::Display for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "User ID: {}", self.user_id)?;
        writeln!(f, "Token: {}", self.token)
    }
}


//============ Tests =========================================================
