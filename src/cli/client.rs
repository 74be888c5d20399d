//! The client for the REST API of a PKI server.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;
use crate::api::admin::{Paging, ServerInfo, Token};
use crate::api::cert::{CertData, CertDataInfos, CertId, CertQuery, CertRevokeRequest};
use crate::api::profile::{Profile, ProfileDataInfos, RawProfile};
use crate::api::request::{
    CertEnrollmentRequest, CertRequestInfo, CertRequestInfos,
    CertReviewResponse, RequestId, RequestQuery, ReviewAction,
};
use crate::api::status::Success;
use crate::api::user::{
    GroupData, GroupInfos, GroupMemberData, GroupMemberInfos, UserData,
    UserInfos, UserToken,
};
use crate::commons::httpclient::{self, Error};
use crate::constants::REST_BASE;


/// The characters escaped in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'/').add(b'<')
    .add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');


//------------ PkiClient -----------------------------------------------------

/// A client for a PKI server.
#[derive(Clone, Debug)]
pub struct PkiClient {
    /// The base URI of the server.
    server: Url,

    /// The token to authenticate with, if any.
    token: Option<Token>,
}

impl PkiClient {
    pub fn new(server: Url, token: Option<Token>) -> Self {
        PkiClient { server, token }
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Creates the URI for a path below the server root.
    fn uri(&self, path: &[&str], query: Option<String>) -> String {
        let mut res = self.server.as_str().trim_end_matches('/').to_string();
        for segment in path {
            res.push('/');
            res.extend(utf8_percent_encode(segment, SEGMENT));
        }
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            res.push('?');
            res.push_str(&query);
        }
        res
    }

    /// Creates the URI for a path below the REST base.
    fn rest_uri(&self, path: &[&str], query: Option<String>) -> String {
        let mut full: Vec<&str> = REST_BASE.split('/').collect();
        full.extend_from_slice(path);
        self.uri(&full, query)
    }
}


/// # Server
impl PkiClient {
    pub async fn health(&self) -> Result<Success, Error> {
        httpclient::get_ok(&self.uri(&["health"], None), self.token()).await?;
        Ok(Success)
    }

    pub async fn info(&self) -> Result<ServerInfo, Error> {
        httpclient::get_json(
            &self.rest_uri(&["info"], None), self.token()
        ).await
    }
}


/// # Profiles
impl PkiClient {
    pub async fn profiles_list(
        &self, paging: Paging
    ) -> Result<ProfileDataInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["profiles"], Some(paging.to_query())),
            self.token()
        ).await
    }

    pub async fn profile_show(&self, id: &str) -> Result<Profile, Error> {
        httpclient::get_json(
            &self.rest_uri(&["profiles", id], None), self.token()
        ).await
    }

    pub async fn profile_show_raw(
        &self, id: &str
    ) -> Result<RawProfile, Error> {
        httpclient::get_json(
            &self.rest_uri(&["profiles", id, "raw"], None), self.token()
        ).await
    }

    pub async fn profile_add(
        &self, profile: &Profile
    ) -> Result<Profile, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["profiles"], None), profile, self.token()
        ).await
    }

    pub async fn profile_add_raw(
        &self, raw: &RawProfile
    ) -> Result<RawProfile, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["profiles", "raw"], None), raw, self.token()
        ).await
    }

    pub async fn profile_modify(
        &self, id: &str, profile: &Profile
    ) -> Result<Profile, Error> {
        httpclient::put_json_with_response(
            &self.rest_uri(&["profiles", id], None), profile, self.token()
        ).await
    }

    pub async fn profile_modify_raw(
        &self, id: &str, raw: &RawProfile
    ) -> Result<RawProfile, Error> {
        httpclient::put_json_with_response(
            &self.rest_uri(&["profiles", id, "raw"], None), raw, self.token()
        ).await
    }

    pub async fn profile_enable(&self, id: &str) -> Result<Success, Error> {
        self.profile_action(id, "enable").await
    }

    pub async fn profile_disable(&self, id: &str) -> Result<Success, Error> {
        self.profile_action(id, "disable").await
    }

    async fn profile_action(
        &self, id: &str, action: &str
    ) -> Result<Success, Error> {
        httpclient::post_empty(
            &self.rest_uri(
                &["profiles", id], Some(format!("action={action}"))
            ),
            self.token()
        ).await?;
        Ok(Success)
    }

    pub async fn profile_delete(&self, id: &str) -> Result<Success, Error> {
        httpclient::delete(
            &self.rest_uri(&["profiles", id], None), self.token()
        ).await?;
        Ok(Success)
    }
}


/// # Certificate requests
impl PkiClient {
    pub async fn request_template(
        &self, profile: &str
    ) -> Result<CertEnrollmentRequest, Error> {
        httpclient::get_json(
            &self.rest_uri(&["certrequests", "profiles", profile], None),
            self.token()
        ).await
    }

    pub async fn request_submit(
        &self, request: &CertEnrollmentRequest
    ) -> Result<CertRequestInfos, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["certrequests"], None), request, self.token()
        ).await
    }

    pub async fn request_show(
        &self, id: RequestId
    ) -> Result<CertRequestInfo, Error> {
        httpclient::get_json(
            &self.rest_uri(&["certrequests", &id.to_string()], None),
            self.token()
        ).await
    }

    pub async fn requests_list(
        &self, query: &RequestQuery
    ) -> Result<CertRequestInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(
                &["agent", "certrequests"], Some(query.to_query())
            ),
            self.token()
        ).await
    }

    pub async fn request_review(
        &self, id: RequestId
    ) -> Result<CertReviewResponse, Error> {
        httpclient::get_json(
            &self.rest_uri(&["agent", "certrequests", &id.to_string()], None),
            self.token()
        ).await
    }

    pub async fn request_review_action(
        &self,
        id: RequestId,
        action: ReviewAction,
        review: &CertReviewResponse,
    ) -> Result<CertRequestInfo, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(
                &["agent", "certrequests", &id.to_string(), action.as_str()],
                None
            ),
            review,
            self.token()
        ).await
    }
}


/// # Certificates
impl PkiClient {
    pub async fn certs_list(
        &self, query: &CertQuery
    ) -> Result<CertDataInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["certs"], Some(query.to_query())), self.token()
        ).await
    }

    pub async fn cert_show(&self, id: CertId) -> Result<CertData, Error> {
        httpclient::get_json(
            &self.rest_uri(&["certs", &id.to_string()], None), self.token()
        ).await
    }

    pub async fn cert_revoke(
        &self, id: CertId, revocation: &CertRevokeRequest
    ) -> Result<CertRequestInfo, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(
                &["agent", "certs", &id.to_string(), "revoke"], None
            ),
            revocation,
            self.token()
        ).await
    }

    pub async fn cert_unrevoke(
        &self, id: CertId
    ) -> Result<CertRequestInfo, Error> {
        httpclient::post_empty_with_response(
            &self.rest_uri(
                &["agent", "certs", &id.to_string(), "unrevoke"], None
            ),
            self.token()
        ).await
    }
}


/// # Users
impl PkiClient {
    pub async fn users_list(&self, paging: Paging) -> Result<UserInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "users"], Some(paging.to_query())),
            self.token()
        ).await
    }

    pub async fn user_show(&self, id: &str) -> Result<UserData, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "users", id], None), self.token()
        ).await
    }

    pub async fn user_add(&self, user: &UserData) -> Result<UserData, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["admin", "users"], None), user, self.token()
        ).await
    }

    pub async fn user_modify(
        &self, id: &str, user: &UserData
    ) -> Result<UserData, Error> {
        httpclient::put_json_with_response(
            &self.rest_uri(&["admin", "users", id], None), user, self.token()
        ).await
    }

    pub async fn user_delete(&self, id: &str) -> Result<Success, Error> {
        httpclient::delete(
            &self.rest_uri(&["admin", "users", id], None), self.token()
        ).await?;
        Ok(Success)
    }

    pub async fn user_token(&self, id: &str) -> Result<UserToken, Error> {
        httpclient::post_empty_with_response(
            &self.rest_uri(&["admin", "users", id, "token"], None),
            self.token()
        ).await
    }

    pub async fn user_memberships(
        &self, id: &str
    ) -> Result<GroupInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "users", id, "memberships"], None),
            self.token()
        ).await
    }
}


/// # Groups
impl PkiClient {
    pub async fn groups_list(
        &self, paging: Paging
    ) -> Result<GroupInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "groups"], Some(paging.to_query())),
            self.token()
        ).await
    }

    pub async fn group_show(&self, id: &str) -> Result<GroupData, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "groups", id], None), self.token()
        ).await
    }

    pub async fn group_add(
        &self, group: &GroupData
    ) -> Result<GroupData, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["admin", "groups"], None), group, self.token()
        ).await
    }

    pub async fn group_modify(
        &self, id: &str, group: &GroupData
    ) -> Result<GroupData, Error> {
        httpclient::put_json_with_response(
            &self.rest_uri(&["admin", "groups", id], None),
            group,
            self.token()
        ).await
    }

    pub async fn group_delete(&self, id: &str) -> Result<Success, Error> {
        httpclient::delete(
            &self.rest_uri(&["admin", "groups", id], None), self.token()
        ).await?;
        Ok(Success)
    }

    pub async fn group_members(
        &self, id: &str
    ) -> Result<GroupMemberInfos, Error> {
        httpclient::get_json(
            &self.rest_uri(&["admin", "groups", id, "members"], None),
            self.token()
        ).await
    }

    pub async fn group_member_add(
        &self, id: &str, user: &str
    ) -> Result<GroupMemberData, Error> {
        httpclient::post_json_with_response(
            &self.rest_uri(&["admin", "groups", id, "members"], None),
            GroupMemberData { id: user.to_string() },
            self.token()
        ).await
    }

    pub async fn group_member_remove(
        &self, id: &str, user: &str
    ) -> Result<Success, Error> {
        httpclient::delete(
            &self.rest_uri(&["admin", "groups", id, "members", user], None),
            self.token()
        ).await?;
        Ok(Success)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_uris() {
        let client = PkiClient::new(
            Url::parse("https://localhost:8443/").unwrap(), None
        );
        assert_eq!(
            client.rest_uri(&["admin", "groups", "Certificate Manager Agents"], None),
            "https://localhost:8443/ca/rest/admin/groups/Certificate%20Manager%20Agents"
        );
        assert_eq!(
            client.rest_uri(&["profiles"], Some("start=2".into())),
            "https://localhost:8443/ca/rest/profiles?start=2"
        );
        assert_eq!(
            client.rest_uri(&["profiles"], Some(String::new())),
            "https://localhost:8443/ca/rest/profiles"
        );
        assert_eq!(
            client.uri(&["health"], None), "https://localhost:8443/health"
        );

        // Slashes inside a segment stay escaped.
        assert_eq!(
            client.rest_uri(&["admin", "users", "a/b"], None),
            "https://localhost:8443/ca/rest/admin/users/a%2Fb"
        );
    }
}
