//! User and group administration through the REST API.

mod common;

use reqwest::StatusCode;
use pki::api::admin::Paging;
use pki::api::user::{GroupData, UserData};
use pki::constants::{GROUP_ADMINISTRATORS, GROUP_AGENTS};
use common::PkiServer;

#[tokio::test]
async fn users_and_groups() {
    let server = PkiServer::start().await;
    let admin = server.client();

    let groups = admin.groups_list(Paging::default()).await.unwrap();
    assert!(groups.entries.iter().any(|g| g.id == GROUP_AGENTS));
    assert!(groups.entries.iter().any(|g| g.id == GROUP_ADMINISTRATORS));

    let mut user = UserData::new("jdoe", "John Doe");
    user.email = Some("jdoe@example.com".into());
    let added = admin.user_add(&user).await.unwrap();
    assert_eq!(added.user_id, "jdoe");
    let err = admin.user_add(&user).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    let mut change = UserData::new("jdoe", "Jane Doe");
    change.email = None;
    let modified = admin.user_modify("jdoe", &change).await.unwrap();
    assert_eq!(modified.full_name, "Jane Doe");
    assert_eq!(
        admin.user_show("jdoe").await.unwrap().full_name, "Jane Doe"
    );
    assert_eq!(
        admin.users_list(Paging::default()).await.unwrap().entries.len(), 1
    );

    admin.group_add(
        &GroupData::new("Auditors", Some("Read the logs"))
    ).await.unwrap();
    admin.group_member_add("Auditors", "jdoe").await.unwrap();
    let err = admin.group_member_add("Auditors", "jdoe").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    let err = admin.group_member_add("Auditors", "nobody").await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let members = admin.group_members("Auditors").await.unwrap();
    assert_eq!(members.entries.len(), 1);
    assert_eq!(members.entries[0].id, "jdoe");
    let memberships = admin.user_memberships("jdoe").await.unwrap();
    assert_eq!(memberships.entries.len(), 1);
    assert_eq!(memberships.entries[0].id, "Auditors");

    // A token authenticates the user but grants no admin rights.
    let token = admin.user_token("jdoe").await.unwrap().token;
    let jdoe = server.client_with(Some(token));
    let err = jdoe.users_list(Paging::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    admin.group_member_add(GROUP_ADMINISTRATORS, "jdoe").await.unwrap();
    assert!(jdoe.users_list(Paging::default()).await.is_ok());
    admin.group_member_remove(GROUP_ADMINISTRATORS, "jdoe").await.unwrap();
    let err = jdoe.users_list(Paging::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    let err = admin.group_delete(GROUP_AGENTS).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    // Deleting a user drops its memberships and its token.
    admin.user_delete("jdoe").await.unwrap();
    assert!(admin.group_members("Auditors").await.unwrap().entries.is_empty());
    let err = jdoe.info().await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    admin.group_delete("Auditors").await.unwrap();
    let err = admin.group_show("Auditors").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}
