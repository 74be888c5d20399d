//! Profile management through the REST API.

mod common;

use reqwest::StatusCode;
use pki::api::admin::Paging;
use pki::api::profile::RawProfile;
use pki::api::request::RequestStatus;
use common::{PkiServer, enrollment};

#[tokio::test]
async fn profile_lifecycle() {
    let server = PkiServer::start().await;
    let admin = server.client();
    let anon = server.anonymous();

    let listed = anon.profiles_list(Paging::default()).await.unwrap();
    assert!(listed.entries.iter().any(|p| p.id == "caUserCert"));
    let paged = anon.profiles_list(
        Paging { start: 1, size: Some(1) }
    ).await.unwrap();
    assert_eq!(paged.total, listed.total);
    assert_eq!(paged.entries.len(), 1);
    assert_eq!(paged.entries[0].id, listed.entries[1].id);

    // Derive a new profile from the raw form of an existing one.
    let raw = admin.profile_show_raw("caUserCert").await.unwrap();
    let content = raw.content
        .replace("profileId=caUserCert", "profileId=testUserCert")
        .replace("enable=true", "enable=false");
    let added = admin.profile_add_raw(
        &RawProfile { content: content.clone() }
    ).await.unwrap();
    assert!(added.content.contains("profileId=testUserCert"));
    assert!(added.content.contains("enable=false"));

    let err = admin.profile_add_raw(&RawProfile { content }).await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    // Disabled profiles are hidden from anonymous callers.
    let err = anon.profile_show("testUserCert").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    let err = anon.request_template("testUserCert").await.unwrap_err();
    assert!(err.status().is_some());
    assert!(!admin.profile_show("testUserCert").await.unwrap().enabled);

    let mut profile = admin.profile_show("testUserCert").await.unwrap();
    profile.description = Some("For testing".into());
    let modified = admin.profile_modify("testUserCert", &profile).await
        .unwrap();
    assert_eq!(modified.description.as_deref(), Some("For testing"));

    admin.profile_enable("testUserCert").await.unwrap();
    let profile = anon.profile_show("testUserCert").await.unwrap();
    assert!(profile.enabled);
    assert_eq!(profile.enabled_by.as_deref(), Some("admin"));

    let err = admin.profile_modify("testUserCert", &profile).await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    let err = admin.profile_delete("testUserCert").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    let request = enrollment(
        &anon, "testUserCert", "UID=tester,O=EXAMPLE"
    ).await;
    let info = anon.request_submit(&request).await.unwrap()
        .entries.remove(0);
    assert_eq!(info.status, RequestStatus::Pending);

    admin.profile_disable("testUserCert").await.unwrap();
    let err = anon.request_submit(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    admin.profile_delete("testUserCert").await.unwrap();
    let err = admin.profile_show("testUserCert").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn profile_management_needs_admin() {
    let server = PkiServer::start().await;
    let anon = server.anonymous();

    let err = anon.profile_disable("caUserCert").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    let raw = server.client().profile_show_raw("caUserCert").await.unwrap();
    let err = anon.profile_add_raw(&raw).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}
