//! Running client commands against a server.

mod common;

use clap::Parser;
use pki::api::request::{CertRequestInfo, CertRequestInfos, RequestStatus};
use pki::cli::options::Options;
use pki::commons::file;
use common::{ADMIN_TOKEN, PkiServer, make_csr};

/// Runs a command, returning its exit code, output and error output.
async fn run(server: &PkiServer, args: &[&str]) -> (i32, String, String) {
    let server_uri = server.client().server().to_string();
    let mut full = vec![
        "pkic", "-s", server_uri.as_str(), "-t", ADMIN_TOKEN, "-f", "json",
    ];
    full.extend_from_slice(args);
    let options = Options::try_parse_from(full).unwrap();
    let client = options.client();
    let format = options.general.format;
    let report = options.command.run(&client).await;
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let code = report.write(format, &mut out, &mut err);
    (
        code,
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

#[tokio::test]
async fn submit_approve_show() {
    let server = PkiServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let csr = dir.path().join("server.csr");
    file::save(make_csr("CN=www.example.com").as_bytes(), &csr).unwrap();

    let (code, out, _) = run(&server, &[
        "request", "submit", "--profile", "caServerCert",
        "--csr", csr.to_str().unwrap(),
    ]).await;
    assert_eq!(code, 0);
    let infos: CertRequestInfos = serde_json::from_str(&out).unwrap();
    let id = infos.entries[0].id.to_string();
    assert_eq!(infos.entries[0].status, RequestStatus::Pending);

    let (code, out, _) = run(
        &server, &["request", "review", &id, "--action", "approve"]
    ).await;
    assert_eq!(code, 0);
    let info: CertRequestInfo = serde_json::from_str(&out).unwrap();
    assert_eq!(info.status, RequestStatus::Approved);
    let serial = info.cert_id.unwrap().to_string();

    let (code, out, _) = run(&server, &["cert", "show", &serial, "--pem"]).await;
    assert_eq!(code, 0);
    assert!(out.contains("BEGIN CERTIFICATE"));

    let (code, _, err) = run(&server, &["profile", "show", "noSuchProfile"]).await;
    assert_eq!(code, 1);
    assert!(err.starts_with("Error: "));
}
