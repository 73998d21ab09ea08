//! The HTTP registry client against a mock registry.

use kiln_cli::core::KilnError;
use kiln_cli::credentials::Credentials;
use kiln_cli::registry::{HttpRegistryClient, RegistryClient};
use kiln_cli::test_utils::tar_gz_bytes;
use mockito::Matcher;
use serde_json::json;
use tempfile::TempDir;

fn credentials() -> Credentials {
    Credentials::new("dev@kiln.example", "hunter2")
}

fn kiln_error(err: &anyhow::Error) -> Option<&KilnError> {
    err.chain().find_map(|cause| cause.downcast_ref::<KilnError>())
}

#[tokio::test]
async fn test_get_package_streams_archive_to_disk() {
    let mut server = mockito::Server::new_async().await;
    let archive = tar_gz_bytes(&[("kiln.json", b"{}".as_slice())]);
    let mock = server
        .mock("POST", "/getPackage")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "identity": "dev@kiln.example",
            "secret": "hunter2",
            "protocolVersion": "0.1.0",
            "payload": "widgets"
        })))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(&archive)
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("package.tgz");
    let client = HttpRegistryClient::new(server.url()).unwrap();

    let size = client.fetch_archive(&credentials(), "widgets", &destination).await.unwrap();

    mock.assert_async().await;
    assert_eq!(size, archive.len() as u64);
    assert_eq!(std::fs::read(&destination).unwrap(), archive);
}

#[tokio::test]
async fn test_error_body_with_success_status_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/getPackage")
        .with_status(200)
        .with_body("Error: package 'widgets' does not exist")
        .create_async()
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("package.tgz");
    let client = HttpRegistryClient::new(server.url()).unwrap();

    let err = client.fetch_archive(&credentials(), "widgets", &destination).await.unwrap_err();

    match kiln_error(&err) {
        Some(KilnError::RegistryError {
            body,
            ..
        }) => assert!(body.contains("does not exist")),
        other => panic!("expected RegistryError, got {other:?}"),
    }
    assert!(kiln_error(&err).is_some_and(KilnError::is_network));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_server_error_status_is_network_error() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/getPackage").with_status(500).with_body("boom").create_async().await;

    let temp = TempDir::new().unwrap();
    let client = HttpRegistryClient::new(server.url()).unwrap();

    let err = client
        .fetch_archive(&credentials(), "widgets", &temp.path().join("package.tgz"))
        .await
        .unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::NetworkError { .. })));
}

#[tokio::test]
async fn test_unreachable_registry_is_network_error() {
    // Nothing listens on the discard port
    let client = HttpRegistryClient::new("http://127.0.0.1:9").unwrap();
    let temp = TempDir::new().unwrap();

    let err = client
        .fetch_archive(&credentials(), "widgets", &temp.path().join("package.tgz"))
        .await
        .unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::NetworkError { .. })));
}

#[tokio::test]
async fn test_publish_sends_multipart_envelope_and_archive() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/publish")
        .match_header("content-type", Matcher::Regex("^multipart/form-data".to_string()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="envelope""#.to_string()),
            Matcher::Regex(r#""protocolVersion":"0.1.0""#.to_string()),
            Matcher::Regex(r#"name="archive"; filename="package.tgz""#.to_string()),
        ]))
        .with_status(200)
        .with_body("Published widgets")
        .create_async()
        .await;

    let client = HttpRegistryClient::new(format!("{}/", server.url())).unwrap();
    let response = client
        .publish(&credentials(), &json!({"name": "widgets"}), b"archive-bytes".to_vec())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response, "Published widgets");
}

#[tokio::test]
async fn test_signup_and_define() {
    let mut server = mockito::Server::new_async().await;
    let signup = server
        .mock("POST", "/signup")
        .match_body(Matcher::PartialJson(json!({"identity": "dev@kiln.example", "payload": {}})))
        .with_body("Account created")
        .create_async()
        .await;
    let define = server
        .mock("POST", "/define")
        .match_body(Matcher::PartialJson(json!({"payload": {"name": "widgets"}})))
        .with_body("Error: widgets is already defined")
        .create_async()
        .await;

    let client = HttpRegistryClient::new(server.url()).unwrap();

    assert_eq!(client.create_account(&credentials()).await.unwrap(), "Account created");
    let err = client.define(&credentials(), &json!({"name": "widgets"})).await.unwrap_err();
    assert!(matches!(kiln_error(&err), Some(KilnError::RegistryError { .. })));

    signup.assert_async().await;
    define.assert_async().await;
}
