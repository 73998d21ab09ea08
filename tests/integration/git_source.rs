//! Builds of packages cloned from git repositories.

use kiln_cli::config::BuildConfig;
use kiln_cli::core::KilnError;
use kiln_cli::git::is_git_installed;
use kiln_cli::test_utils::bare_repository;
use serde_json::json;

use crate::common::TestBuild;

#[tokio::test]
async fn test_build_from_bare_repository() {
    if !is_git_installed() {
        return;
    }
    let test = TestBuild::new();
    let repos = test.temp.path().join("repos");
    let url = bare_repository(
        &repos,
        "landing",
        &json!({"files": [
            {"from": "templates/index.html", "to": "index.html", "method": "render"},
            {"from": "static/robots.txt", "to": "robots.txt", "method": "copy"}
        ]}),
        &[
            ("templates/index.html", b"<title><%= title %></title>".as_slice()),
            ("static/robots.txt", b"User-agent: *\n".as_slice()),
        ],
    )
    .unwrap();

    let summary = test
        .builder()
        .build(&url, &BuildConfig::from_value(json!({"title": "Launch"})))
        .await
        .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(test.read_output("index.html"), "<title>Launch</title>");
    assert_eq!(test.read_output("robots.txt"), "User-agent: *\n");
    assert!(test.registry.fetches().is_empty());
    assert_eq!(test.provider.calls(), 0);
    assert!(test.leftover_trees().is_empty());
}

#[tokio::test]
async fn test_registry_package_with_git_dependency() {
    if !is_git_installed() {
        return;
    }
    let test = TestBuild::new();
    let repos = test.temp.path().join("repos");
    let url = bare_repository(
        &repos,
        "icons",
        &json!({"files": [{"from": "icon.svg", "to": "icons/icon.svg", "method": "copy"}]}),
        &[("icon.svg", b"<svg/>".as_slice())],
    )
    .unwrap();
    let mut dependencies = serde_json::Map::new();
    dependencies.insert(url.clone(), json!({}));
    test.publish("app", json!({ "dependencies": dependencies }), &[]);

    let summary = test.builder().build("app", &BuildConfig::default()).await.unwrap();

    assert_eq!(summary.packages, 2);
    assert_eq!(test.read_output("icons/icon.svg"), "<svg/>");
    assert_eq!(test.registry.fetched_names(), vec!["app"]);
    assert!(test.leftover_trees().is_empty());
}

#[tokio::test]
async fn test_unreachable_repository_fails_clone_and_cleans_up() {
    if !is_git_installed() {
        return;
    }
    let test = TestBuild::new();
    let missing = format!("file://{}/absent.git", test.temp.path().display());

    let err = test.builder().build(&missing, &BuildConfig::default()).await.unwrap_err();

    assert!(matches!(
        err.chain().find_map(|cause| cause.downcast_ref::<KilnError>()),
        Some(KilnError::GitCloneFailed { .. })
    ));
    assert!(test.leftover_trees().is_empty());
}
