//! Full builds against an in-memory registry.

use anyhow::Result;
use kiln_cli::config::BuildConfig;
use kiln_cli::core::KilnError;
use kiln_cli::scripts::{ScriptContext, ScriptExecutor};
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::{TestBuild, tree_of};

fn kiln_error(err: &anyhow::Error) -> Option<&KilnError> {
    err.chain().find_map(|cause| cause.downcast_ref::<KilnError>())
}

#[tokio::test]
async fn test_dependencies_build_depth_first_and_sequentially() {
    let test = TestBuild::new();
    test.publish("app", json!({"dependencies": {"lib-a": {}, "lib-b": {}}}), &[]);
    test.publish("lib-a", json!({"dependencies": {"lib-a1": {}}}), &[]);
    test.publish("lib-a1", json!({}), &[]);
    test.publish("lib-b", json!({}), &[]);

    let summary = test.builder().build("app", &BuildConfig::from_value(json!({}))).await.unwrap();

    assert_eq!(summary.packages, 4);
    assert_eq!(test.registry.fetched_names(), vec!["app", "lib-a", "lib-a1", "lib-b"]);

    let fetches = test.registry.fetches();
    let app_tree = tree_of(&fetches[0].destination);
    let a_tree = tree_of(&fetches[1].destination);

    // lib-a1 is fetched while app and lib-a are still being built
    assert_eq!(fetches[2].live_trees, vec![app_tree.clone(), a_tree.clone()]);
    // lib-b only starts after lib-a and its dependency have been released
    assert_eq!(fetches[3].live_trees, vec![app_tree.clone()]);

    assert!(a_tree.starts_with(app_tree.join("deps")));
    assert!(test.leftover_trees().is_empty());
}

#[tokio::test]
async fn test_dependency_outputs_precede_parent_transforms() {
    let test = TestBuild::new();
    test.publish(
        "app",
        json!({
            "dependencies": {"theme": {"accent": "teal"}},
            "files": [{"from": "page.html", "to": "page.html", "method": "render"}]
        }),
        &[("page.html", b"<body class=\"<%= layout %>\">".as_slice())],
    );
    test.publish(
        "theme",
        json!({"files": [
            {"from": "theme.css", "to": "css/theme.css", "method": "render"},
            {"from": "font.woff", "to": "css/font.woff", "method": "copy"}
        ]}),
        &[
            ("theme.css", b"a { color: <%= accent %>; }".as_slice()),
            ("font.woff", b"\x00\x01\x02\xff".as_slice()),
        ],
    );

    let summary = test
        .builder()
        .build("app", &BuildConfig::from_value(json!({"layout": "wide"})))
        .await
        .unwrap();

    assert_eq!(summary.files, 3);
    assert_eq!(test.read_output("page.html"), "<body class=\"wide\">");
    assert_eq!(test.read_output("css/theme.css"), "a { color: teal; }");
    assert_eq!(std::fs::read(test.output_dir().join("css/font.woff")).unwrap(), b"\x00\x01\x02\xff");
}

#[tokio::test]
async fn test_credentials_prompted_once_per_process() {
    let test = TestBuild::new();
    test.publish("app", json!({"dependencies": {"one": {}, "two": {}}}), &[]);
    test.publish("one", json!({}), &[]);
    test.publish("two", json!({}), &[]);

    let builder = test.builder();
    builder.build("app", &BuildConfig::default()).await.unwrap();
    builder.build("one", &BuildConfig::default()).await.unwrap();

    assert_eq!(test.provider.calls(), 1);
    assert_eq!(test.registry.fetches().len(), 4);
}

#[tokio::test]
async fn test_render_failure_keeps_outputs_and_releases_tree() {
    let test = TestBuild::new().with_max_parallel(1);
    test.publish(
        "app",
        json!({"files": [
            {"from": "first.txt", "to": "first.txt", "method": "copy"},
            {"from": "broken.txt", "to": "broken.txt", "method": "render"}
        ]}),
        &[("first.txt", b"kept".as_slice()), ("broken.txt", b"<%= nope %>".as_slice())],
    );

    let err = test.builder().build("app", &BuildConfig::from_value(json!({}))).await.unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::TemplateRenderError { .. })));
    assert_eq!(test.read_output("first.txt"), "kept");
    assert!(!test.output_dir().join("broken.txt").exists());
    assert!(test.leftover_trees().is_empty());
}

#[tokio::test]
async fn test_nested_failure_aborts_parent_and_later_siblings() {
    let test = TestBuild::new();
    test.publish(
        "app",
        json!({
            "dependencies": {"good": {}, "bad": {}, "never": {}},
            "files": [{"from": "index.html", "to": "index.html", "method": "copy"}]
        }),
        &[("index.html", b"root".as_slice())],
    );
    test.publish("good", json!({}), &[]);
    test.publish("never", json!({}), &[]);
    test.registry.add_error("bad", "Error: package 'bad' is quarantined");

    let err = test.builder().build("app", &BuildConfig::default()).await.unwrap_err();

    assert!(format!("{err:#}").contains("Failed to build dependency 'bad'"));
    assert!(matches!(kiln_error(&err), Some(KilnError::RegistryError { .. })));
    assert_eq!(test.registry.fetched_names(), vec!["app", "good", "bad"]);
    assert!(!test.output_dir().join("index.html").exists());
    assert!(test.leftover_trees().is_empty());
}

#[tokio::test]
async fn test_missing_definition_is_parse_error() {
    let test = TestBuild::new();
    test.registry.add_package(
        "loose",
        kiln_cli::test_utils::tar_gz_bytes(&[("index.html", b"<p>".as_slice())]),
    );

    let err = test.builder().build("loose", &BuildConfig::default()).await.unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::DefinitionParseError { .. })));
    assert!(test.leftover_trees().is_empty());
}

#[derive(Default)]
struct RecordingExecutor {
    runs: Mutex<Vec<(String, serde_json::Value)>>,
}

impl ScriptExecutor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        script: &'a Path,
        context: &'a ScriptContext,
        config: &'a BuildConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            assert!(script.starts_with(&context.source_dir));
            let name = script.file_name().unwrap().to_string_lossy().to_string();
            self.runs.lock().unwrap().push((name, config.as_value().clone()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_scripts_run_in_build_order_with_package_config() {
    let executor = Arc::new(RecordingExecutor::default());
    let test = TestBuild::new().with_executor(executor.clone());
    test.publish(
        "app",
        json!({"dependencies": {"dep": {"level": 2}}, "scripts": ["one.sh", "two.sh"]}),
        &[("one.sh", b"true".as_slice()), ("two.sh", b"true".as_slice())],
    );
    test.publish("dep", json!({"scripts": ["dep.sh"]}), &[("dep.sh", b"true".as_slice())]);

    let summary =
        test.builder().build("app", &BuildConfig::from_value(json!({"level": 1}))).await.unwrap();

    assert_eq!(summary.scripts, 3);
    assert_eq!(
        *executor.runs.lock().unwrap(),
        vec![
            ("dep.sh".to_string(), json!({"level": 2})),
            ("one.sh".to_string(), json!({"level": 1})),
            ("two.sh".to_string(), json!({"level": 1})),
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_scripts_see_outputs() {
    let test = TestBuild::new();
    test.publish(
        "app",
        json!({
            "files": [{"from": "greeting.txt", "to": "greeting.txt", "method": "render"}],
            "scripts": ["scripts/stamp.sh"]
        }),
        &[
            ("greeting.txt", b"Hello <%= name %>".as_slice()),
            (
                "scripts/stamp.sh",
                b"cat \"$KILN_DEST_DIR/greeting.txt\" > \"$KILN_DEST_DIR/stamped.txt\"\n".as_slice(),
            ),
        ],
    );

    test.builder().build("app", &BuildConfig::from_value(json!({"name": "World"}))).await.unwrap();

    assert_eq!(test.read_output("greeting.txt"), "Hello World");
    assert_eq!(test.read_output("stamped.txt"), "Hello World");
}

#[tokio::test]
async fn test_cancelled_before_start_allocates_nothing() {
    let test = TestBuild::new();
    test.publish("app", json!({}), &[]);
    test.cancel.cancel();

    let err = test.builder().build("app", &BuildConfig::default()).await.unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::Cancelled)));
    assert!(test.registry.fetches().is_empty());
    assert!(test.leftover_trees().is_empty());
}

/// Cancels the build and then hangs, as a long-running script would.
struct CancellingExecutor {
    cancel: CancellationToken,
}

impl ScriptExecutor for CancellingExecutor {
    fn execute<'a>(
        &'a self,
        _script: &'a Path,
        _context: &'a ScriptContext,
        _config: &'a BuildConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.cancel.cancel();
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_cancellation_mid_build_releases_every_tree() {
    let mut test = TestBuild::new();
    let executor = Arc::new(CancellingExecutor {
        cancel: test.cancel.clone(),
    });
    test = test.with_executor(executor);
    test.publish("app", json!({"dependencies": {"dep": {}}}), &[]);
    test.publish("dep", json!({"scripts": ["slow.sh"]}), &[("slow.sh", b"sleep 60".as_slice())]);

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        test.builder().build("app", &BuildConfig::default()),
    )
    .await
    .expect("cancellation should interrupt the build")
    .unwrap_err();

    assert!(matches!(kiln_error(&err), Some(KilnError::Cancelled)));
    assert!(test.leftover_trees().is_empty());
}
