use super::*;
use crate::core::clock::tests::ManualClock;
use crate::core::config::{ConfigPatch, ConfigStore, EnvOverrides};
use crate::core::pdf::PopplerInspector;
use crate::core::upload::tests::FakeRemote;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    remote: Arc<FakeRemote>,
    config: Arc<ConfigStore>,
    dispatcher: Dispatcher,
}

async fn harness_with(remote: FakeRemote, patch: Option<ConfigPatch>) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let config = Arc::new(ConfigStore::new(
        dir.path().join("config.toml"),
        EnvOverrides::default(),
    ));
    if let Some(patch) = patch {
        config.update(&patch).await.expect("configure");
    }
    let clock = Arc::new(ManualClock::new());
    let remote = Arc::new(remote);
    let ctx = ToolContext::new(config.clone(), remote.clone(), Arc::new(PopplerInspector));
    let dispatcher = Dispatcher::new(ctx, Arc::new(FailureTracker::new(clock.clone())));
    Harness {
        _dir: dir,
        clock,
        remote,
        config,
        dispatcher,
    }
}

fn full_config() -> ConfigPatch {
    ConfigPatch {
        api_key: Some("key-1234".to_string()),
        organization_id: Some("org-1".to_string()),
        user_id: Some("user-1".to_string()),
        ..Default::default()
    }
}

fn args(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn text_of(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::TextContent(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn unknown_operation_is_an_error_result() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;
    let result = h.dispatcher.invoke("drop_tables", None).await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("Unknown operation: drop_tables"));
}

#[tokio::test]
async fn unconfigured_server_only_allows_config_tools() {
    let h = harness_with(FakeRemote::default(), None).await;

    let result = h
        .dispatcher
        .invoke("upload_file", args(json!({"filePath": "/tmp/a.txt"})))
        .await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("config_set"));
    assert!(h.remote.calls().is_empty());

    let result = h.dispatcher.invoke("config_get", None).await;
    assert_eq!(result.is_error, Some(false));
    assert!(text_of(&result).contains("API Key: (not set)"));
}

#[tokio::test]
async fn missing_organization_id_names_the_field() {
    let h = harness_with(
        FakeRemote::default(),
        Some(ConfigPatch {
            api_key: Some("key-1234".to_string()),
            ..Default::default()
        }),
    )
    .await;

    let result = h.dispatcher.invoke("list_organization_logos", None).await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("'organizationId'"));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn theme_update_without_organization_id_names_the_field() {
    let h = harness_with(
        FakeRemote::default(),
        Some(ConfigPatch {
            api_key: Some("key-1234".to_string()),
            ..Default::default()
        }),
    )
    .await;

    let result = h
        .dispatcher
        .invoke(
            "update_organization_theme",
            args(json!({"browserTabTitle": "x"})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("Missing required field 'organizationId'"));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn placeholder_identifiers_are_rejected_before_any_remote_call() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;

    let result = h
        .dispatcher
        .invoke(
            "upload_file",
            args(json!({"filePath": "/tmp/a.txt", "objectId": "your_org_id_here"})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));
    let text = text_of(&result);
    assert!(text.contains("Omit objectId"));
    assert!(h.remote.calls().is_empty());
    assert_eq!(
        h.dispatcher.tracker().snapshot("upload_file").map(|r| r.count),
        Some(1)
    );
}

#[tokio::test]
async fn third_invalid_call_reports_a_loop_and_success_resets() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;

    for _ in 0..2 {
        let result = h.dispatcher.invoke("view_pdf", None).await;
        assert!(text_of(&result).contains("Validation error for view_pdf"));
        h.clock.advance(Duration::from_secs(20));
    }
    let result = h.dispatcher.invoke("view_pdf", None).await;
    assert_eq!(result.is_error, Some(true));
    let text = text_of(&result);
    assert!(text.contains("Loop detected"));
    assert!(text.contains("Stop retrying"));
    // The recorded schema violation is carried into the loop report.
    let (_, history) = text.split_once("Recent errors:").expect("history section");
    assert!(history.contains("filePath"), "{text}");

    // Another operation's streak is untouched.
    assert!(h.dispatcher.tracker().snapshot("upload_file").is_none());

    // A call that passes validation clears the record even if the handler fails.
    let result = h
        .dispatcher
        .invoke("view_pdf", args(json!({"filePath": "/definitely/missing.pdf"})))
        .await;
    assert!(text_of(&result).contains("PDF file not found"));
    assert!(h.dispatcher.tracker().snapshot("view_pdf").is_none());
}

#[tokio::test]
async fn failures_spread_beyond_the_window_do_not_escalate() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;
    h.dispatcher.invoke("view_pdf", None).await;
    h.clock.advance(Duration::from_secs(6 * 60));
    h.dispatcher.invoke("view_pdf", None).await;
    h.clock.advance(Duration::from_secs(6 * 60));
    let result = h.dispatcher.invoke("view_pdf", None).await;
    assert!(!text_of(&result).contains("Loop detected"));
    assert_eq!(
        h.dispatcher.tracker().snapshot("view_pdf").map(|r| r.count),
        Some(1)
    );
}

#[tokio::test]
async fn misplaced_theme_fields_count_as_validation_failures() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;
    let result = h
        .dispatcher
        .invoke(
            "update_organization_theme",
            args(json!({"theme": {"primaryColor": "#112233"}})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("themeTokens.ref.palette.primary50"));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn schema_defaults_reach_the_handler() {
    let h = harness_with(FakeRemote::default(), Some(full_config())).await;
    let result = h.dispatcher.invoke("list_organization_logos", None).await;
    assert_eq!(result.is_error, Some(false));
    assert_eq!(h.remote.calls(), vec!["list:org-1:10".to_string()]);
}

#[tokio::test]
async fn logo_link_failure_still_reports_success() {
    let h = harness_with(
        FakeRemote {
            fail_update: true,
            ..Default::default()
        },
        Some(full_config()),
    )
    .await;
    let logo = h._dir.path().join("logo.png");
    std::fs::write(&logo, b"png").expect("write");

    let result = h
        .dispatcher
        .invoke(
            "update_organization_theme",
            args(json!({"logoFile": {"filePath": logo.display().to_string()}})),
        )
        .await;
    assert_eq!(result.is_error, Some(false));
    let text = text_of(&result);
    assert!(text.contains("\"status\": \"failed\""));
    assert!(text.contains("linking it to the organization failed"));
}

#[tokio::test]
async fn handler_panics_become_handler_errors() {
    let h = harness_with(
        FakeRemote {
            panic_on_list: true,
            ..Default::default()
        },
        Some(full_config()),
    )
    .await;
    let result = h.dispatcher.invoke("verify_organization_logo", None).await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("failed unexpectedly"));

    // The dispatcher keeps serving afterwards.
    let result = h.dispatcher.invoke("config_status", None).await;
    assert_eq!(result.is_error, Some(false));
}

#[tokio::test]
async fn config_set_validates_and_persists() {
    let h = harness_with(FakeRemote::default(), None).await;

    let result = h
        .dispatcher
        .invoke("config_set", args(json!({"timeout": 500})))
        .await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).contains("Invalid configuration"));

    let result = h
        .dispatcher
        .invoke(
            "config_set",
            args(json!({"graphqlEndpoint": "https://elsewhere.example/graphql"})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));

    let result = h
        .dispatcher
        .invoke("config_set", args(json!({"apiKey": "abcd-5678", "retries": 1})))
        .await;
    assert_eq!(result.is_error, Some(false));
    assert!(text_of(&result).contains("Updated fields: API Key, Retries"));
    assert_eq!(h.config.get().await.expect("get").retries, 1);
}

#[tokio::test]
async fn tool_list_is_in_registry_order() {
    let h = harness_with(FakeRemote::default(), None).await;
    let tools = h.dispatcher.list_tools();
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "update_organization_theme",
            "list_organization_logos",
            "get_logo_download_url",
            "verify_organization_logo",
            "upload_file",
            "view_pdf",
            "config_get",
            "config_set",
            "config_status",
            "config_reset",
        ]
    );
}
