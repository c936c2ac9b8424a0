mod common;

use common::test_helpers::{gateway, page, study, ScriptedTransport};
use serde_json::json;
use tower::ServiceExt;
use trialgate::{ErrorKind, ToolCall};

#[tokio::test(start_paused = true)]
async fn oneshot_runs_a_tool_call() {
    let transport = ScriptedTransport::new();
    transport.push(page(vec![study("NCT00000001", 40)], 1, None));
    let service = gateway(&transport).into_service();

    let call = ToolCall::new("search_by_sponsor", json!({"sponsor": "National Cancer Institute"}));
    let result = service.oneshot(call).await.unwrap();
    assert_eq!(result.results_shown, 1);
    assert_eq!(transport.requests()[0].param("query.spons"), Some("National Cancer Institute"));
}

#[tokio::test(start_paused = true)]
async fn service_clones_share_the_window() {
    let transport = ScriptedTransport::new();
    let service = gateway(&transport).into_service();
    for _ in 0..3 {
        service.clone().oneshot(ToolCall::new("get_api_version", json!(null))).await.unwrap();
    }
    assert_eq!(service.gateway().window().in_window, 3);
}

#[tokio::test(start_paused = true)]
async fn errors_serialize_into_reports() {
    let transport = ScriptedTransport::new();
    let service = gateway(&transport).into_service();
    let call: ToolCall = serde_json::from_value(json!({
        "name": "search_by_location",
        "arguments": {"city": "Boston", "distance": 0}
    }))
    .unwrap();

    let err = service.oneshot(call).await.unwrap_err();
    let report = err.report();
    assert_eq!(report.kind, ErrorKind::InvalidArgument);
    assert_eq!(report.field.as_deref(), Some("distance"));
    assert!(!report.retryable);
    assert_eq!(transport.count(), 0);
}
