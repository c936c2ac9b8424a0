use serde_json::{json, Value};
use std::time::Duration;
use trialgate::{Gateway, GatewayConfig, GatewayError, Payload, ReqwestTransport, Transport};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> GatewayConfig {
    GatewayConfig::builder()
        .base_url(format!("{}/api/v2/", server.uri()))
        .retry_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn transport_sends_json_accept_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/studies"))
        .and(header("accept", "application/json"))
        .and(query_param("query.cond", "asthma"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"studies": []}"#))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&config(&server)).unwrap();
    let params = vec![("query.cond".to_string(), "asthma".to_string())];
    let response = transport.get("/studies", &params).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"studies": []}"#);
}

#[tokio::test]
async fn transport_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&config(&server)).unwrap();
    let response = transport.get("/version", &[]).await.unwrap();
    assert_eq!(response.status, 429);
    assert_eq!(response.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn study_details_over_http() {
    let server = MockServer::start().await;
    let body = json!({
        "protocolSection": {
            "identificationModule": {"nctId": "NCT04280705", "briefTitle": "Adaptive COVID-19 Treatment Trial"},
            "statusModule": {"overallStatus": "COMPLETED"},
            "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE3"], "enrollmentInfo": {"count": 1062}}
        },
        "hasResults": true
    });
    Mock::given(method("GET"))
        .and(path("/api/v2/studies/NCT04280705"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::from_config(config(&server)).unwrap();
    let result = gateway.execute("get_study_details", json!({"nctId": "NCT04280705"})).await.unwrap();
    match result.payload {
        Payload::Study(detail) => {
            assert_eq!(detail.design.enrollment, Some(1062));
            assert!(detail.has_results);
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(gateway.window().in_window, 1);
}

#[tokio::test]
async fn missing_study_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/studies/NCT00000000"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "study not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::from_config(config(&server)).unwrap();
    let err = gateway.execute("get_study_details", json!({"nctId": "NCT00000000"})).await.unwrap_err();
    match err {
        GatewayError::UpstreamRejected { status, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(message, "study not found");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn server_errors_retry_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"apiVersion": "2.0.3"})))
        .mount(&server)
        .await;

    let gateway = Gateway::from_config(config(&server)).unwrap();
    let result = gateway.execute("get_api_version", Value::Null).await.unwrap();
    assert_eq!(result.payload, Payload::Document(json!({"apiVersion": "2.0.3"})));
    assert_eq!(gateway.window().in_window, 3);
}

#[tokio::test]
async fn undecodable_success_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/studies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let gateway = Gateway::from_config(config(&server)).unwrap();
    let err = gateway.execute("search_by_condition", json!({"condition": "asthma"})).await.unwrap_err();
    assert!(matches!(err, GatewayError::MalformedResponse { .. }));
}
