mod common;

use axum::{Router, routing::get};
use axum_test::TestServer;
use quill::api::handlers::health_handler;

#[tokio::test]
async fn test_health_endpoint_success() {
    let state = common::create_test_state();
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(state);

    let server = TestServer::new(app).unwrap();

    let response = server.get("/health").await;

    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["database"]["status"], "ok");
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn test_health_degraded_when_store_closed() {
    let state = common::create_test_state();
    state.odm.close().await;

    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(state);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/health").await;

    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["checks"]["database"]["status"], "error");
}

#[tokio::test]
async fn test_models_endpoint_lists_registry() {
    let server = common::create_test_server();

    let response = server.get("/api/models").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    let models = json["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);

    let post = models.iter().find(|m| m["name"] == "Post").unwrap();
    assert_eq!(post["collection"], "posts");
    assert_eq!(post["references"].as_array().unwrap().len(), 3);
    assert_eq!(post["references"][2]["path"], "likes");
    assert_eq!(post["references"][2]["many"], true);
}
