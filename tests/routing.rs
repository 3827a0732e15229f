mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use quill::routes::{RouterOptions, app_router, app_service};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let server = common::create_test_server();

    let response = server.get("/nowhere").await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["error"], "Cannot GET /nowhere");
}

#[tokio::test]
async fn test_unsupported_method_is_json_404() {
    let server = common::create_test_server();

    let response = server.put("/api/users").await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["error"], "Cannot PUT /api/users");
}

#[tokio::test]
async fn test_trailing_slash_is_routed() {
    let app = app_service(app_router(
        common::create_test_state(),
        RouterOptions::default(),
    ));

    let response = app
        .oneshot(Request::get("/api/users/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app_service(app_router(
        common::create_test_state(),
        RouterOptions::default(),
    ));

    let request = Request::post("/api/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_missing_content_type_is_bad_request() {
    let server = common::create_test_server();

    let response = server
        .post("/api/users")
        .text("{\"username\": \"ada\"}")
        .await;

    response.assert_status_bad_request();
    assert!(response.json::<Value>()["error"].is_string());
}
