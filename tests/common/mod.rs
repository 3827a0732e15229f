#![allow(dead_code)]

use axum_test::TestServer;
use quill::infrastructure::persistence::MemoryStore;
use quill::routes::{RouterOptions, app_router};
use quill::server::build_odm;
use quill::state::AppState;
use serde_json::{Value, json};
use std::sync::Arc;

pub fn create_test_state() -> AppState {
    let odm = build_odm(Arc::new(MemoryStore::new())).unwrap();
    AppState::new(odm).unwrap()
}

/// Full pipeline over a fresh in-memory store.
pub fn create_test_server() -> TestServer {
    let app = app_router(create_test_state(), RouterOptions::default());
    TestServer::new(app).unwrap()
}

pub async fn create_user(server: &TestServer, username: &str) -> String {
    let response = server
        .post("/api/users")
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "display_name": username.to_uppercase(),
            "role": "author"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    id_of(&response.json::<Value>())
}

pub async fn create_post(server: &TestServer, author: &str, title: &str, tags: &[&str]) -> String {
    let response = server
        .post("/api/posts")
        .json(&json!({
            "title": title,
            "body": format!("Body of {title}"),
            "author": author,
            "tags": tags,
            "status": "published"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    id_of(&response.json::<Value>())
}

pub fn id_of(value: &Value) -> String {
    value["_id"].as_str().unwrap().to_string()
}
