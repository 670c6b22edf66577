//! Test helper utilities
//!
//! Shared setup for gigflow-ingest integration tests: an in-memory database,
//! the full router, and request builders.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use gigflow_common::config::TomlConfig;
use gigflow_common::events::EventBus;
use gigflow_ingest::ingest::AiFallbackParser;
use gigflow_ingest::AppState;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub state: AppState,
}

/// App with default configuration and no AI client
pub async fn test_app() -> TestApp {
    let config = TomlConfig::default();
    let pool = gigflow_common::db::init_memory_database(&config.routing.default_user_id)
        .await
        .expect("Failed to create in-memory database");
    let state = AppState::new(pool.clone(), EventBus::new(100), &config);
    TestApp {
        router: gigflow_ingest::build_router(state.clone()),
        pool,
        state,
    }
}

/// App whose fallback parser is supplied by the test
pub async fn test_app_with_parser(parser: AiFallbackParser) -> TestApp {
    let config = TomlConfig::default();
    let pool = gigflow_common::db::init_memory_database(&config.routing.default_user_id)
        .await
        .expect("Failed to create in-memory database");
    let state = AppState::with_parser(pool.clone(), EventBus::new(100), &config, parser);
    TestApp {
        router: gigflow_ingest::build_router(state.clone()),
        pool,
        state,
    }
}

/// App backed by a database file, for restart scenarios
pub async fn test_app_on_disk(db_path: &std::path::Path) -> TestApp {
    let config = TomlConfig::default();
    let pool = gigflow_common::db::init_database(db_path, &config.routing.default_user_id)
        .await
        .expect("Failed to open database file");
    let state = AppState::new(pool.clone(), EventBus::new(100), &config);
    TestApp {
        router: gigflow_ingest::build_router(state.clone()),
        pool,
        state,
    }
}

impl TestApp {
    /// Send a request and decode the JSON response (Null for empty bodies)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response is not JSON")
        };
        (status, body)
    }

    pub async fn webhook(&self, fields: &[(&str, &str)]) -> Value {
        let (status, body) = self.send(form_request("/webhook/email", fields)).await;
        assert_eq!(status, StatusCode::OK, "webhook must always answer 200: {}", body);
        body
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, value: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, &value)).await
    }

    pub async fn patch_json(&self, uri: &str, value: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::PATCH, uri, &value)).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn register_user(&self, id: &str, routing_prefix: &str) {
        let (status, body) = self
            .post_json(
                "/users",
                serde_json::json!({"id": id, "name": id, "routingPrefix": routing_prefix}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    pub async fn booking_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, value: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

pub fn multipart_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let boundary = "gigflow-test-boundary";
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            boundary, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}
