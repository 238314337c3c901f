#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use homestead_api::{AppState, AppStateInner, router};
use homestead_db::Database;
use homestead_gateway::Hub;

pub const ADMIN_EMAIL: &str = "admin@example.com";

pub fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        hub: Hub::new(Duration::from_millis(300)),
        jwt_secret: "test-secret".into(),
        cookie_secure: false,
        upload_dir: std::env::temp_dir().join(format!("homestead-test-{}", Uuid::new_v4())),
        admin_emails: vec![ADMIN_EMAIL.into()],
    })
}

pub fn signup_body(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "password": "secret1",
        "phoneNumber": "5551234",
        "address": { "city": "Lisbon", "street": "Rua Augusta 1" }
    })
}

/// Drive the router with one request.
pub async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (Response<Body>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    call(state, request).await
}

pub async fn call(state: &AppState, request: Request<Body>) -> (Response<Body>, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (Response::from_parts(parts, Body::empty()), value)
}

/// `auth_token=<jwt>` from a Set-Cookie header.
pub fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

/// Sign up through the API. Returns (cookie, user id).
pub async fn signup(state: &AppState, name: &str) -> (String, Uuid) {
    let email = format!("{}@example.com", name.to_lowercase());
    signup_with_email(state, name, &email).await
}

pub async fn signup_with_email(state: &AppState, name: &str, email: &str) -> (String, Uuid) {
    let (response, body) = send(
        state,
        "POST",
        "/api/signup",
        None,
        Some(signup_body(name, email)),
    )
    .await;
    assert_eq!(response.status(), 201, "signup failed: {}", body);
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    (session_cookie(&response), id)
}

/// A multipart body with text fields and `(field, file name, bytes)` files.
pub fn multipart(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "homestead-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                boundary, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

pub async fn send_multipart(
    state: &AppState,
    method: &str,
    uri: &str,
    cookie: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> (Response<Body>, Value) {
    let (content_type, body) = multipart(fields, files);
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    call(state, request).await
}
