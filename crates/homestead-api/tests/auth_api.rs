mod common;

use axum::http::{StatusCode, header};
use serde_json::json;

use common::*;

#[tokio::test]
async fn signup_sets_cookie_and_hides_password() {
    let state = test_state();
    let (response, body) = send(
        &state,
        "POST",
        "/api/signup",
        None,
        Some(signup_body("Ann", "Ann@Example.com")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=432000"));

    assert_eq!(body["user"]["email"], "ann@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["address"]["city"], "Lisbon");
    assert!(body["user"].get("password").is_none());
    // The token only travels in the HttpOnly cookie.
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn signup_reports_every_invalid_field() {
    let state = test_state();
    let (response, body) = send(
        &state,
        "POST",
        "/api/signup",
        None,
        Some(json!({
            "name": "",
            "email": "not-an-email",
            "password": "123",
            "phoneNumber": "55-12",
            "address": { "city": "", "street": "" }
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(
        fields,
        vec![
            "name",
            "email",
            "password",
            "phoneNumber",
            "address.city",
            "address.street"
        ]
    );
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let state = test_state();
    signup(&state, "Ann").await;

    let (response, _) = send(
        &state,
        "POST",
        "/api/signup",
        None,
        Some(signup_body("Other Ann", "ANN@example.com")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_does_not_reveal_which_part_was_wrong() {
    let state = test_state();
    signup(&state, "Ann").await;

    let (wrong_password, body) = send(
        &state,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "wrong-one" })),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");

    let (unknown_email, body) = send(
        &state,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");

    let (ok, body) = send(
        &state,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert!(session_cookie(&ok).starts_with("auth_token="));
}

#[tokio::test]
async fn profile_requires_a_session() {
    let state = test_state();
    let (cookie, user_id) = signup(&state, "Ann").await;

    let (response, body) = send(&state, "GET", "/api/profile", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (response, _) = send(
        &state,
        "GET",
        "/api/profile",
        Some("auth_token=garbage"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (response, body) = send(&state, "GET", "/api/profile", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["user"]["id"], user_id.to_string());
    assert_eq!(body["user"]["wishlist"], json!([]));
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let state = test_state();
    let (cookie, user_id) = signup(&state, "Ann").await;
    let token = cookie.trim_start_matches("auth_token=");

    let request = axum::http::Request::builder()
        .uri("/api/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(axum::body::Body::empty())
        .unwrap();
    let (response, body) = call(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["user"]["id"], user_id.to_string());
}

#[tokio::test]
async fn logout_clears_cookie() {
    let state = test_state();
    let (response, body) = send(&state, "POST", "/api/logout", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["message"], "Logout successful");
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn edit_profile_updates_fields_and_image() {
    let state = test_state();
    let (cookie, _) = signup(&state, "Ann").await;

    let (response, body) = send_multipart(
        &state,
        "PUT",
        "/api/edit/profile",
        &cookie,
        &[("name", "Ann Marie"), ("address.city", "Porto"), ("phoneNumber", "")],
        &[("profileImage", "me.png", b"png-bytes")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["name"], "Ann Marie");
    assert_eq!(body["user"]["address"]["city"], "Porto");
    assert_eq!(body["user"]["address"]["street"], "Rua Augusta 1");
    assert_eq!(body["user"]["phoneNumber"], "5551234");

    let first = body["user"]["profileImage"].as_str().unwrap().to_string();
    assert!(first.starts_with("/uploads/user-images/"));
    let first_path = homestead_api::uploads::resolve_public_path(&state.upload_dir, &first).unwrap();
    assert!(first_path.exists());

    // Replacing the image removes the old file.
    let (_, body) = send_multipart(
        &state,
        "PUT",
        "/api/edit/profile",
        &cookie,
        &[],
        &[("profileImage", "me2.jpg", b"jpg-bytes")],
    )
    .await;
    let second = body["user"]["profileImage"].as_str().unwrap();
    assert_ne!(second, first);
    assert!(!first_path.exists());

    let (response, _) = send_multipart(
        &state,
        "PUT",
        "/api/edit/profile",
        &cookie,
        &[],
        &[("profileImage", "virus.exe", b"MZ")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let _ = std::fs::remove_dir_all(&state.upload_dir);
}
