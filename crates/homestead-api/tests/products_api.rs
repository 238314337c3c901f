mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use common::*;

const LISTING: &[(&str, &str)] = &[
    ("title", "Sea View Flat"),
    ("description", "Two bedrooms facing the river"),
    ("price", "1200"),
    ("type", "Apartment"),
    ("category", "rent,furnished"),
    ("status", "available"),
    ("location", "Lisbon"),
    ("beds", "2"),
    ("baths", "1"),
];

async fn create_listing(state: &homestead_api::AppState, admin: &str) -> Value {
    let (response, body) = send_multipart(
        state,
        "POST",
        "/api/product",
        admin,
        LISTING,
        &[
            ("displayImage", "front.jpg", b"front"),
            ("images[]", "kitchen.png", b"kitchen"),
            ("images[]", "bath.webp", b"bath"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED, "{}", body);
    body["product"].clone()
}

#[tokio::test]
async fn only_admins_manage_listings() {
    let state = test_state();
    let (user, _) = signup(&state, "Ann").await;

    let (response, body) = send_multipart(
        &state,
        "POST",
        "/api/product",
        &user,
        LISTING,
        &[("displayImage", "front.jpg", b"front")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (response, _) = send(
        &state,
        "DELETE",
        &format!("/api/product/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_list_and_fetch() {
    let state = test_state();
    let (admin, _) = signup_with_email(&state, "Admin", ADMIN_EMAIL).await;

    let product = create_listing(&state, &admin).await;
    assert_eq!(product["slug"], "sea-view-flat");
    assert_eq!(product["type"], "Apartment");
    assert_eq!(product["category"], json!(["rent", "furnished"]));
    assert_eq!(product["beds"], 2);
    assert!(
        product["displayImage"]
            .as_str()
            .unwrap()
            .starts_with("/uploads/display-image/")
    );
    let images = product["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);

    let (response, list) = send(
        &state,
        "GET",
        "/api/product?category=rent&sort=price:desc&limit=5",
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(list["pagination"], json!({ "total": 1, "page": 1, "pages": 1 }));
    assert_eq!(list["products"][0]["id"], product["id"]);

    let (_, empty) = send(&state, "GET", "/api/product?type=House", None, None).await;
    assert_eq!(empty["pagination"]["total"], 0);

    let (response, _) = send(&state, "GET", "/api/product?sort=owner:asc", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, by_slug) = send(&state, "GET", "/api/product/slug/sea-view-flat", None, None).await;
    assert_eq!(by_slug["product"]["id"], product["id"]);

    let (response, _) = send(
        &state,
        "GET",
        &format!("/api/product/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Uploaded files are served back.
    let image = images[0].as_str().unwrap();
    let request = axum::http::Request::builder()
        .uri(image)
        .body(axum::body::Body::empty())
        .unwrap();
    let (response, _) = call(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let _ = std::fs::remove_dir_all(&state.upload_dir);
}

#[tokio::test]
async fn create_requires_images() {
    let state = test_state();
    let (admin, _) = signup_with_email(&state, "Admin", ADMIN_EMAIL).await;

    let (response, body) = send_multipart(
        &state,
        "POST",
        "/api/product",
        &admin,
        LISTING,
        &[("displayImage", "front.jpg", b"front")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "images");
}

#[tokio::test]
async fn update_swaps_images_and_fields() {
    let state = test_state();
    let (admin, _) = signup_with_email(&state, "Admin", ADMIN_EMAIL).await;
    let product = create_listing(&state, &admin).await;
    let id = product["id"].as_str().unwrap();
    let removed = product["images"][0].as_str().unwrap().to_string();
    let kept = product["images"][1].clone();
    let removed_path =
        homestead_api::uploads::resolve_public_path(&state.upload_dir, &removed).unwrap();
    assert!(removed_path.exists());

    let removed_json = json!([removed]).to_string();
    let (response, body) = send_multipart(
        &state,
        "PUT",
        &format!("/api/product/{}", id),
        &admin,
        &[
            ("title", "Sea View Loft"),
            ("price", ""),
            ("removedImages", removed_json.as_str()),
        ],
        &[("newImages[]", "garden.gif", b"garden")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "{}", body);

    let updated = &body["product"];
    assert_eq!(updated["title"], "Sea View Loft");
    assert_eq!(updated["slug"], "sea-view-loft");
    assert_eq!(updated["price"], product["price"]);
    let images = updated["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], kept);
    assert!(
        images[1]
            .as_str()
            .unwrap()
            .starts_with("/uploads/product-image/")
    );
    assert!(!removed_path.exists());

    let _ = std::fs::remove_dir_all(&state.upload_dir);
}

#[tokio::test]
async fn delete_removes_listing_and_files() {
    let state = test_state();
    let (admin, _) = signup_with_email(&state, "Admin", ADMIN_EMAIL).await;
    let product = create_listing(&state, &admin).await;
    let id = product["id"].as_str().unwrap();
    let display = homestead_api::uploads::resolve_public_path(
        &state.upload_dir,
        product["displayImage"].as_str().unwrap(),
    )
    .unwrap();
    assert!(display.exists());

    let uri = format!("/api/product/{}", id);
    let (response, _) = send(&state, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!display.exists());

    let (response, _) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let (response, _) = send(&state, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let _ = std::fs::remove_dir_all(&state.upload_dir);
}

#[tokio::test]
async fn wishlist_pairs_are_unique() {
    let state = test_state();
    let (admin, _) = signup_with_email(&state, "Admin", ADMIN_EMAIL).await;
    let (user, _) = signup(&state, "Ann").await;
    let product = create_listing(&state, &admin).await;
    let product_id = product["id"].clone();

    let add = json!({ "productId": product_id });
    let (response, body) = send(
        &state,
        "POST",
        "/api/product/wishlist",
        Some(&user),
        Some(add.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["item"]["product"]["id"], product_id);

    let (response, _) = send(
        &state,
        "POST",
        "/api/product/wishlist",
        Some(&user),
        Some(add),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let (_, profile) = send(&state, "GET", "/api/profile", Some(&user), None).await;
    assert_eq!(profile["user"]["wishlist"], json!([product_id]));

    let (_, list) = send(&state, "GET", "/api/product/wishlist", Some(&user), None).await;
    assert_eq!(list["wishlist"].as_array().unwrap().len(), 1);

    let uri = format!("/api/product/wishlist/{}", product_id.as_str().unwrap());
    let (response, body) = send(&state, "DELETE", &uri, Some(&user), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["wishlist"], json!([]));

    let (response, _) = send(&state, "DELETE", &uri, Some(&user), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (response, _) = send(
        &state,
        "POST",
        "/api/product/wishlist",
        Some(&user),
        Some(json!({ "productId": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let _ = std::fs::remove_dir_all(&state.upload_dir);
}
