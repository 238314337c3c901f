use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;

use crate::auth::{self, AppState};
use crate::middleware::{require_admin, require_auth};
use crate::uploads::{MAX_MULTIPART_BYTES, PUBLIC_PREFIX};
use crate::{chat, products, wishlist};

/// The full HTTP surface: public, authenticated and admin routes, the chat
/// WebSocket and the uploaded files.
pub fn router(state: AppState) -> Router {
    let multipart_limit = || DefaultBodyLimit::max(MAX_MULTIPART_BYTES);

    let public_routes = Router::new()
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/product", get(products::list_products))
        .route("/api/product/{id}", get(products::get_product))
        .route("/api/product/slug/{slug}", get(products::get_product_by_slug))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/profile", get(auth::profile))
        .route(
            "/api/edit/profile",
            put(auth::update_profile).layer(multipart_limit()),
        )
        .route(
            "/api/product/wishlist",
            get(wishlist::list_wishlist).post(wishlist::add_to_wishlist),
        )
        .route(
            "/api/product/wishlist/{product_id}",
            delete(wishlist::remove_from_wishlist),
        )
        .route(
            "/api/chat/conversations",
            get(chat::list_conversations).post(chat::start_conversation),
        )
        .route("/api/chat/conversations/{id}", get(chat::get_conversation))
        .route("/api/chat/messages/{conversation_id}", get(chat::get_messages))
        .route("/api/chat/message", post(chat::send_message))
        .route("/api/chat/mark-as-read", post(chat::mark_as_read))
        .route("/api/chat/unread", get(chat::unread_counts))
        .route("/api/chat/ws", get(chat::ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/product", post(products::create_product))
        .route(
            "/api/product/{id}",
            put(products::update_product).delete(products::delete_product),
        )
        .layer(multipart_limit())
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(&state.upload_dir))
}
