use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use homestead_types::api::{AddWishlistRequest, WishlistItemResponse};

use crate::auth::AppState;
use crate::error::AppResult;
use crate::extract::{Json, Path};
use crate::middleware::AuthUser;

#[derive(Serialize)]
pub struct WishlistResponse {
    pub wishlist: Vec<WishlistItemResponse>,
}

#[derive(Serialize)]
pub struct WishlistAdded {
    pub message: &'static str,
    pub item: WishlistItemResponse,
}

#[derive(Serialize)]
pub struct WishlistRemoved {
    pub message: &'static str,
    /// Remaining product ids.
    pub wishlist: Vec<Uuid>,
}

pub async fn list_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<WishlistResponse>> {
    let user_id = user.id;
    let rows = state.db_call(move |db| db.list_wishlist(user_id)).await?;
    Ok(Json(WishlistResponse {
        wishlist: rows
            .into_iter()
            .map(|row| WishlistItemResponse {
                product: row.product.into(),
                added_at: row.added_at,
            })
            .collect(),
    }))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<AddWishlistRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = user.id;
    let row = state
        .db_call(move |db| db.add_to_wishlist(user_id, req.product_id))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WishlistAdded {
            message: "Product added to wishlist",
            item: WishlistItemResponse {
                product: row.product.into(),
                added_at: row.added_at,
            },
        }),
    ))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<WishlistRemoved>> {
    let user_id = user.id;
    let wishlist = state
        .db_call(move |db| db.remove_from_wishlist(user_id, product_id))
        .await?;
    Ok(Json(WishlistRemoved {
        message: "Product removed from wishlist",
        wishlist,
    }))
}
