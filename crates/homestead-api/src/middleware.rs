use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use homestead_types::api::Claims;
use homestead_types::models::Role;

use crate::auth::AppState;
use crate::error::{AppError, AppResult};

pub const AUTH_COOKIE: &str = "auth_token";

/// Sessions last five days and are not refreshed.
pub const TOKEN_TTL_SECS: i64 = 5 * 24 * 60 * 60;

/// The authenticated caller, attached to request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

pub fn create_token(secret: &str, user_id: Uuid) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated)?;
    Ok(token_data.claims)
}

/// Cookie first, then `Authorization: Bearer`.
pub fn token_from_request(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(AUTH_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolve a token to a live user.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> AppResult<AuthUser> {
    let token = token.ok_or(AppError::Unauthenticated)?;
    let claims = decode_token(&state.jwt_secret, token)?;

    let user = state
        .db_call(move |db| db.get_user_by_id(claims.sub))
        .await?
        .filter(|u| u.active)
        .ok_or(AppError::UserNotFound)?;

    Ok(AuthUser {
        id: user.id,
        name: user.name,
        role: user.role,
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_request(&jar, req.headers());
    let user = authenticate(&state, token.as_deref()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Layered inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthenticated)?;
    if user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}

pub fn session_cookie(token: &str, secure: bool) -> HeaderValue {
    cookie_header(token, TOKEN_TTL_SECS, secure)
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    cookie_header("", 0, secure)
}

fn cookie_header(value: &str, max_age_seconds: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Max-Age={}; Path=/",
        AUTH_COOKIE, value, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    // Tokens are base64url and dots, always valid header text.
    HeaderValue::from_str(&cookie)
        .unwrap_or_else(|_| HeaderValue::from_static("auth_token=; Max-Age=0; Path=/"))
}
