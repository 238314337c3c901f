use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::{error, info};

use homestead_db::Database;
use homestead_db::models::{NewUser, ProfileUpdate};
use homestead_gateway::Hub;
use homestead_types::api::{AuthResponse, LoginRequest, SignupRequest, UserResponse};
use homestead_types::models::{Address, Role};

use crate::error::{AppError, AppResult, FieldError};
use crate::extract::Json;
use crate::middleware::{AuthUser, clear_session_cookie, create_token, session_cookie};
use crate::uploads::{self, MultipartForm, UploadKind};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub hub: Hub,
    pub jwt_secret: String,
    /// Adds `Secure` to the session cookie.
    pub cookie_secure: bool,
    pub upload_dir: PathBuf,
    /// Lowercased. Signups with these emails become admins.
    pub admin_emails: Vec<String>,
}

impl AppStateInner {
    /// Run a store call off the async runtime.
    pub async fn db_call<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> homestead_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                AppError::Internal(anyhow::anyhow!("blocking task failed"))
            })?
            .map_err(AppError::from)
    }

    pub(crate) async fn user_response(&self, user_id: uuid::Uuid) -> AppResult<UserResponse> {
        self.db_call(move |db| {
            let user = db.get_user_by_id(user_id)?;
            let wishlist = db.wishlist_product_ids(user_id)?;
            Ok(user.map(|u| u.into_response(wishlist)))
        })
        .await?
        .ok_or(AppError::UserNotFound)
    }
}

#[derive(Serialize)]
pub struct MessageBody {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct ProfileUpdateResponse {
    pub message: &'static str,
    pub user: UserResponse,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();
    let phone = req.phone_number.trim().to_string();

    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if req.password.chars().count() < 6 {
        errors.push(FieldError::new(
            "password",
            "Password should be at least 6 characters long",
        ));
    }
    if !is_numeric(&phone) {
        errors.push(FieldError::new("phoneNumber", "Phone number should be numeric"));
    }
    if req.address.city.trim().is_empty() {
        errors.push(FieldError::new("address.city", "City is required"));
    }
    if req.address.street.trim().is_empty() {
        errors.push(FieldError::new("address.street", "Street is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let role = if state.admin_emails.iter().any(|a| *a == email) {
        Role::Admin
    } else {
        Role::User
    };

    let new_user = NewUser {
        name,
        email,
        password_hash,
        phone_number: Some(phone),
        address: Address {
            city: req.address.city.trim().to_string(),
            street: req.address.street.trim().to_string(),
        },
        role,
    };
    let user = state.db_call(move |db| db.create_user(&new_user)).await?;
    info!("New {} account {} ({})", user.role, user.name, user.id);

    let token = create_token(&state.jwt_secret, user.id)?;
    let cookie = session_cookie(&token, state.cookie_secure);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            message: "User created successfully".into(),
            user: user.into_response(Vec::new()),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();

    let mut errors = Vec::new();
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if req.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .filter(|u| u.active);

    // Unknown emails still pay for one verify.
    let verified = match &user {
        Some(user) => verify_password(&req.password, &user.password)?,
        None => {
            let _ = verify_password(&req.password, dummy_hash());
            false
        }
    };
    let user = user
        .filter(|_| verified)
        .ok_or(AppError::InvalidCredentials)?;

    let token = create_token(&state.jwt_secret, user.id)?;
    let cookie = session_cookie(&token, state.cookie_secure);
    let user = state.user_response(user.id).await?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            message: "Login successful".into(),
            user,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(state.cookie_secure))],
        Json(MessageBody {
            message: "Logout successful",
        }),
    )
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ProfileResponse>> {
    let user = state.user_response(user.id).await?;
    Ok(Json(ProfileResponse { user }))
}

/// PUT /api/edit/profile (multipart). Absent or blank fields are left unchanged.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> AppResult<Json<ProfileUpdateResponse>> {
    let user_id = user.id;
    let mut form = MultipartForm::read(multipart).await?;
    let mut update = profile_update_from_form(&form)?;

    if let Some(image) = form.take_file("profileImage") {
        uploads::validate_images("profileImage", std::slice::from_ref(&image))?;
        let path = uploads::store_image(&state.upload_dir, UploadKind::UserImage, &image).await?;
        update.profile_image = Some(path);
    }

    let new_image = update.profile_image.clone();
    let result = state
        .db_call(move |db| db.update_profile(user_id, &update))
        .await;

    let replaced = match result {
        Ok((_, replaced)) => replaced,
        Err(e) => {
            if let Some(path) = new_image {
                uploads::remove_upload(&state.upload_dir, &path).await;
            }
            return Err(e);
        }
    };
    if let Some(old) = replaced {
        uploads::remove_upload(&state.upload_dir, &old).await;
    }

    Ok(Json(ProfileUpdateResponse {
        message: "Profile updated successfully",
        user: state.user_response(user_id).await?,
    }))
}

fn profile_update_from_form(form: &MultipartForm) -> AppResult<ProfileUpdate> {
    let phone_number = form.text("phoneNumber").map(str::to_string);
    if let Some(phone) = &phone_number {
        if !is_numeric(phone) {
            return Err(AppError::invalid(
                "phoneNumber",
                "Phone number should be numeric",
            ));
        }
    }

    Ok(ProfileUpdate {
        name: form.text("name").map(str::to_string),
        phone_number,
        city: form.text("address.city").map(str::to_string),
        street: form.text("address.street").map(str::to_string),
        profile_image: None,
    })
}

fn verify_password(password: &str, stored: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Argon2id hash of a throwaway password, built once per process.
fn dummy_hash() -> &'static str {
    static DUMMY: LazyLock<String> = LazyLock::new(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(b"homestead-unknown-account", &salt)
            .map(|hash| hash.to_string())
            .unwrap_or_default()
    });
    &DUMMY
}

/// `local@domain.tld` with no whitespace.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ann@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("ann"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ann@example"));
        assert!(!is_valid_email("ann@@example.com"));
        assert!(!is_valid_email("an n@example.com"));
        assert!(!is_valid_email("ann@example."));
    }

    #[test]
    fn unknown_accounts_verify_against_a_real_hash() {
        assert!(PasswordHash::new(dummy_hash()).is_ok());
        assert!(!verify_password("secret1", dummy_hash()).unwrap());

        let salt = SaltString::generate(&mut OsRng);
        let stored = Argon2::default()
            .hash_password(b"secret1", &salt)
            .unwrap()
            .to_string();
        assert!(verify_password("secret1", &stored).unwrap());
        assert!(!verify_password("secret2", &stored).unwrap());
        assert!(verify_password("secret1", "not-a-phc-string").is_err());
    }

    #[test]
    fn phone_must_be_digits() {
        assert!(is_numeric("5551234"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("555-1234"));
    }

    #[test]
    fn profile_form_ignores_blank_fields() {
        let form = MultipartForm::with_fields(&[
            ("name", "  "),
            ("address.city", "Porto"),
            ("phoneNumber", "912"),
        ]);
        let update = profile_update_from_form(&form).unwrap();
        assert_eq!(update.name, None);
        assert_eq!(update.city.as_deref(), Some("Porto"));
        assert_eq!(update.phone_number.as_deref(), Some("912"));

        let form = MultipartForm::with_fields(&[("phoneNumber", "91a")]);
        assert!(matches!(
            profile_update_from_form(&form),
            Err(AppError::Validation(_))
        ));
    }
}
