use std::collections::HashSet;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use homestead_db::models::{NewProduct, ProductFilter, ProductRow};
use homestead_types::api::{Pagination, ProductListQuery, ProductListResponse, ProductResponse};

use crate::auth::{AppState, MessageBody};
use crate::error::{AppError, AppResult, FieldError};
use crate::extract::{Json, Path, Query};
use crate::uploads::{self, MultipartForm, UploadKind};

#[derive(Serialize)]
pub struct ProductEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub product: ProductResponse,
}

impl ProductEnvelope {
    fn new(product: ProductRow) -> Self {
        Self {
            message: None,
            product: product.into(),
        }
    }

    fn with_message(message: &'static str, product: ProductRow) -> Self {
        Self {
            message: Some(message),
            product: product.into(),
        }
    }
}

/// GET /api/product
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> AppResult<Json<ProductListResponse>> {
    let filter = ProductFilter::from_query(&query)?;
    let (page, limit) = (filter.page, filter.limit);
    let (rows, total) = state.db_call(move |db| db.list_products(&filter)).await?;

    Ok(Json(ProductListResponse {
        products: rows.into_iter().map(ProductResponse::from).collect(),
        pagination: Pagination {
            total,
            page,
            pages: total.div_ceil(u64::from(limit)),
        },
    }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductEnvelope>> {
    let product = state
        .db_call(move |db| db.get_product(id))
        .await?
        .ok_or(AppError::NotFound("product"))?;
    Ok(Json(ProductEnvelope::new(product)))
}

pub async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ProductEnvelope>> {
    let product = state
        .db_call(move |db| db.get_product_by_slug(&slug))
        .await?
        .ok_or(AppError::NotFound("product"))?;
    Ok(Json(ProductEnvelope::new(product)))
}

/// POST /api/product (admin, multipart). Needs a display image and at least
/// one gallery image.
pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut form = MultipartForm::read(multipart).await?;
    let fields = ListingFields::parse(&form)?;

    let display_image = form.take_file("displayImage");
    let images = form.take_files("images");
    let Some(display_image) = display_image.filter(|_| !images.is_empty()) else {
        return Err(AppError::invalid(
            "images",
            "Display image and product images are required",
        ));
    };
    uploads::validate_images("displayImage", std::slice::from_ref(&display_image))?;
    uploads::validate_images("images", &images)?;

    let new = fields.into_new_product()?;

    let display_path =
        uploads::store_image(&state.upload_dir, UploadKind::DisplayImage, &display_image).await?;
    let image_paths =
        match uploads::store_images(&state.upload_dir, UploadKind::ProductImage, &images).await {
            Ok(paths) => paths,
            Err(e) => {
                uploads::remove_upload(&state.upload_dir, &display_path).await;
                return Err(e);
            }
        };

    let mut stored = image_paths.clone();
    stored.push(display_path.clone());

    let new = NewProduct {
        display_image: display_path,
        images: image_paths,
        ..new
    };
    let product = match state.db_call(move |db| db.create_product(&new)).await {
        Ok(product) => product,
        Err(e) => {
            uploads::remove_uploads(&state.upload_dir, &stored).await;
            return Err(e);
        }
    };

    info!("Product {} created ({})", product.id, product.slug);
    Ok((
        StatusCode::CREATED,
        Json(ProductEnvelope::with_message(
            "Product created successfully",
            product,
        )),
    ))
}

/// PUT /api/product/{id} (admin, multipart). Blank fields keep their value.
/// `removedImages` is a JSON array of image paths to drop; `newImages` are
/// appended; a new `displayImage` replaces the old one.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ProductEnvelope>> {
    let mut form = MultipartForm::read(multipart).await?;
    let fields = ListingFields::parse(&form)?;
    let removed = removed_images(&form)?;
    let new_images = form.take_files("newImages");
    let display_image = form.take_file("displayImage");
    uploads::validate_images("newImages", &new_images)?;
    if let Some(display) = &display_image {
        uploads::validate_images("displayImage", std::slice::from_ref(display))?;
    }

    let mut product = state
        .db_call(move |db| db.get_product(id))
        .await?
        .ok_or(AppError::NotFound("product"))?;

    let new_paths =
        uploads::store_images(&state.upload_dir, UploadKind::ProductImage, &new_images).await?;
    let mut added = new_paths.clone();
    let mut obsolete: Vec<String> = Vec::new();

    if let Some(display) = &display_image {
        match uploads::store_image(&state.upload_dir, UploadKind::DisplayImage, display).await {
            Ok(path) => {
                obsolete.push(std::mem::replace(&mut product.display_image, path.clone()));
                added.push(path);
            }
            Err(e) => {
                uploads::remove_uploads(&state.upload_dir, &added).await;
                return Err(e);
            }
        }
    }

    // Only paths that belong to this listing are ever deleted from disk.
    let (dropped, kept): (Vec<String>, Vec<String>) = product
        .images
        .drain(..)
        .partition(|img| removed.contains(img));
    obsolete.extend(dropped);
    product.images = kept;
    product.images.extend(new_paths);

    fields.apply(&mut product);

    let updated = match state.db_call(move |db| db.update_product(&product)).await {
        Ok(updated) => updated,
        Err(e) => {
            uploads::remove_uploads(&state.upload_dir, &added).await;
            return Err(e);
        }
    };
    uploads::remove_uploads(&state.upload_dir, &obsolete).await;

    Ok(Json(ProductEnvelope::with_message(
        "Product updated successfully",
        updated,
    )))
}

/// DELETE /api/product/{id} (admin). Image files are removed best-effort.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageBody>> {
    let product = state.db_call(move |db| db.delete_product(id)).await?;

    uploads::remove_upload(&state.upload_dir, &product.display_image).await;
    uploads::remove_uploads(&state.upload_dir, &product.images).await;
    info!("Product {} deleted", product.id);

    Ok(Json(MessageBody {
        message: "Product deleted successfully",
    }))
}

/// Listing text fields from a multipart form. `None` means absent or blank.
#[derive(Debug, Default, PartialEq)]
struct ListingFields {
    title: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    kind: Option<String>,
    category: Option<Vec<String>>,
    status: Option<String>,
    location: Option<String>,
    beds: Option<u32>,
    baths: Option<u32>,
}

impl ListingFields {
    fn parse(form: &MultipartForm) -> AppResult<Self> {
        let mut errors = Vec::new();
        let owned = |name: &str| form.text(name).map(str::to_string);

        let price = form.text("price").and_then(|raw| match raw.parse::<f64>() {
            Ok(p) if p.is_finite() && p >= 0.0 => Some(p),
            _ => {
                errors.push(FieldError::new("price", "Price must be a non-negative number"));
                None
            }
        });
        let mut count = |name: &str| {
            form.text(name).and_then(|raw| match raw.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    errors.push(FieldError::new(name, format!("{} must be a whole number", name)));
                    None
                }
            })
        };
        let beds = count("beds");
        let baths = count("baths");

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(Self {
            title: owned("title"),
            description: owned("description"),
            price,
            kind: owned("type"),
            category: form.text("category").map(split_categories),
            status: owned("status"),
            location: owned("location"),
            beds,
            baths,
        })
    }

    /// Every text field is required on create. Images are filled in by the caller.
    fn into_new_product(self) -> AppResult<NewProduct> {
        let mut errors = Vec::new();
        let mut required = |value: Option<String>, field: &str, label: &str| {
            value.unwrap_or_else(|| {
                errors.push(FieldError::new(field, format!("{} is required", label)));
                String::new()
            })
        };
        let title = required(self.title, "title", "Title");
        let description = required(self.description, "description", "Description");
        let kind = required(self.kind, "type", "Type");
        let status = required(self.status, "status", "Status");
        let location = required(self.location, "location", "Location");

        let category = self.category.filter(|c| !c.is_empty()).unwrap_or_else(|| {
            errors.push(FieldError::new("category", "Category is required"));
            Vec::new()
        });
        let price = self.price.unwrap_or_else(|| {
            errors.push(FieldError::new("price", "Price is required"));
            0.0
        });

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(NewProduct {
            title,
            description,
            price,
            kind,
            category,
            display_image: String::new(),
            images: Vec::new(),
            status,
            location,
            beds: self.beds,
            baths: self.baths,
        })
    }

    fn apply(self, product: &mut ProductRow) {
        if let Some(title) = self.title {
            product.title = title;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(kind) = self.kind {
            product.kind = kind;
        }
        if let Some(category) = self.category.filter(|c| !c.is_empty()) {
            product.category = category;
        }
        if let Some(status) = self.status {
            product.status = status;
        }
        if let Some(location) = self.location {
            product.location = location;
        }
        if self.beds.is_some() {
            product.beds = self.beds;
        }
        if self.baths.is_some() {
            product.baths = self.baths;
        }
    }
}

fn split_categories(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn removed_images(form: &MultipartForm) -> AppResult<HashSet<String>> {
    match form.text("removedImages") {
        None => Ok(HashSet::new()),
        Some(raw) => serde_json::from_str::<Vec<String>>(raw)
            .map(|list| list.into_iter().collect())
            .map_err(|_| {
                AppError::invalid("removedImages", "removedImages must be a JSON array of paths")
            }),
    }
}
