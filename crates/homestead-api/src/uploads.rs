//! Multipart form parsing and image storage under the upload directory.
//!
//! Files are stored as `<upload_dir>/<kind>/<uuid>.<ext>` and referenced in the
//! database by their public path `/uploads/<kind>/<uuid>.<ext>`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// 10 MB per file
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Request body cap for multipart routes (a listing carries several images).
pub const MAX_MULTIPART_BYTES: usize = 64 * 1024 * 1024;

pub const PUBLIC_PREFIX: &str = "/uploads";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    DisplayImage,
    ProductImage,
    UserImage,
}

impl UploadKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::DisplayImage => "display-image",
            Self::ProductImage => "product-image",
            Self::UserImage => "user-images",
        }
    }
}

/// A file part held in memory until it is validated and stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Lowercased extension if it is an accepted image type.
    pub fn image_extension(&self) -> Option<String> {
        let ext = Path::new(&self.file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
    }
}

/// Text fields and file parts of a multipart body. `images[]` and `images`
/// name the same field.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(|n| n.trim_end_matches("[]").to_string()) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let mut data = Vec::new();
                    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                        if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                            return Err(AppError::PayloadTooLarge);
                        }
                        data.extend_from_slice(&chunk);
                    }
                    // Browsers send an empty part for an untouched file input.
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files
                        .entry(name)
                        .or_default()
                        .push(UploadedFile { file_name, data });
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed value of a text field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        self.files.remove(name).unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.take_files(name).into_iter().next()
    }

    #[cfg(test)]
    pub(crate) fn with_fields(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Reject any file that is not an accepted image, before anything is written.
pub fn validate_images(field: &str, files: &[UploadedFile]) -> AppResult<()> {
    if files.iter().any(|f| f.image_extension().is_none()) {
        return Err(AppError::invalid(
            field,
            format!("only {} images are accepted", IMAGE_EXTENSIONS.join(", ")),
        ));
    }
    Ok(())
}

/// Write a validated image and return its public path.
pub async fn store_image(root: &Path, kind: UploadKind, file: &UploadedFile) -> AppResult<String> {
    let ext = file
        .image_extension()
        .ok_or_else(|| AppError::invalid("file", "unsupported image type"))?;

    let dir = root.join(kind.dir_name());
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", dir.display(), e);
        anyhow::anyhow!("cannot create upload directory")
    })?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ext);
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &file.data).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::anyhow!("cannot write upload")
    })?;

    debug!("Stored {} ({} bytes)", path.display(), file.data.len());
    Ok(format!("{}/{}/{}", PUBLIC_PREFIX, kind.dir_name(), file_name))
}

pub async fn store_images(
    root: &Path,
    kind: UploadKind,
    files: &[UploadedFile],
) -> AppResult<Vec<String>> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match store_image(root, kind, file).await {
            Ok(path) => stored.push(path),
            Err(e) => {
                remove_uploads(root, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// Map a public path back into the upload directory. Paths that would leave
/// it are refused.
pub fn resolve_public_path(root: &Path, public_path: &str) -> Option<PathBuf> {
    let relative = public_path
        .strip_prefix(PUBLIC_PREFIX)?
        .trim_start_matches('/');
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Best-effort delete. Failures are logged and never surfaced.
pub async fn remove_upload(root: &Path, public_path: &str) {
    let Some(path) = resolve_public_path(root, public_path) else {
        warn!("Refusing to delete upload outside upload dir: {}", public_path);
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

pub async fn remove_uploads(root: &Path, public_paths: &[String]) {
    for path in public_paths {
        remove_upload(root, path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn only_images_accepted() {
        assert_eq!(file("a.JPG").image_extension().as_deref(), Some("jpg"));
        assert_eq!(file("house.webp").image_extension().as_deref(), Some("webp"));
        assert!(file("notes.pdf").image_extension().is_none());
        assert!(file("noext").image_extension().is_none());

        assert!(validate_images("images", &[file("a.png"), file("b.gif")]).is_ok());
        assert!(matches!(
            validate_images("images", &[file("a.png"), file("b.exe")]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn public_paths_stay_inside_root() {
        let root = Path::new("/srv/uploads");
        assert_eq!(
            resolve_public_path(root, "/uploads/product-image/x.png"),
            Some(PathBuf::from("/srv/uploads/product-image/x.png"))
        );
        assert_eq!(resolve_public_path(root, "/uploads/../etc/passwd"), None);
        assert_eq!(resolve_public_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_public_path(root, "/uploads/"), None);
    }

    #[tokio::test]
    async fn store_and_remove() {
        let root = std::env::temp_dir().join(format!("homestead-uploads-{}", Uuid::new_v4()));

        let public = store_image(&root, UploadKind::UserImage, &file("me.png"))
            .await
            .unwrap();
        assert!(public.starts_with("/uploads/user-images/"));
        assert!(public.ends_with(".png"));

        let on_disk = resolve_public_path(&root, &public).unwrap();
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), vec![1, 2, 3]);

        remove_upload(&root, &public).await;
        assert!(!on_disk.exists());
        // Second delete is a silent no-op.
        remove_upload(&root, &public).await;

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
