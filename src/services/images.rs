use std::path::PathBuf;

use crate::error::{AppError, Result};

/// URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "uploads";

/// Content-addressed storage for checklist photos.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Checks size and content type, returning the file extension to use.
    pub fn check(&self, bytes: &[u8]) -> Result<&'static str> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Empty image upload".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::Validation(format!(
                "Image exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| AppError::Validation("Unrecognised image format".to_string()))?;
        match kind.mime_type() {
            "image/jpeg" | "image/png" | "image/gif" | "image/webp" => Ok(kind.extension()),
            other => Err(AppError::Validation(format!(
                "Unsupported image type: {}",
                other
            ))),
        }
    }

    /// Stores an image under `<hash>.<ext>`.
    ///
    /// Identical content maps to the same file, which is then left untouched.
    pub async fn save(&self, bytes: &[u8]) -> Result<StoredImage> {
        let extension = self.check(bytes)?;
        let name = format!("{}.{}", blake3::hash(bytes).to_hex(), extension);

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&name);
        let created = if tokio::fs::try_exists(&path).await? {
            None
        } else {
            tokio::fs::write(&path, bytes).await?;
            tracing::debug!("Stored image {} ({} bytes)", name, bytes.len());
            Some(path)
        };

        Ok(StoredImage {
            reference: format!("{}/{}", PUBLIC_PREFIX, name),
            created,
        })
    }

    /// Removes the files a failed submission wrote. Files that already
    /// existed belong to earlier checklists and are kept.
    pub async fn discard(&self, images: &[StoredImage]) {
        for path in images.iter().filter_map(|i| i.created.as_ref()) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!("Discarded image {}", path.display()),
                Err(e) => tracing::warn!("Could not discard image {}: {}", path.display(), e),
            }
        }
    }
}

/// An image written by [`ImageStore::save`].
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Public reference, `uploads/<hash>.<ext>`.
    pub reference: String,
    created: Option<PathBuf>,
}
