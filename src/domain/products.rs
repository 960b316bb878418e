//! Product field rules and the source-image to artifact naming scheme.

use sha2::{Digest, Sha256};
use url::Url;

use super::error::DomainError;

pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_IMAGES: usize = 32;

/// User-editable product fields, validated before they reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub price: f64,
}

impl ProductDraft {
    /// Trim and check every field, returning the normalized draft.
    pub fn validate(self) -> Result<Self, DomainError> {
        if self.user_id <= 0 {
            return Err(DomainError::validation("user_id", "must be positive"));
        }

        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(DomainError::validation(
                "name",
                format!("must be at most {MAX_NAME_CHARS} characters"),
            ));
        }

        validate_price(self.price)?;

        if self.images.len() > MAX_IMAGES {
            return Err(DomainError::validation(
                "images",
                format!("at most {MAX_IMAGES} images are accepted"),
            ));
        }

        let mut images: Vec<String> = Vec::with_capacity(self.images.len());
        for raw in self.images {
            let url = normalize_image_url(&raw)?;
            if !images.contains(&url) {
                images.push(url);
            }
        }

        Ok(Self {
            user_id: self.user_id,
            name,
            description: self.description.trim().to_string(),
            images,
            price: self.price,
        })
    }
}

pub fn validate_price(price: f64) -> Result<(), DomainError> {
    if !price.is_finite() {
        return Err(DomainError::validation("price", "must be a finite number"));
    }
    if price < 0.0 {
        return Err(DomainError::validation("price", "must not be negative"));
    }
    Ok(())
}

/// Accept only absolute `http`/`https` URLs with a host.
///
/// The original string is kept (trimmed) rather than the re-serialized URL so
/// that queue payloads and stored source lists stay byte-identical.
pub fn normalize_image_url(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|err| DomainError::validation("images", format!("`{trimmed}`: {err}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DomainError::validation(
                "images",
                format!("`{trimmed}`: unsupported scheme `{other}`"),
            ));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(DomainError::validation(
            "images",
            format!("`{trimmed}`: missing host"),
        ));
    }

    Ok(trimmed.to_string())
}

/// Storage reference of the compressed artifact produced for `image_url`.
///
/// The name depends only on the owning product and the source URL, so a
/// replayed work item lands on the same file and the same list entry.
pub fn artifact_reference(product_id: i64, image_url: &str) -> String {
    let digest = Sha256::digest(image_url.as_bytes());
    format!("products/{product_id}/{}.jpg", hex::encode(digest.as_slice()))
}

/// Artifact references that remain valid for the given source image list.
pub fn retained_artifacts(product_id: i64, images: &[String]) -> Vec<String> {
    images
        .iter()
        .map(|url| artifact_reference(product_id, url))
        .collect()
}
