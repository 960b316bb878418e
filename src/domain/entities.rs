//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::{JobState, JobType};

/// A catalog product as stored in the `products` table.
///
/// `compressed_images` only ever holds artifact references derived from an
/// entry of `images` (see [`crate::domain::products::artifact_reference`]);
/// its order follows completion order, not source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub compressed_images: Vec<String>,
    pub price: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ProductRecord {
    pub fn has_source_image(&self, url: &str) -> bool {
        self.images.iter().any(|image| image == url)
    }

    pub fn has_compressed_image(&self, reference: &str) -> bool {
        self.compressed_images.iter().any(|image| image == reference)
    }
}

/// Snapshot of a row in the job queue table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub run_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub done_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}
