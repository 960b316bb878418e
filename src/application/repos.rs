//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::PageRequest;
use crate::domain::entities::{JobRecord, ProductRecord};
use crate::domain::products::ProductDraft;
use crate::domain::types::{JobStateFilter, JobType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    /// A `products` CHECK constraint (`products_name_check` or
    /// `products_price_check`) rejected a row that slipped past validation.
    #[error("row violates check constraint `{constraint}`")]
    CheckViolation { constraint: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQueryFilter {
    /// Case-insensitive substring of the product name.
    pub name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ProductQueryFilter {
    pub fn matches(&self, product: &ProductRecord) -> bool {
        if let Some(name) = self.name.as_deref() {
            let needle = name.to_lowercase();
            if !product.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        true
    }
}

/// Result of conditionally recording a compressed artifact on its product.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(ProductRecord),
    AlreadyRecorded,
    /// The product still exists but no longer lists the source URL.
    SourceRemoved,
    OwnerMissing,
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError>;

    /// Matching products ordered by ascending id.
    async fn list_products(
        &self,
        filter: &ProductQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ProductRecord>, RepoError>;

    async fn count_products(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ProductsWriteRepo: Send + Sync {
    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RepoError>;

    /// Replace user-editable fields and drop compressed references whose
    /// source is no longer listed. Returns `None` when the product is gone.
    async fn replace_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<Option<ProductRecord>, RepoError>;

    async fn delete_product(&self, id: i64) -> Result<bool, RepoError>;

    /// Append `reference` to the product's compressed list in one statement,
    /// only while `image_url` is still a source and `reference` is absent.
    async fn append_compressed_image(
        &self,
        product_id: i64,
        image_url: &str,
        reference: &str,
    ) -> Result<AppendOutcome, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct JobQueryFilter {
    pub state: Option<JobStateFilter>,
    pub job_type: Option<JobType>,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;

    /// Most recent jobs first.
    async fn list_jobs(
        &self,
        filter: &JobQueryFilter,
        limit: u32,
    ) -> Result<Vec<JobRecord>, RepoError>;
}
