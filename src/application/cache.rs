//! Read-through cache contract for product snapshots.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::entities::ProductRecord;

const SOURCE: &str = "application::cache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Key under which a product snapshot is stored: the decimal identifier.
pub fn cache_key(id: i64) -> String {
    id.to_string()
}

#[async_trait]
pub trait ProductCache: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<ProductRecord>, CacheError>;

    async fn put(&self, product: &ProductRecord) -> Result<(), CacheError>;

    async fn invalidate(&self, id: i64) -> Result<(), CacheError>;
}

/// Drop a cached snapshot, logging instead of failing when the backend errors.
pub async fn invalidate_product(cache: &dyn ProductCache, id: i64) {
    if let Err(err) = cache.invalidate(id).await {
        metrics::counter!("vitrine_product_cache_error_total").increment(1);
        warn!(
            target = SOURCE,
            product_id = id,
            error = %err,
            "failed to invalidate cached product"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_decimal_identifier() {
        assert_eq!(cache_key(42), "42");
        assert_eq!(cache_key(-1), "-1");
    }
}
