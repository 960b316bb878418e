use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use lru::LruCache;
use tracing::warn;

use crate::{
    application::cache::{CacheError, ProductCache},
    domain::entities::ProductRecord,
};

const SOURCE: &str = "infra::cache::memory";

/// In-process LRU product cache, used when no Redis URL is configured.
pub struct MemoryProductCache {
    entries: RwLock<LruCache<i64, ProductRecord>>,
}

impl MemoryProductCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // LRU reads promote the entry, so every access takes the write lock.
    fn lock(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<i64, ProductRecord>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = SOURCE,
                    lock_kind = "rwlock.write",
                    result = "poisoned_recovered",
                    hint = "state may be stale after panic in another thread",
                    "Recovered from poisoned cache lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl ProductCache for MemoryProductCache {
    async fn get(&self, id: i64) -> Result<Option<ProductRecord>, CacheError> {
        Ok(self.lock("get").get(&id).cloned())
    }

    async fn put(&self, product: &ProductRecord) -> Result<(), CacheError> {
        self.lock("put").put(product.id, product.clone());
        Ok(())
    }

    async fn invalidate(&self, id: i64) -> Result<(), CacheError> {
        self.lock("invalidate").pop(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn product(id: i64) -> ProductRecord {
        ProductRecord {
            id,
            user_id: 1,
            name: format!("product {id}"),
            description: String::new(),
            images: Vec::new(),
            compressed_images: Vec::new(),
            price: 1.0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn cache(capacity: usize) -> MemoryProductCache {
        MemoryProductCache::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[tokio::test]
    async fn put_get_invalidate() {
        let cache = cache(4);
        cache.put(&product(1)).await.expect("put");
        assert_eq!(cache.get(1).await.expect("get"), Some(product(1)));

        cache.invalidate(1).await.expect("invalidate");
        assert_eq!(cache.get(1).await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let cache = cache(2);
        cache.put(&product(1)).await.expect("put");
        cache.put(&product(2)).await.expect("put");
        // touch 1 so 2 becomes the eviction candidate
        cache.get(1).await.expect("get");
        cache.put(&product(3)).await.expect("put");

        assert!(cache.get(1).await.expect("get").is_some());
        assert!(cache.get(2).await.expect("get").is_none());
        assert_eq!(cache.len(), 2);
    }
}
