use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, warn};

use crate::{
    application::cache::{CacheError, ProductCache, cache_key},
    domain::entities::ProductRecord,
};

const SOURCE: &str = "infra::cache::redis";

/// Redis-backed product cache. Entries are JSON snapshots without a TTL.
#[derive(Clone)]
pub struct RedisProductCache {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisProductCache {
    /// Open a managed connection; fails when the server is unreachable.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(CacheError::backend)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(CacheError::backend)?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, id: i64) -> String {
        format!("{}{}", self.key_prefix, cache_key(id))
    }
}

#[async_trait]
impl ProductCache for RedisProductCache {
    async fn get(&self, id: i64) -> Result<Option<ProductRecord>, CacheError> {
        let key = self.key(id);
        let mut conn = self.connection.clone();
        let data: Option<String> = conn.get(&key).await.map_err(CacheError::backend)?;

        let Some(data) = data else {
            debug!(target = SOURCE, key = %key, "cache miss");
            return Ok(None);
        };

        match serde_json::from_str::<ProductRecord>(&data) {
            Ok(product) => Ok(Some(product)),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    key = %key,
                    error = %err,
                    "dropping undecodable cache entry"
                );
                let _ = conn.del::<_, ()>(&key).await;
                Ok(None)
            }
        }
    }

    async fn put(&self, product: &ProductRecord) -> Result<(), CacheError> {
        let data = serde_json::to_string(product).map_err(CacheError::serialization)?;
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(self.key(product.id), data)
            .await
            .map_err(CacheError::backend)
    }

    async fn invalidate(&self, id: i64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.key(id))
            .await
            .map_err(CacheError::backend)
    }
}
