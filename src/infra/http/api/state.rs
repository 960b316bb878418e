use std::sync::Arc;

use async_trait::async_trait;

use crate::application::products::ProductService;
use crate::application::repos::JobsRepo;
use crate::infra::artifacts::ArtifactStorage;
use crate::infra::db::PostgresRepositories;

/// Liveness probe for the backing database.
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl DatabaseHealth for PostgresRepositories {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        PostgresRepositories::health_check(self).await
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub products: Arc<ProductService>,
    pub jobs: Arc<dyn JobsRepo>,
    pub artifacts: Arc<ArtifactStorage>,
    pub db: Arc<dyn DatabaseHealth>,
}
