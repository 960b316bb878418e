//! Product CRUD orchestration: validation, store writes, cache upkeep and
//! scheduling of image compression work.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    application::{
        cache::{ProductCache, invalidate_product},
        jobs::enqueue_compress_image_job,
        pagination::{PageRequest, PaginationError},
        repos::{JobsRepo, ProductQueryFilter, ProductsRepo, ProductsWriteRepo, RepoError},
    },
    domain::{
        entities::ProductRecord,
        error::DomainError,
        products::{ProductDraft, validate_price},
    },
};

const SOURCE: &str = "application::products";

#[derive(Debug, Error)]
pub enum ProductServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("product {product_id} was stored but image processing could not be scheduled")]
    Schedule {
        product_id: i64,
        #[source]
        source: RepoError,
    },
}

/// A page of products plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPage {
    pub page: PageRequest,
    pub total: u64,
    pub products: Vec<ProductRecord>,
}

#[derive(Clone)]
pub struct ProductService {
    reader: Arc<dyn ProductsRepo>,
    writer: Arc<dyn ProductsWriteRepo>,
    jobs: Arc<dyn JobsRepo>,
    cache: Arc<dyn ProductCache>,
}

impl ProductService {
    pub fn new(
        reader: Arc<dyn ProductsRepo>,
        writer: Arc<dyn ProductsWriteRepo>,
        jobs: Arc<dyn JobsRepo>,
        cache: Arc<dyn ProductCache>,
    ) -> Self {
        Self {
            reader,
            writer,
            jobs,
            cache,
        }
    }

    /// Store a new product and enqueue one compression job per source image.
    pub async fn create(&self, draft: ProductDraft) -> Result<ProductRecord, ProductServiceError> {
        let draft = draft.validate()?;
        let product = self.writer.create_product(&draft).await?;

        invalidate_product(self.cache.as_ref(), product.id).await;

        for image_url in &product.images {
            enqueue_compress_image_job(self.jobs.as_ref(), product.id, image_url.clone())
                .await
                .map_err(|source| ProductServiceError::Schedule {
                    product_id: product.id,
                    source,
                })?;
        }

        info!(
            target = SOURCE,
            product_id = product.id,
            images = product.images.len(),
            "product created"
        );

        Ok(product)
    }

    /// Cache-first lookup; misses are read from the store and cached.
    pub async fn get(&self, id: i64) -> Result<ProductRecord, ProductServiceError> {
        match self.cache.get(id).await {
            Ok(Some(product)) => {
                metrics::counter!("vitrine_product_cache_hit_total").increment(1);
                return Ok(product);
            }
            Ok(None) => {
                metrics::counter!("vitrine_product_cache_miss_total").increment(1);
            }
            Err(err) => {
                metrics::counter!("vitrine_product_cache_error_total").increment(1);
                warn!(
                    target = SOURCE,
                    product_id = id,
                    error = %err,
                    "cache read failed; falling back to store"
                );
            }
        }

        let product = self
            .reader
            .find_product(id)
            .await?
            .ok_or(DomainError::not_found("product"))?;

        match self.cache.put(&product).await {
            Ok(()) => self.drop_if_stale(&product).await,
            Err(err) => {
                metrics::counter!("vitrine_product_cache_error_total").increment(1);
                warn!(
                    target = SOURCE,
                    product_id = id,
                    error = %err,
                    "failed to populate product cache"
                );
            }
        }

        Ok(product)
    }

    /// A writer can commit and invalidate between our store read and our
    /// `put`. Re-read once after populating and drop the snapshot if the row
    /// has moved on, so a stale entry never outlives the write.
    async fn drop_if_stale(&self, cached: &ProductRecord) {
        match self.reader.find_product(cached.id).await {
            Ok(Some(current)) if current == *cached => {}
            Ok(_) => invalidate_product(self.cache.as_ref(), cached.id).await,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    product_id = cached.id,
                    error = %err,
                    "could not confirm cached product; dropping it"
                );
                invalidate_product(self.cache.as_ref(), cached.id).await;
            }
        }
    }

    pub async fn list(
        &self,
        filter: ProductQueryFilter,
        page: PageRequest,
    ) -> Result<ProductPage, ProductServiceError> {
        let filter = normalize_filter(filter)?;
        let total = self.reader.count_products(&filter).await?;
        let products = self.reader.list_products(&filter, page).await?;

        Ok(ProductPage {
            page,
            total,
            products,
        })
    }

    /// Replace the user-editable fields. Updates never schedule compression.
    pub async fn update(
        &self,
        id: i64,
        draft: ProductDraft,
    ) -> Result<ProductRecord, ProductServiceError> {
        let draft = draft.validate()?;
        let product = self
            .writer
            .replace_product(id, &draft)
            .await?
            .ok_or(DomainError::not_found("product"))?;

        invalidate_product(self.cache.as_ref(), id).await;

        info!(target = SOURCE, product_id = id, "product updated");
        Ok(product)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ProductServiceError> {
        if !self.writer.delete_product(id).await? {
            return Err(DomainError::not_found("product").into());
        }

        invalidate_product(self.cache.as_ref(), id).await;

        info!(target = SOURCE, product_id = id, "product deleted");
        Ok(())
    }
}

fn normalize_filter(filter: ProductQueryFilter) -> Result<ProductQueryFilter, DomainError> {
    if let Some(min) = filter.min_price {
        validate_price(min).map_err(|_| {
            DomainError::validation("min_price", "must be a non-negative number")
        })?;
    }
    if let Some(max) = filter.max_price {
        validate_price(max).map_err(|_| {
            DomainError::validation("max_price", "must be a non-negative number")
        })?;
    }
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price)
        && min > max
    {
        return Err(DomainError::validation(
            "min_price",
            "must not exceed max_price",
        ));
    }

    let name = filter
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    Ok(ProductQueryFilter { name, ..filter })
}
