#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use vitrine::application::pagination::PageRequest;
use vitrine::application::repos::{
    AppendOutcome, JobQueryFilter, JobsRepo, NewJobRecord, ProductQueryFilter, ProductsRepo,
    ProductsWriteRepo, RepoError,
};
use vitrine::domain::entities::{JobRecord, ProductRecord};
use vitrine::domain::products::{ProductDraft, retained_artifacts};
use vitrine::domain::types::JobState;

/// Product store with the same conditional-append semantics as the Postgres one.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<BTreeMap<i64, ProductRecord>>,
    next_id: Mutex<i64>,
}

impl InMemoryCatalog {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn snapshot(&self, id: i64) -> Option<ProductRecord> {
        self.products.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl ProductsRepo for InMemoryCatalog {
    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        Ok(self.products.lock().await.get(&id).cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        let products = self.products.lock().await;
        Ok(products
            .values()
            .filter(|product| filter.matches(product))
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count_products(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError> {
        let products = self.products.lock().await;
        Ok(products
            .values()
            .filter(|product| filter.matches(product))
            .count() as u64)
    }
}

#[async_trait]
impl ProductsWriteRepo for InMemoryCatalog {
    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RepoError> {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let now = OffsetDateTime::now_utc();
        let record = ProductRecord {
            id: *next_id,
            user_id: draft.user_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            images: draft.images.clone(),
            compressed_images: Vec::new(),
            price: draft.price,
            created_at: now,
            updated_at: now,
        };
        self.products.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn replace_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<Option<ProductRecord>, RepoError> {
        let mut products = self.products.lock().await;
        let Some(existing) = products.get_mut(&id) else {
            return Ok(None);
        };

        let retained = retained_artifacts(id, &draft.images);
        existing.user_id = draft.user_id;
        existing.name = draft.name.clone();
        existing.description = draft.description.clone();
        existing.images = draft.images.clone();
        existing.price = draft.price;
        existing
            .compressed_images
            .retain(|reference| retained.contains(reference));
        existing.updated_at = OffsetDateTime::now_utc();
        Ok(Some(existing.clone()))
    }

    async fn delete_product(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.products.lock().await.remove(&id).is_some())
    }

    async fn append_compressed_image(
        &self,
        product_id: i64,
        image_url: &str,
        reference: &str,
    ) -> Result<AppendOutcome, RepoError> {
        let mut products = self.products.lock().await;
        let Some(product) = products.get_mut(&product_id) else {
            return Ok(AppendOutcome::OwnerMissing);
        };
        if !product.has_source_image(image_url) {
            return Ok(AppendOutcome::SourceRemoved);
        }
        if product.has_compressed_image(reference) {
            return Ok(AppendOutcome::AlreadyRecorded);
        }
        product.compressed_images.push(reference.to_string());
        product.updated_at = OffsetDateTime::now_utc();
        Ok(AppendOutcome::Appended(product.clone()))
    }
}

/// Job store that records every enqueued job as pending.
#[derive(Default)]
pub struct RecordingJobs {
    jobs: Mutex<Vec<JobRecord>>,
}

impl RecordingJobs {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn recorded(&self) -> Vec<JobRecord> {
        self.jobs.lock().await.clone()
    }

    pub async fn mark(&self, id: &str, state: JobState, last_error: Option<&str>) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|job| job.id == id) {
            job.state = state;
            job.last_error = last_error.map(str::to_string);
            job.done_at = Some(OffsetDateTime::now_utc());
        }
    }
}

#[async_trait]
impl JobsRepo for RecordingJobs {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.jobs.lock().await.push(JobRecord {
            id: id.clone(),
            job_type: job.job_type,
            payload: job.payload,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            done_at: None,
            last_error: None,
        });
        Ok(id)
    }

    async fn list_jobs(
        &self,
        filter: &JobQueryFilter,
        limit: u32,
    ) -> Result<Vec<JobRecord>, RepoError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .rev()
            .filter(|job| filter.state.is_none_or(|state| state.matches(job.state)))
            .filter(|job| filter.job_type.is_none_or(|kind| job.job_type == kind))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Job store whose queue is always unavailable.
pub struct UnavailableJobs;

#[async_trait]
impl JobsRepo for UnavailableJobs {
    async fn enqueue_job(&self, _job: NewJobRecord) -> Result<String, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn list_jobs(
        &self,
        _filter: &JobQueryFilter,
        _limit: u32,
    ) -> Result<Vec<JobRecord>, RepoError> {
        Err(RepoError::Timeout)
    }
}

/// Encode a solid-colour RGBA PNG of the given size.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 90, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png fixture should encode");
    bytes.into_inner()
}

/// Encode a gradient RGB JPEG of the given size.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut bytes, image::ImageFormat::Jpeg)
        .expect("jpeg fixture should encode");
    bytes.into_inner()
}
