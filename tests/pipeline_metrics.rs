mod support;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use vitrine::application::jobs::{
    CompressImageJob, FetchError, ImageFetcher, ImagePipeline, PipelineSettings, RetryConfig,
    handle_compress_image_job,
};
use vitrine::application::products::ProductService;
use vitrine::application::repos::ProductsWriteRepo;
use vitrine::domain::products::ProductDraft;
use vitrine::infra::artifacts::ArtifactStorage;
use vitrine::infra::cache::MemoryProductCache;

use support::{InMemoryCatalog, RecordingJobs, png_fixture};

struct CannedFetcher;

#[async_trait]
impl ImageFetcher for CannedFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        if url.ends_with("ok.png") {
            Ok(Bytes::from(png_fixture(16, 16)))
        } else {
            Err(FetchError::Status { status: 404 })
        }
    }
}

#[tokio::test]
async fn pipeline_and_cache_paths_emit_expected_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = InMemoryCatalog::shared();
    let cache = Arc::new(MemoryProductCache::new(
        NonZeroUsize::new(8).expect("non-zero"),
    ));
    let artifacts = Arc::new(ArtifactStorage::new(dir.path().to_path_buf()).expect("artifacts"));
    let pipeline = ImagePipeline::new(
        catalog.clone(),
        catalog.clone(),
        cache.clone(),
        Arc::new(CannedFetcher),
        artifacts,
        PipelineSettings {
            retry: RetryConfig::none(),
            ..PipelineSettings::default()
        },
    );
    let service = ProductService::new(
        catalog.clone(),
        catalog.clone(),
        RecordingJobs::shared(),
        cache,
    );

    let ok = "https://img.test/ok.png".to_string();
    let missing = "https://img.test/missing.png".to_string();
    let product = catalog
        .create_product(&ProductDraft {
            user_id: 1,
            name: "Mug".to_string(),
            description: String::new(),
            images: vec![ok.clone(), missing.clone()],
            price: 8.0,
        })
        .await
        .expect("create product");

    for image_url in [&ok, &missing] {
        let _ = handle_compress_image_job(
            &pipeline,
            &CompressImageJob {
                product_id: product.id,
                image_url: image_url.clone(),
            },
        )
        .await;
    }

    service.get(product.id).await.expect("cache miss");
    service.get(product.id).await.expect("cache hit");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "vitrine_image_jobs_total",
        "vitrine_image_job_failures_total",
        "vitrine_image_job_ms",
        "vitrine_product_cache_hit_total",
        "vitrine_product_cache_miss_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }

    let counter = |name: &str, label: (&str, &str)| -> u64 {
        snapshot
            .iter()
            .find(|(composite_key, _, _, _)| {
                let key = composite_key.key();
                key.name() == name
                    && key
                        .labels()
                        .any(|l| l.key() == label.0 && l.value() == label.1)
            })
            .and_then(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    };

    assert_eq!(counter("vitrine_image_jobs_total", ("outcome", "compressed")), 1);
    assert_eq!(counter("vitrine_image_jobs_total", ("outcome", "failed")), 1);
    assert_eq!(
        counter("vitrine_image_job_failures_total", ("stage", "fetch")),
        1
    );
}
