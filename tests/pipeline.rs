mod support;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tempfile::TempDir;

use vitrine::application::cache::ProductCache;
use apalis::prelude::{Data, Error as ApalisError};

use vitrine::application::jobs::{
    CompressImageJob, CompressOutcome, FetchError, ImagePipeline, JobWorkerContext, PipelineError,
    PipelineSettings, RetryConfig, handle_compress_image_job, process_compress_image_job,
};
use vitrine::application::repos::{ProductsRepo, ProductsWriteRepo};
use vitrine::domain::entities::ProductRecord;
use vitrine::domain::products::{ProductDraft, artifact_reference};
use vitrine::infra::artifacts::ArtifactStorage;
use vitrine::infra::cache::MemoryProductCache;
use vitrine::infra::fetch::HttpImageFetcher;

use support::{InMemoryCatalog, jpeg_fixture, png_fixture};

#[derive(Clone, Default)]
struct Origin {
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Origin {
    fn hits(&self, name: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

async fn serve_image(State(origin): State<Origin>, Path(name): Path<String>) -> Response {
    *origin
        .hits
        .lock()
        .expect("hits lock")
        .entry(name.clone())
        .or_default() += 1;

    match name.as_str() {
        "ok.png" => png_fixture(100, 100).into_response(),
        "photo.jpg" => jpeg_fixture(64, 48).into_response(),
        "garbage.png" => b"definitely not an image".to_vec().into_response(),
        "flaky.png" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Spawn a local image origin and return its base URL.
async fn spawn_origin() -> (String, Origin) {
    let origin = Origin::default();
    let app = Router::new()
        .route("/images/{name}", get(serve_image))
        .with_state(origin.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/images"), origin)
}

struct Fixture {
    pipeline: Arc<ImagePipeline>,
    catalog: Arc<InMemoryCatalog>,
    cache: Arc<MemoryProductCache>,
    artifacts: Arc<ArtifactStorage>,
    base: String,
    origin: Origin,
    _dir: TempDir,
}

async fn fixture_with_limit(max_body_bytes: u64) -> Fixture {
    let (base, origin) = spawn_origin().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = InMemoryCatalog::shared();
    let cache = Arc::new(MemoryProductCache::new(
        NonZeroUsize::new(8).expect("non-zero"),
    ));
    let artifacts = Arc::new(ArtifactStorage::new(dir.path().to_path_buf()).expect("artifacts"));
    let fetcher = Arc::new(
        HttpImageFetcher::new(Duration::from_secs(5), max_body_bytes, "vitrine-tests")
            .expect("fetcher"),
    );

    let pipeline = Arc::new(ImagePipeline::new(
        catalog.clone(),
        catalog.clone(),
        cache.clone(),
        fetcher,
        artifacts.clone(),
        PipelineSettings {
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                jitter: true,
            },
            max_pixels: 1_000_000,
        },
    ));

    Fixture {
        pipeline,
        catalog,
        cache,
        artifacts,
        base,
        origin,
        _dir: dir,
    }
}

async fn fixture() -> Fixture {
    fixture_with_limit(1 << 20).await
}

impl Fixture {
    fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.base)
    }

    async fn product(&self, images: Vec<String>) -> ProductRecord {
        self.catalog
            .create_product(&ProductDraft {
                user_id: 1,
                name: "Poster".to_string(),
                description: String::new(),
                images,
                price: 12.0,
            })
            .await
            .expect("create product")
    }

    async fn run(
        &self,
        product_id: i64,
        image_url: &str,
    ) -> Result<CompressOutcome, PipelineError> {
        handle_compress_image_job(
            &self.pipeline,
            &CompressImageJob {
                product_id,
                image_url: image_url.to_string(),
            },
        )
        .await
    }
}

#[tokio::test]
async fn compresses_png_into_deterministic_jpeg_artifact() {
    let f = fixture().await;
    let url = f.url("ok.png");
    let product = f.product(vec![url.clone()]).await;

    let outcome = f.run(product.id, &url).await.expect("pipeline succeeds");

    let expected = artifact_reference(product.id, &url);
    assert_eq!(
        outcome,
        CompressOutcome::Compressed {
            reference: expected.clone()
        }
    );

    let stored = f.artifacts.read(&expected).await.expect("artifact stored");
    assert_eq!(
        image::guess_format(&stored).expect("known format"),
        image::ImageFormat::Jpeg
    );
    let decoded = image::load_from_memory(&stored).expect("artifact decodes");
    assert_eq!((decoded.width(), decoded.height()), (100, 100));

    let saved = f.catalog.snapshot(product.id).await.expect("product");
    assert_eq!(saved.compressed_images, vec![expected]);
}

#[tokio::test]
async fn accepts_jpeg_sources() {
    let f = fixture().await;
    let url = f.url("photo.jpg");
    let product = f.product(vec![url.clone()]).await;

    let outcome = f.run(product.id, &url).await.expect("pipeline succeeds");
    assert!(matches!(outcome, CompressOutcome::Compressed { .. }));
}

#[tokio::test]
async fn replayed_item_records_reference_once() {
    let f = fixture().await;
    let url = f.url("ok.png");
    let product = f.product(vec![url.clone()]).await;

    f.run(product.id, &url).await.expect("first run");
    let second = f.run(product.id, &url).await.expect("second run");

    assert_eq!(second, CompressOutcome::AlreadyRecorded);
    assert_eq!(f.origin.hits("ok.png"), 1);
    let saved = f.catalog.snapshot(product.id).await.expect("product");
    assert_eq!(saved.compressed_images.len(), 1);
}

#[tokio::test]
async fn concurrent_items_for_one_product_all_land() {
    let f = fixture().await;
    let urls: Vec<String> = (1..=4)
        .map(|n| format!("{}?variant={n}", f.url("ok.png")))
        .collect();
    let product = f.product(urls.clone()).await;

    let results = futures::future::join_all(urls.iter().map(|url| f.run(product.id, url))).await;
    assert!(results.iter().all(Result::is_ok));

    let saved = f.catalog.snapshot(product.id).await.expect("product");
    let mut recorded = saved.compressed_images.clone();
    recorded.sort();
    let mut expected: Vec<String> = urls
        .iter()
        .map(|url| artifact_reference(product.id, url))
        .collect();
    expected.sort();
    assert_eq!(recorded, expected);
}

#[tokio::test]
async fn missing_upstream_fails_without_retrying() {
    let f = fixture().await;
    let url = f.url("gone.png");
    let product = f.product(vec![url.clone()]).await;

    let err = f.run(product.id, &url).await.expect_err("fetch fails");

    assert!(matches!(
        err,
        PipelineError::Fetch(FetchError::Status { status: 404 })
    ));
    assert_eq!(err.stage(), "fetch");
    assert_eq!(f.origin.hits("gone.png"), 1);
    let saved = f.catalog.snapshot(product.id).await.expect("product");
    assert!(saved.compressed_images.is_empty());
}

#[tokio::test]
async fn unavailable_upstream_is_retried_then_reported() {
    let f = fixture().await;
    let url = f.url("flaky.png");
    let product = f.product(vec![url.clone()]).await;

    let err = f.run(product.id, &url).await.expect_err("fetch fails");

    assert!(err.is_transient());
    assert_eq!(f.origin.hits("flaky.png"), 3);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let f = fixture_with_limit(64).await;
    let url = f.url("ok.png");
    let product = f.product(vec![url.clone()]).await;

    let err = f.run(product.id, &url).await.expect_err("body too large");
    assert!(matches!(
        err,
        PipelineError::Fetch(FetchError::TooLarge { limit: 64 })
    ));
    assert_eq!(f.origin.hits("ok.png"), 1);
}

#[tokio::test]
async fn undecodable_source_fails_at_decode_stage() {
    let f = fixture().await;
    let url = f.url("garbage.png");
    let product = f.product(vec![url.clone()]).await;

    let err = f.run(product.id, &url).await.expect_err("decode fails");
    assert_eq!(err.stage(), "decode");
    assert!(!err.is_transient());
    assert!(
        f.artifacts
            .read(&artifact_reference(product.id, &url))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn removed_source_and_deleted_owner_are_skipped() {
    let f = fixture().await;
    let url = f.url("ok.png");
    let product = f.product(vec![url.clone()]).await;

    f.catalog
        .replace_product(
            product.id,
            &ProductDraft {
                user_id: 1,
                name: "Poster".to_string(),
                description: String::new(),
                images: Vec::new(),
                price: 12.0,
            },
        )
        .await
        .expect("replace");
    let outcome = f.run(product.id, &url).await.expect("skipped");
    assert_eq!(outcome, CompressOutcome::SourceRemoved);

    let other = f.product(vec![url.clone()]).await;
    f.catalog.delete_product(other.id).await.expect("delete");
    let outcome = f.run(other.id, &url).await.expect("skipped");
    assert_eq!(outcome, CompressOutcome::OwnerMissing);

    assert_eq!(f.origin.hits("ok.png"), 0);
}

#[tokio::test]
async fn successful_append_invalidates_cached_product() {
    let f = fixture().await;
    let url = f.url("ok.png");
    let product = f.product(vec![url.clone()]).await;
    let cached = f
        .catalog
        .find_product(product.id)
        .await
        .expect("find")
        .expect("exists");
    f.cache.put(&cached).await.expect("prime cache");

    f.run(product.id, &url).await.expect("pipeline succeeds");

    assert!(f.cache.get(product.id).await.expect("cache read").is_none());
}

#[tokio::test]
async fn worker_fails_missing_item_and_keeps_processing_the_next() {
    let f = fixture().await;
    let gone = f.url("gone.png");
    let ok = f.url("ok.png");
    let product = f.product(vec![gone.clone(), ok.clone()]).await;
    let context = Data::new(JobWorkerContext::new(f.pipeline.clone()));

    let first = process_compress_image_job(
        CompressImageJob {
            product_id: product.id,
            image_url: gone.clone(),
        },
        context.clone(),
    )
    .await;
    match first {
        Err(ApalisError::Failed(err)) => {
            assert!(err.to_string().contains("fetching source image failed"));
        }
        other => panic!("expected a failed job, got {other:?}"),
    }

    process_compress_image_job(
        CompressImageJob {
            product_id: product.id,
            image_url: ok.clone(),
        },
        context,
    )
    .await
    .expect("next item compresses");

    let saved = f.catalog.snapshot(product.id).await.expect("product");
    assert_eq!(
        saved.compressed_images,
        vec![artifact_reference(product.id, &ok)]
    );
    assert_eq!(f.origin.hits("gone.png"), 1);
}
