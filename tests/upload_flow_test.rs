//! End-to-end upload flow
//!
//! Engine with the real image compressor and HTTP transport against a mock
//! storage service.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use upload_orchestrator::{Config, SourceFile, UploadEngine, UploadStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers every upload with a distinct object URL
struct NumberedUrls(AtomicUsize);

impl Respond for NumberedUrls {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"url": format!("https://cdn.test/objects/{n}")}))
    }
}

fn engine_for(server: &MockServer) -> UploadEngine {
    let mut config = Config::with_base_url(server.uri());
    config.metrics.enabled = false;
    config.transport.chunk_size = 256;
    UploadEngine::from_config(&config).unwrap()
}

/// Noisy PNG that JPEG re-encoding reliably shrinks
fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
        image::Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

async fn wait_idle(engine: &UploadEngine) -> upload_orchestrator::RegistrySnapshot {
    tokio::time::timeout(Duration::from_secs(10), engine.wait_idle())
        .await
        .expect("uploads did not settle")
}

#[tokio::test]
async fn test_batch_uploads_to_storage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(NumberedUrls(AtomicUsize::new(0)))
        .expect(3)
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let ids = engine.add_uploads(vec![
        SourceFile::new("a.txt", vec![b'a'; 100]),
        SourceFile::new("b.txt", vec![b'b'; 200]),
        SourceFile::new("c.txt", vec![b'c'; 300]),
    ]);

    let snapshot = wait_idle(&engine).await;
    assert_eq!(snapshot.count_by_status(UploadStatus::Success), 3);
    assert_eq!(snapshot.progress().global_percentage, 100);

    let mut urls: Vec<_> = ids
        .iter()
        .map(|id| snapshot.get(id).unwrap().remote_url.clone().unwrap())
        .collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 3);

    for id in &ids {
        let job = snapshot.get(id).unwrap();
        // Text passes through compression untouched
        assert_eq!(job.compressed_size_bytes, Some(job.original_size_bytes));
        assert_eq!(job.uploaded_size_bytes, job.original_size_bytes);
    }
}

#[tokio::test]
async fn test_large_image_is_compressed_before_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(NumberedUrls(AtomicUsize::new(0)))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let original = png(1600, 1200);
    let ids = engine.add_uploads(vec![
        SourceFile::new("big.png", original.clone()).with_content_type("image/png")
    ]);

    let snapshot = wait_idle(&engine).await;
    let job = snapshot.get(&ids[0]).unwrap();
    assert_eq!(job.status, UploadStatus::Success);
    assert_eq!(job.original_size_bytes, original.len() as u64);

    let compressed = job.compressed_size_bytes.unwrap();
    assert!(compressed > 0);
    assert_eq!(job.uploaded_size_bytes, compressed);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("image/jpeg"));
}

#[tokio::test]
async fn test_storage_failure_then_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(NumberedUrls(AtomicUsize::new(0)))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let ids = engine.add_uploads(vec![SourceFile::new("flaky.txt", "payload")]);

    let failed = wait_idle(&engine).await;
    let job = failed.get(&ids[0]).unwrap();
    assert_eq!(job.status, UploadStatus::Error);
    assert_eq!(job.remote_url, None);

    engine.retry_upload(&ids[0]);
    let done = wait_idle(&engine).await;
    let job = done.get(&ids[0]).unwrap();
    assert_eq!(job.status, UploadStatus::Success);
    assert_eq!(job.attempt, 2);
    assert_eq!(job.remote_url.as_deref(), Some("https://cdn.test/objects/0"));
}

#[tokio::test]
async fn test_cancel_slow_storage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"url": "https://cdn.test/late"}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let ids = engine.add_uploads(vec![SourceFile::new("slow.txt", vec![b'x'; 512])]);

    // Wait until the body has been handed to the connection
    let mut rx = engine.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.get(&ids[0]).map(|j| j.uploaded_size_bytes) == Some(512)),
    )
    .await
    .expect("body was not sent")
    .unwrap();

    engine.cancel_upload(&ids[0]);

    let snapshot = wait_idle(&engine).await;
    let job = snapshot.get(&ids[0]).unwrap();
    assert_eq!(job.status, UploadStatus::Canceled);
    assert_eq!(job.remote_url, None);
}
