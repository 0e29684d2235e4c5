//! Tests for the downloader module against local mock mirrors

use super::*;
use crate::downloader::core::files::create_temp_path;
use crate::task::{task_fn, TaskContext, TaskError};
use sha1::{Digest, Sha1};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const LIBRARY_BYTES: &[u8] = b"library jar bytes served by the mirror";

fn test_downloader() -> DefaultDownloader {
    let config = DownloadConfigBuilder::new().no_backoff().build();
    DefaultDownloader::new(config).unwrap()
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

fn assert_no_partial(dest: &Path) {
    assert!(!dest.exists(), "destination should not exist");
    assert!(!create_temp_path(dest).exists(), "partial file should be removed");
}

#[tokio::test]
async fn test_mirror_fallback_after_server_error() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount(&primary, "/lib.jar", ResponseTemplate::new(500), 1).await;
    mount(&mirror, "/lib.jar", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("libraries/lib.jar");
    let request = DownloadRequest::new(format!("{}/lib.jar", primary.uri()), &dest)
        .with_mirror_url(format!("{}/lib.jar", mirror.uri()));

    let downloader = test_downloader();
    downloader.download_file(&request).await.unwrap();

    assert_eq!(tokio::fs::read(&dest).await.unwrap(), LIBRARY_BYTES);
    let metrics = downloader.metrics().snapshot();
    assert_eq!(metrics.mirror_fallbacks, 1);
    assert_eq!(metrics.successful_downloads, 1);
}

#[tokio::test]
async fn test_last_candidate_error_is_returned() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount(&primary, "/a.json", ResponseTemplate::new(404), 1).await;
    mount(&mirror, "/a.json", ResponseTemplate::new(403), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("a.json");
    let request = DownloadRequest::from_candidates(
        [format!("{}/a.json", primary.uri()), format!("{}/a.json", mirror.uri())],
        &dest,
    );

    let result = test_downloader().download_file(&request).await;
    match result {
        Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 403),
        other => panic!("Expected the mirror's status error, got {:?}", other),
    }
    assert_no_partial(&dest);
}

#[tokio::test]
async fn test_cancellation_skips_remaining_mirrors() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount(&primary, "/big.bin", ResponseTemplate::new(200).set_body_bytes(vec![1u8; 256 * 1024]), 1).await;
    mount(&mirror, "/big.bin", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 0).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("big.bin");
    let request = DownloadRequest::new(format!("{}/big.bin", primary.uri()), &dest)
        .with_mirror_url(format!("{}/big.bin", mirror.uri()))
        .with_progress(|_: &TransferProgress| ProgressControl::Cancel);

    let result = test_downloader().download_file(&request).await;

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert_no_partial(&dest);
}

#[tokio::test]
async fn test_checksum_mismatch_tries_next_mirror() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount(&primary, "/lib.jar", ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()), 1).await;
    mount(&mirror, "/lib.jar", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("lib.jar");
    let request = DownloadRequest::new(format!("{}/lib.jar", primary.uri()), &dest)
        .with_mirror_url(format!("{}/lib.jar", mirror.uri()))
        .with_checksum(Checksum::sha1(sha1_hex(LIBRARY_BYTES)));

    test_downloader().download_file(&request).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), LIBRARY_BYTES);
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_no_partial_file() {
    let server = MockServer::start().await;
    mount(&server, "/lib.jar", ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("lib.jar");
    let request = DownloadRequest::new(format!("{}/lib.jar", server.uri()), &dest)
        .with_checksum(Checksum::sha1(sha1_hex(LIBRARY_BYTES)));

    let result = test_downloader().download_file(&request).await;

    match result {
        Err(DownloadError::ChecksumMismatch { file, expected, .. }) => {
            assert_eq!(file, dest);
            assert_eq!(expected, sha1_hex(LIBRARY_BYTES));
        }
        other => panic!("Expected ChecksumMismatch, got {:?}", other),
    }
    assert_no_partial(&dest);
}

#[tokio::test]
async fn test_unsupported_algorithm_is_not_mirror_retried() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount(&primary, "/x.bin", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;
    mount(&mirror, "/x.bin", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 0).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.bin");
    let request = DownloadRequest::new(format!("{}/x.bin", primary.uri()), &dest)
        .with_mirror_url(format!("{}/x.bin", mirror.uri()))
        .with_checksum(Checksum::new("crc7", "00"));

    let result = test_downloader().download_file(&request).await;
    assert!(matches!(result, Err(DownloadError::UnsupportedAlgorithm { .. })));
}

#[tokio::test]
async fn test_transient_failures_are_retried_on_same_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount(&server, "/flaky.json", ResponseTemplate::new(200).set_body_string("{}"), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("flaky.json");
    let request = DownloadRequest::new(format!("{}/flaky.json", server.uri()), &dest).with_retry(2);

    let downloader = test_downloader();
    downloader.download_file(&request).await.unwrap();

    let metrics = downloader.metrics().snapshot();
    assert_eq!(metrics.retries_attempted, 2);
    assert_eq!(metrics.mirror_fallbacks, 0);
}

#[tokio::test]
async fn test_pause_handle_is_registered_per_candidate() {
    let server = MockServer::start().await;
    mount(&server, "/p.bin", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;

    let dir = tempdir().unwrap();
    let registrations = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorded = registrations.clone();
    let request = DownloadRequest::new(format!("{}/p.bin", server.uri()), dir.path().join("p.bin"))
        .with_pausable(move |handle: Option<PauseHandle>| recorded.lock().unwrap().push(handle.is_some()));

    test_downloader().download_file(&request).await.unwrap();
    assert_eq!(*registrations.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_batch_respects_concurrency_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let items = (0..10)
        .map(|i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let completed = completed.clone();
            WorkItem::new(
                task_fn(format!("item-{}", i), move |_ctx: TaskContext| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    let completed = completed.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                1,
            )
        })
        .collect();

    let ctx = TaskContext::new("batch");
    let policy = DownloadPolicy::new().with_max_concurrency(3);
    run_batch(&ctx, items, &policy, |_| String::new()).await.unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 10);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
    assert_eq!(ctx.progress(), 10);
    assert_eq!(ctx.total(), Some(10));
}

fn outcome_item(name: &str, fail: bool, ran: Arc<AtomicUsize>) -> WorkItem {
    WorkItem::new(
        task_fn(name.to_string(), move |_ctx: TaskContext| {
            let ran = ran.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(TaskError::Other(anyhow::anyhow!("mirror unreachable")))
                } else {
                    Ok(())
                }
            }
        }),
        1,
    )
}

#[tokio::test]
async fn test_batch_aggregates_all_failures() {
    let ran = Arc::new(AtomicUsize::new(0));
    let items = [false, true, false, true, false]
        .iter()
        .enumerate()
        .map(|(i, fail)| outcome_item(&format!("item-{}", i), *fail, ran.clone()))
        .collect();

    let ctx = TaskContext::new("batch");
    let result = run_batch(&ctx, items, &DownloadPolicy::default(), |errors| {
        format!("{} items failed", errors.len())
    })
    .await;

    match result {
        Err(BatchError::Aggregated(aggregated)) => {
            assert_eq!(aggregated.len(), 2);
            assert_eq!(aggregated.message(), "2 items failed");
        }
        other => panic!("Expected aggregated failure, got {:?}", other),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 5);
    assert_eq!(ctx.progress(), 3);
}

#[tokio::test]
async fn test_fail_fast_surfaces_first_failure() {
    let ran = Arc::new(AtomicUsize::new(0));
    let items = vec![
        outcome_item("broken", true, ran.clone()),
        outcome_item("a", false, ran.clone()),
        outcome_item("b", false, ran.clone()),
    ];

    let ctx = TaskContext::new("batch");
    let policy = DownloadPolicy::new().with_fail_fast(true).with_max_concurrency(1);
    let result = run_batch(&ctx, items, &policy, |_| String::new()).await;

    match result {
        Err(BatchError::Task(TaskError::Other(e))) => assert!(e.to_string().contains("unreachable")),
        other => panic!("Expected the task failure, got {:?}", other),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fail_fast_abandons_in_flight_items() {
    let completed = Arc::new(AtomicUsize::new(0));
    let items = [false, true, false, true, false]
        .iter()
        .enumerate()
        .map(|(i, fail)| {
            let fail = *fail;
            let completed = completed.clone();
            WorkItem::new(
                task_fn(format!("item-{}", i), move |_ctx: TaskContext| {
                    let completed = completed.clone();
                    async move {
                        if fail {
                            return Err(TaskError::Other(anyhow::anyhow!("mirror unreachable")));
                        }
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                1,
            )
        })
        .collect();

    let ctx = TaskContext::new("batch");
    let policy = DownloadPolicy::new().with_fail_fast(true).with_max_concurrency(2);
    let result = run_batch(&ctx, items, &policy, |_| String::new()).await;

    match result {
        Err(BatchError::Task(TaskError::Other(e))) => assert!(e.to_string().contains("unreachable")),
        other => panic!("Expected the first task failure, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.progress(), 0);
}

/// Registers a pause handle, then holds the transfer open until released
#[derive(Default)]
struct HeldDownloader {
    handle: std::sync::Mutex<Option<PauseHandle>>,
    registered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait::async_trait]
impl Downloader for HeldDownloader {
    async fn download_file(&self, request: &DownloadRequest) -> Result<()> {
        let (handle, _gate) = crate::downloader::core::pause_pair();
        if let Some(register) = &request.pausable {
            register(Some(handle.clone()));
        }
        *self.handle.lock().unwrap() = Some(handle);
        self.registered.notify_one();

        self.release.notified().await;
        tokio::fs::write(&request.destination, LIBRARY_BYTES)
            .await
            .map_err(|e| DownloadError::fs(&request.destination, FileOperation::Write, e))
    }
}

#[tokio::test]
async fn test_batch_context_pauses_live_transfer() {
    let dir = tempdir().unwrap();
    let held = Arc::new(HeldDownloader::default());
    let policy = DownloadPolicy::new().with_downloader(held.clone());
    let ctx = TaskContext::new("libraries");

    let control = async {
        tokio::time::timeout(Duration::from_secs(5), held.registered.notified())
            .await
            .unwrap();
        let handle = held.handle.lock().unwrap().clone().unwrap();

        assert!(ctx.pause());
        assert!(handle.is_paused());
        assert!(ctx.resume());
        assert!(!handle.is_paused());

        held.release.notify_one();
    };

    let requests = vec![DownloadRequest::new("http://unused/lib.jar", dir.path().join("lib.jar"))];
    let (result, ()) = tokio::join!(download_all(&ctx, requests, &policy), control);
    result.unwrap();

    // The finished child is no longer reachable.
    assert!(!ctx.pause());
    assert_eq!(ctx.progress(), 1);
}

#[tokio::test]
async fn test_cancellation_is_never_aggregated() {
    let items = vec![WorkItem::new(
        task_fn("cancelled", |_ctx: TaskContext| async move { Err(TaskError::Cancelled) }),
        1,
    )];

    let ctx = TaskContext::new("batch");
    let result = run_batch(&ctx, items, &DownloadPolicy::default(), |_| String::new()).await;

    assert!(matches!(result, Err(ref e) if e.is_cancelled()));
}

#[tokio::test]
async fn test_download_all_is_idempotent() {
    let server = MockServer::start().await;
    mount(&server, "/lib.jar", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("libraries/lib.jar");
    let request = DownloadRequest::new(format!("{}/lib.jar", server.uri()), &dest)
        .with_checksum(Checksum::sha1(sha1_hex(LIBRARY_BYTES)));

    let policy = DownloadPolicy::new().with_downloader(Arc::new(test_downloader()));

    download_all(&TaskContext::new("first"), vec![request.clone()], &policy).await.unwrap();
    download_all(&TaskContext::new("second"), vec![request], &policy).await.unwrap();

    assert_eq!(tokio::fs::read(&dest).await.unwrap(), LIBRARY_BYTES);
}

#[tokio::test]
async fn test_download_all_reports_partial_failure() {
    let server = MockServer::start().await;
    mount(&server, "/a.jar", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;
    mount(&server, "/b.jar", ResponseTemplate::new(404), 1).await;
    mount(&server, "/c.jar", ResponseTemplate::new(200).set_body_bytes(LIBRARY_BYTES), 1).await;

    let dir = tempdir().unwrap();
    let requests = ["a.jar", "b.jar", "c.jar"]
        .iter()
        .map(|name| DownloadRequest::new(format!("{}/{}", server.uri(), name), dir.path().join(name)))
        .collect();

    let policy = DownloadPolicy::new().with_downloader(Arc::new(test_downloader()));
    let result = download_all(&TaskContext::new("libraries"), requests, &policy).await;

    match result {
        Err(BatchError::Aggregated(aggregated)) => {
            assert_eq!(aggregated.to_string(), "1 of 3 downloads failed");
            assert!(matches!(
                aggregated.errors()[0].as_download(),
                Some(DownloadError::HttpStatus { status: 404, .. })
            ));
        }
        other => panic!("Expected aggregated failure, got {:?}", other),
    }
    assert!(dir.path().join("a.jar").exists());
    assert!(dir.path().join("c.jar").exists());
}

#[tokio::test]
async fn test_download_file_task_uses_policy_overwrite() {
    let server = MockServer::start().await;
    mount(&server, "/versions.json", ResponseTemplate::new(200).set_body_string("[]"), 1).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("versions.json");
    tokio::fs::write(&dest, b"stale").await.unwrap();

    let policy = DownloadPolicy::new()
        .with_overwrite(OverwritePolicy::Always)
        .with_downloader(Arc::new(test_downloader()));
    let task = download_file_task(DownloadRequest::new(format!("{}/versions.json", server.uri()), &dest), &policy)
        .unwrap();

    TaskContext::new("root").execute(&task, 1).await.unwrap();
    assert_eq!(tokio::fs::read_to_string(&dest).await.unwrap(), "[]");
}
