//! Integration tests for the download manager
//!
//! These tests use wiremock to create mock HTTP servers and drive full
//! start/stop/abort cycles end-to-end against a temporary directory.

use reel_queue::config::{Config, DownloaderConfig, PersistenceConfig, UserAgentConfig};
use reel_queue::queue::QueueStore;
use reel_queue::{DownloadEvent, DownloadManager, FinishReason, ModuleState, UrlState};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upper bound for any run in these tests; retries use zero delay
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates a test configuration rooted in `dir` with no retry delays
fn create_test_config(dir: &Path, max_concurrency: u32, max_retries: u32, breaker: u32) -> Config {
    Config {
        downloader: DownloaderConfig {
            download_directory: dir.join("downloads"),
            max_concurrency,
            max_retries,
            max_consecutive_failures: breaker,
            retry_base_delay_ms: 0,
            retry_jitter_ms: 0,
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestDownloader".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        },
        persistence: PersistenceConfig {
            queue_file: dir.join("queue.json"),
        },
        headers: BTreeMap::new(),
    }
}

async fn mount_file(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn run_to_completion(manager: &DownloadManager) {
    manager.start().await.expect("Failed to start downloads");
    tokio::time::timeout(RUN_TIMEOUT, manager.wait())
        .await
        .expect("Download run did not finish in time");
}

/// Waits until a worker has taken `url`
async fn wait_until_in_flight(manager: &DownloadManager, url: &str) {
    tokio::time::timeout(RUN_TIMEOUT, async {
        while manager.url_state(url) != Some(UrlState::InFlight) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Worker never picked up the URL");
}

async fn mount_slow(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("never delivered")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(server)
        .await;
}

/// Collects every event already sitting in the channel
fn drain_events(rx: &mut broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn finish_reason(events: &[DownloadEvent]) -> Option<FinishReason> {
    events.iter().rev().find_map(|event| match event {
        DownloadEvent::Finished { reason, .. } => Some(*reason),
        _ => None,
    })
}

#[tokio::test]
async fn test_downloads_all_urls_and_drains() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2, 1, 3);
    let download_dir = config.downloader.download_directory.clone();
    let queue_file = config.persistence.queue_file.clone();

    for i in 1..=5 {
        mount_file(&server, &format!("/videos/clip{}.mp4", i), &format!("clip {}", i)).await;
    }

    let manager = DownloadManager::new(config).expect("Failed to create manager");
    let mut events = manager.subscribe();
    for i in 1..=5 {
        assert!(manager.enqueue_url(&format!("{}/videos/clip{}.mp4", server.uri(), i)));
    }
    manager.complete_adding();

    run_to_completion(&manager).await;

    for i in 1..=5 {
        let content = std::fs::read_to_string(download_dir.join(format!("clip{}.mp4", i)))
            .expect("Downloaded file missing");
        assert_eq!(content, format!("clip {}", i));
    }

    assert_eq!(manager.state(), ModuleState::Stopped);
    assert!(manager.pending().is_empty());
    assert!(!queue_file.exists(), "Empty queue must not write a snapshot");

    let stats = manager.stats();
    assert_eq!(stats.downloaded, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.in_flight, 0);

    let events = drain_events(&mut events);
    assert_eq!(finish_reason(&events), Some(FinishReason::Drained));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, DownloadEvent::Downloaded { .. }))
            .count(),
        5
    );

    manager.dispose().await;
}

#[tokio::test]
async fn test_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 2, 0);

    mount_status(&server, "/broken.mp4", 500).await;

    let manager = DownloadManager::new(config).unwrap();
    let mut events = manager.subscribe();
    manager.enqueue_url(&format!("{}/broken.mp4", server.uri()));
    manager.complete_adding();

    run_to_completion(&manager).await;

    // One initial attempt plus max_retries
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let stats = manager.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retries, 2);
    assert!(!manager.is_tracked(&format!("{}/broken.mp4", server.uri())));

    let events = drain_events(&mut events);
    let retry_attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Retrying { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retry_attempts, vec![1, 2]);
    assert!(events
        .iter()
        .any(|e| matches!(e, DownloadEvent::Failed { .. })));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 5, 0);
    let download_dir = config.downloader.download_directory.clone();

    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let manager = DownloadManager::new(config).unwrap();
    manager.enqueue_url(&format!("{}/missing.mp4", server.uri()));
    manager.complete_adding();

    run_to_completion(&manager).await;

    let stats = manager.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retries, 0);
    assert!(!download_dir.join("missing.mp4").exists());
}

#[tokio::test]
async fn test_breaker_aborts_and_persists_remaining() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 0, 3);
    let queue_file = config.persistence.queue_file.clone();

    for i in 1..=5 {
        mount_status(&server, &format!("/gone/{}.mp4", i), 404).await;
    }

    let manager = DownloadManager::new(config).unwrap();
    let mut events = manager.subscribe();
    let urls: Vec<String> = (1..=5)
        .map(|i| format!("{}/gone/{}.mp4", server.uri(), i))
        .collect();
    for url in &urls {
        assert!(manager.enqueue_url(url));
    }
    manager.complete_adding();

    run_to_completion(&manager).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let events = drain_events(&mut events);
    let aborts: Vec<&DownloadEvent> = events
        .iter()
        .filter(|e| matches!(e, DownloadEvent::Aborted { .. }))
        .collect();
    assert_eq!(
        aborts,
        vec![&DownloadEvent::Aborted {
            consecutive_failures: 3
        }]
    );
    assert_eq!(finish_reason(&events), Some(FinishReason::Aborted));

    let saved = QueueStore::new(queue_file).load().unwrap();
    assert_eq!(saved, urls[3..].to_vec());
    assert_eq!(manager.pending(), urls[3..].to_vec());
    assert_eq!(manager.stats().aborts, 1);
}

#[tokio::test]
async fn test_start_after_abort_runs_fresh() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 0, 2);
    let download_dir = config.downloader.download_directory.clone();

    mount_status(&server, "/down/1.mp4", 404).await;
    mount_status(&server, "/down/2.mp4", 404).await;
    mount_file(&server, "/up/3.mp4", "three").await;
    mount_file(&server, "/up/4.mp4", "four").await;

    let manager = DownloadManager::new(config).unwrap();
    let mut events = manager.subscribe();
    for route in ["/down/1.mp4", "/down/2.mp4", "/up/3.mp4", "/up/4.mp4"] {
        manager.enqueue_url(&format!("{}{}", server.uri(), route));
    }
    manager.complete_adding();

    run_to_completion(&manager).await;
    assert_eq!(
        finish_reason(&drain_events(&mut events)),
        Some(FinishReason::Aborted)
    );
    assert_eq!(manager.pending().len(), 2);

    run_to_completion(&manager).await;
    assert_eq!(
        finish_reason(&drain_events(&mut events)),
        Some(FinishReason::Drained)
    );
    assert!(manager.pending().is_empty());
    assert_eq!(
        std::fs::read_to_string(download_dir.join("3.mp4")).unwrap(),
        "three"
    );
    assert_eq!(
        std::fs::read_to_string(download_dir.join("4.mp4")).unwrap(),
        "four"
    );
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 0, 2);

    mount_status(&server, "/a/bad1.mp4", 404).await;
    mount_file(&server, "/a/good1.mp4", "ok").await;
    mount_status(&server, "/a/bad2.mp4", 404).await;
    mount_file(&server, "/a/good2.mp4", "ok").await;
    mount_status(&server, "/a/bad3.mp4", 404).await;

    let manager = DownloadManager::new(config).unwrap();
    let mut events = manager.subscribe();
    for name in ["bad1", "good1", "bad2", "good2", "bad3"] {
        manager.enqueue_url(&format!("{}/a/{}.mp4", server.uri(), name));
    }
    manager.complete_adding();

    run_to_completion(&manager).await;

    let events = drain_events(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, DownloadEvent::Aborted { .. })));
    assert_eq!(finish_reason(&events), Some(FinishReason::Drained));

    let stats = manager.stats();
    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.aborts, 0);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let urls = vec![
        "https://cdn.example.com/a.mp4".to_string(),
        "https://cdn.example.com/b.mp4".to_string(),
        "https://cdn.example.com/c.mp4".to_string(),
    ];

    {
        let manager = DownloadManager::new(create_test_config(dir.path(), 2, 1, 3)).unwrap();
        for url in &urls {
            manager.enqueue_url(url);
        }
        manager.dispose().await;
    }

    let manager = DownloadManager::new(create_test_config(dir.path(), 2, 1, 3)).unwrap();
    assert_eq!(manager.pending(), urls);
    assert!(manager.is_tracked("https://cdn.example.com/b.mp4"));
    assert!(!manager.enqueue_url("https://cdn.example.com/b.mp4"));
    assert_eq!(manager.stats().restored, 3);
}

#[tokio::test]
async fn test_stop_interrupts_in_flight_download() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 1, 3);
    let download_dir = config.downloader.download_directory.clone();
    let queue_file = config.persistence.queue_file.clone();

    mount_slow(&server, "/slow/first.mp4").await;

    let manager = DownloadManager::new(config).unwrap();
    let mut events = manager.subscribe();
    let first = format!("{}/slow/first.mp4", server.uri());
    let rest = vec![
        format!("{}/slow/second.mp4", server.uri()),
        format!("{}/slow/third.mp4", server.uri()),
    ];
    manager.enqueue_url(&first);
    for url in &rest {
        manager.enqueue_url(url);
    }
    manager.start().await.unwrap();

    wait_until_in_flight(&manager, &first).await;

    tokio::time::timeout(Duration::from_secs(5), manager.stop())
        .await
        .expect("Stop waited for the slow download");

    assert_eq!(manager.state(), ModuleState::Stopped);
    assert_eq!(QueueStore::new(queue_file).load().unwrap(), rest);
    assert!(!manager.is_tracked(&first));
    assert!(!download_dir.join("first.mp4").exists());
    assert_eq!(manager.stats().downloaded, 0);

    let events = drain_events(&mut events);
    assert_eq!(finish_reason(&events), Some(FinishReason::Stopped));
}

#[tokio::test]
async fn test_stop_keeps_existing_file_with_same_name() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 0, 0);
    let download_dir = config.downloader.download_directory.clone();

    // A different URL with the same file name finished in an earlier run
    std::fs::create_dir_all(&download_dir).unwrap();
    let existing = download_dir.join("clip.mp4");
    std::fs::write(&existing, "finished earlier").unwrap();

    mount_slow(&server, "/mirror/clip.mp4").await;

    let manager = DownloadManager::new(config).unwrap();
    let url = format!("{}/mirror/clip.mp4", server.uri());
    manager.enqueue_url(&url);
    manager.start().await.unwrap();
    wait_until_in_flight(&manager, &url).await;

    tokio::time::timeout(Duration::from_secs(5), manager.stop())
        .await
        .expect("Stop waited for the slow download");

    assert_eq!(
        std::fs::read_to_string(&existing).unwrap(),
        "finished earlier"
    );
    let leftovers: Vec<_> = std::fs::read_dir(&download_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("clip.mp4")]);
}

#[tokio::test]
async fn test_same_file_name_downloads_do_not_interleave() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2, 0, 0);
    let download_dir = config.downloader.download_directory.clone();

    let first_body = "a".repeat(64 * 1024);
    let second_body = "b".repeat(64 * 1024);
    for (route, body) in [("/a/clip.mp4", &first_body), ("/b/clip.mp4", &second_body)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body.as_str())
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
    }

    let manager = DownloadManager::new(config).unwrap();
    manager.enqueue_url(&format!("{}/a/clip.mp4", server.uri()));
    manager.enqueue_url(&format!("{}/b/clip.mp4", server.uri()));
    manager.complete_adding();

    run_to_completion(&manager).await;

    assert_eq!(manager.stats().downloaded, 2);
    let content = std::fs::read_to_string(download_dir.join("clip.mp4")).unwrap();
    assert!(
        content == first_body || content == second_body,
        "clip.mp4 mixes bytes from both downloads"
    );
    assert_eq!(std::fs::read_dir(&download_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn test_dispose_while_running() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1, 0, 3);
    let queue_file = config.persistence.queue_file.clone();

    mount_slow(&server, "/live/first.mp4").await;

    let manager = DownloadManager::new(config).unwrap();
    let first = format!("{}/live/first.mp4", server.uri());
    let rest = vec![
        format!("{}/live/second.mp4", server.uri()),
        format!("{}/live/third.mp4", server.uri()),
    ];
    manager.enqueue_url(&first);
    for url in &rest {
        manager.enqueue_url(url);
    }
    manager.start().await.unwrap();
    wait_until_in_flight(&manager, &first).await;

    tokio::time::timeout(Duration::from_secs(5), manager.dispose())
        .await
        .expect("Dispose waited for the slow download");

    assert!(manager.is_disposed());
    assert_eq!(manager.state(), ModuleState::Stopped);
    assert_eq!(QueueStore::new(queue_file).load().unwrap(), rest);

    assert!(!manager.enqueue_url(&format!("{}/live/fourth.mp4", server.uri())));
    manager.start().await.unwrap();
    assert_eq!(manager.state(), ModuleState::Stopped);
    assert!(!manager.is_tracked(&first));
    assert_eq!(manager.pending(), rest);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2, 0, 0);

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("frame data")
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let manager = DownloadManager::new(config).unwrap();
    for i in 0..6 {
        manager.enqueue_url(&format!("{}/batch/{}.mp4", server.uri(), i));
    }
    manager.complete_adding();

    run_to_completion(&manager).await;

    let stats = manager.stats();
    assert_eq!(stats.downloaded, 6);
    assert!(stats.peak_active >= 1);
    assert!(
        stats.peak_active <= 2,
        "peak of {} concurrent fetches exceeds the limit",
        stats.peak_active
    );
}

#[tokio::test]
async fn test_sends_user_agent_and_custom_headers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), 1, 0, 0);
    config
        .headers
        .insert("x-api-key".to_string(), "secret-token".to_string());

    Mock::given(method("GET"))
        .and(path("/private/clip.mp4"))
        .and(header(
            "user-agent",
            "TestDownloader/1.0 (+https://example.com/about; admin@example.com)",
        ))
        .and(header("x-api-key", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("private"))
        .expect(1)
        .mount(&server)
        .await;

    let manager = DownloadManager::new(config).unwrap();
    manager.enqueue_url(&format!("{}/private/clip.mp4", server.uri()));
    manager.complete_adding();

    run_to_completion(&manager).await;

    assert_eq!(manager.stats().downloaded, 1);
}

#[tokio::test]
async fn test_enqueue_while_running_is_picked_up() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2, 0, 0);
    let download_dir = config.downloader.download_directory.clone();

    mount_file(&server, "/late.mp4", "late arrival").await;

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    assert_eq!(manager.state(), ModuleState::Running);

    assert!(manager.enqueue_url(&format!("{}/late.mp4", server.uri())));
    manager.complete_adding();

    tokio::time::timeout(RUN_TIMEOUT, manager.wait())
        .await
        .expect("Run did not drain");

    assert_eq!(
        std::fs::read_to_string(download_dir.join("late.mp4")).unwrap(),
        "late arrival"
    );
}
