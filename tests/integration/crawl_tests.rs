//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run whole
//! crawl jobs end-to-end through the coordinator.

use std::time::Duration;
use sumi_glean::config::{Config, CrawlerConfig, OutputConfig, RetryConfig, UserAgentConfig};
use sumi_glean::crawler::StartOutcome;
use sumi_glean::storage::SqliteStorage;
use sumi_glean::{Coordinator, CrawlJob, CrawlRequest, JobStatus, ProgressSnapshot};
use tokio::sync::broadcast::error::RecvError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with fast retries
fn create_test_config() -> Config {
    Config {
        crawler: CrawlerConfig {
            max_pages: 50,
            timeout_ms: 2_000,
            include_css_backgrounds: false,
            next_image_fixup: true,
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            timeout_base_delay_ms: 20,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: ":memory:".to_string(),
        },
    }
}

fn create_coordinator() -> Coordinator<SqliteStorage> {
    let storage = SqliteStorage::new_in_memory().expect("Failed to open in-memory storage");
    Coordinator::new(&create_test_config(), storage).expect("Failed to build coordinator")
}

fn request(target: &str, max_pages: u32) -> CrawlRequest {
    CrawlRequest {
        target_url: target.to_string(),
        max_pages,
        timeout_ms: 2_000,
        include_css_backgrounds: false,
    }
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Starts a job and waits for it to finish
async fn run_to_end(coordinator: &Coordinator<SqliteStorage>, job: &CrawlJob) -> CrawlJob {
    match coordinator.start(job.id).expect("start failed") {
        StartOutcome::Started(handle) => handle
            .await
            .expect("crawl task panicked")
            .expect("crawl task failed"),
        StartOutcome::AlreadyRunning => panic!("job {} unexpectedly running", job.id),
    }
}

/// Drains a progress receiver until the channel closes
async fn collect_snapshots(
    mut rx: tokio::sync::broadcast::Receiver<ProgressSnapshot>,
) -> Vec<ProgressSnapshot> {
    let mut snapshots = Vec::new();
    loop {
        match rx.recv().await {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(RecvError::Closed) => return snapshots,
            Err(RecvError::Lagged(n)) => panic!("receiver lagged by {}", n),
        }
    }
}

#[tokio::test]
async fn test_seed_page_with_link_and_image() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/p2">x</a><img src="/a.png" alt="hi">"#).await;
    mount_page(&server, "/p2", "<html><body><p>second page</p></body></html>").await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 5)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 2);
    assert_eq!(finished.total_pages_found, 2);
    assert_eq!(finished.progress, 100);
    assert!(finished.images_found >= 1);
    assert!(finished.current_page.is_none());
    assert!(finished.completed_at.is_some());
    assert!(finished.error.is_none());

    let images = coordinator.images(job.id).unwrap();
    assert_eq!(images.len(), 1);
    assert!(images[0].image_url.ends_with("/a.png"));
    assert_eq!(images[0].alt_text.as_deref(), Some("hi"));
    assert_eq!(images[0].image_type.as_deref(), Some("png"));
    assert_eq!(images[0].filename.as_deref(), Some("a.png"));
    assert_eq!(images[0].raw_markup, r#"<img src="/a.png" alt="hi">"#);
}

#[tokio::test]
async fn test_timed_out_page_is_skipped() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/slow">slow</a><img src="/seed.png">"#).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<img src="/never.png">"#)
                .set_delay(Duration::from_millis(3_000)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 5)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 1);
    assert_eq!(finished.total_pages_found, 2);

    let images = coordinator.images(job.id).unwrap();
    assert_eq!(images.len(), 1);
    assert!(images.iter().all(|i| !i.image_url.ends_with("/never.png")));
}

#[tokio::test]
async fn test_failing_page_does_not_fail_job() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/broken">b</a><a href="/ok">ok</a>"#).await;
    mount_page(&server, "/ok", r#"<img src="/ok.png">"#).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 10)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 2);
    assert_eq!(finished.images_found, 1);
}

#[tokio::test]
async fn test_page_budget_stops_traversal() {
    let server = MockServer::start().await;
    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/page{}">{}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", &links).await;
    Mock::given(method("GET"))
        .and(path("/page0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 1)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 1);
    assert_eq!(finished.total_pages_found, 11);
    assert_eq!(finished.progress, 100);
}

#[tokio::test]
async fn test_css_backgrounds_only_when_enabled() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<div style="background-image:url(x.png)">hero</div>"#,
    )
    .await;

    let coordinator = create_coordinator();

    let disabled = coordinator.submit(request(&server.uri(), 1)).unwrap();
    let finished = run_to_end(&coordinator, &disabled).await;
    assert_eq!(finished.images_found, 0);
    assert!(coordinator.images(disabled.id).unwrap().is_empty());

    let mut with_css = request(&server.uri(), 1);
    with_css.include_css_backgrounds = true;
    let enabled = coordinator.submit(with_css).unwrap();
    let finished = run_to_end(&coordinator, &enabled).await;
    assert_eq!(finished.images_found, 1);

    let images = coordinator.images(enabled.id).unwrap();
    assert!(images[0].image_url.ends_with("/x.png"));
    assert!(images[0].alt_text.is_none());
}

#[tokio::test]
async fn test_cross_origin_links_never_fetched() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;

    mount_page(
        &server,
        "/",
        &format!(r#"<a href="{}/elsewhere">away</a><a href="/local">here</a>"#, other.uri()),
    )
    .await;
    mount_page(&server, "/local", "<p>local</p>").await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&other)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 10)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 2);
    assert_eq!(finished.total_pages_found, 2);
}

#[tokio::test]
async fn test_each_page_fetched_once() {
    let server = MockServer::start().await;
    let nav = r#"<a href="/">home</a><a href="/a">a</a><a href="/b#top">b</a><a href="/b">b</a>"#;

    for route in ["/", "/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(nav))
            .expect(1)
            .mount(&server)
            .await;
    }

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&format!("{}/", server.uri()), 10)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.pages_processed, 3);
    assert_eq!(finished.total_pages_found, 3);
}

#[tokio::test]
async fn test_same_image_on_two_pages_gives_two_records() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/other">o</a><img src="/logo.png"><img src="/logo.png">"#).await;
    mount_page(&server, "/other", r#"<img src="/logo.png" alt="Logo">"#).await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 10)).unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    let images = coordinator.images(job.id).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(finished.images_found, 2);
    assert_ne!(images[0].page_url, images[1].page_url);
    assert_eq!(images[0].image_url, images[1].image_url);
}

#[tokio::test]
async fn test_progress_snapshots_in_order() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/one">1</a><a href="/two">2</a><img src="/a.png">"#).await;
    mount_page(&server, "/one", r#"<img src="/b.png">"#).await;
    mount_page(&server, "/two", r#"<img src="/c.png">"#).await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 4)).unwrap();
    let rx = coordinator.subscribe(job.id).await.unwrap();
    let finished = run_to_end(&coordinator, &job).await;
    let snapshots = collect_snapshots(rx).await;

    // Initial + one per page + terminal
    assert_eq!(snapshots.len(), 5);

    let first = &snapshots[0];
    assert_eq!(first.status, JobStatus::Running);
    assert_eq!(first.progress, 0);
    assert_eq!(first.total_pages_found, 1);
    assert_eq!(first.current_page.as_deref(), Some(server.uri().as_str()));

    for pair in snapshots.windows(2) {
        assert!(pair[0].pages_processed <= pair[1].pages_processed);
        assert!(pair[0].progress <= pair[1].progress);
        assert!(pair[0].images_found <= pair[1].images_found);
    }
    assert_eq!(snapshots[1].progress, 25);
    assert_eq!(snapshots[1].images_found, 1);

    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert!(last.current_page.is_none());
    assert_eq!(last.pages_processed, finished.pages_processed);
    assert_eq!(last.images_found, 3);
}

#[tokio::test]
async fn test_duplicate_start_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>slow home</p>")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 5)).unwrap();

    let handle = match coordinator.start(job.id).unwrap() {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => panic!("first start should run"),
    };
    assert!(coordinator.is_running(job.id));
    assert!(matches!(coordinator.start(job.id).unwrap(), StartOutcome::AlreadyRunning));

    let finished = handle.await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 1);
    assert!(!coordinator.is_running(job.id));
}

#[tokio::test]
async fn test_cancel_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let coordinator = create_coordinator();
    let job = coordinator.submit(request(&server.uri(), 5)).unwrap();
    let rx = coordinator.subscribe(job.id).await.unwrap();

    let handle = match coordinator.start(job.id).unwrap() {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => panic!("first start should run"),
    };
    assert!(coordinator.cancel(job.id).unwrap());

    let finished = handle.await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.error.as_deref(), Some("crawl cancelled"));
    assert!(finished.completed_at.is_some());

    let snapshots = collect_snapshots(rx).await;
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.error.as_deref(), Some("crawl cancelled"));
}

#[tokio::test]
async fn test_unreachable_seed_completes_empty() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let coordinator = create_coordinator();
    let job = coordinator
        .submit(request(&format!("http://{}/", addr), 5))
        .unwrap();
    let finished = run_to_end(&coordinator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.pages_processed, 0);
    assert_eq!(finished.images_found, 0);
}

#[tokio::test]
async fn test_file_backed_storage_persists_results() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<img src="/persisted.png" alt="kept">"#).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("glean.db");

    let job_id = {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let coordinator = Coordinator::new(&create_test_config(), storage).unwrap();
        let job = coordinator.submit(request(&server.uri(), 1)).unwrap();
        run_to_end(&coordinator, &job).await.id
    };

    let reopened = Coordinator::new(&create_test_config(), SqliteStorage::new(&db_path).unwrap()).unwrap();
    let job = reopened.job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let images = reopened.images(job_id).unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].alt_text.as_deref(), Some("kept"));
}
