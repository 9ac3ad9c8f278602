//! End-to-end scenarios for the job engine, driven entirely through
//! [`DownloaderEngine`]'s public API against a `wiremock` stand-in for the
//! archive (spec's worked examples for the action queue / worker pool /
//! retry subsystem, taken literally).

use std::sync::Arc;
use std::time::Duration;

use downloader_core::client::ArchiveClient;
use downloader_core::{
    ActionKind, Configuration, DownloaderEngine, EngineObserver, ObserverEvent, ObserverStage,
    Status,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EventRecorder {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl EngineObserver for EventRecorder {
    fn on_event(&self, event: ObserverEvent) {
        let _ = self.tx.send(event);
    }
}

/// Builds an engine talking to `server` instead of the real archive, with a
/// single worker (order-preserving, matching the literal scenarios) and
/// rate pacing disabled (pacing is tested separately in `client`).
async fn build_engine(
    server: &MockServer,
) -> (Arc<DownloaderEngine>, mpsc::UnboundedReceiver<ObserverEvent>, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Configuration::default();
    config.downloads_dir = dir.path().join("downloads");
    config.should_rate_limit = false;
    config.should_use_threading = true;
    config.concurrency_limit = 1;

    let base = url::Url::parse(&server.uri()).expect("mock server URL parses");
    let client = ArchiveClient::with_base(base, false).expect("client builds");

    let engine = DownloaderEngine::with_client(dir.path().to_path_buf(), config, client)
        .await
        .expect("engine builds");

    let (tx, rx) = mpsc::unbounded_channel();
    let observer: Arc<dyn EngineObserver> = Arc::new(EventRecorder { tx });
    engine.set_action_observer(observer.clone()).await;
    engine.set_enqueue_observer(observer).await;

    (engine, rx, dir)
}

/// Drains events until one of `kind` reaches `AfterAction`.
async fn next_after_action(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>, kind: ActionKind) -> ObserverEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("an observer event arrives within the timeout")
            .expect("observer channel stays open");
        if event.stage == ObserverStage::AfterAction && event.kind == kind {
            return event;
        }
    }
}

fn work_page(title: &str, author: &str) -> String {
    format!(
        "<html><body><h2 class=\"title heading\">{title}</h2>\
         <a rel=\"author\" href=\"/users/{author}\">{author}</a></body></html>"
    )
}

fn listing_blurb(ids: &[u64]) -> String {
    let items: String = ids
        .iter()
        .map(|id| format!("<li class=\"work blurb\" id=\"work_{id}\"></li>"))
        .collect();
    format!("<html><body>{items}</body></html>")
}

#[tokio::test]
async fn happy_load() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_string(work_page("Alpha", "ada")))
        .expect(1)
        .mount(&server)
        .await;

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine
        .load_works_from_work_urls(&[format!("{}/works/12345", server.uri())])
        .await;

    let event = next_after_action(&mut rx, ActionKind::LoadWork).await;
    assert_eq!(event.status, Some(Status::Ok));
    assert_eq!(event.payload.work_title, Some("Alpha".to_string()));

    // Re-referencing the same work hits the cache: no second HTTP fetch
    // (the `expect(1)` above is verified when `server` drops).
    engine
        .load_works_from_work_urls(&[format!("{}/works/12345", server.uri())])
        .await;
    let repeat = next_after_action(&mut rx, ActionKind::LoadWork).await;
    assert_eq!(repeat.status, Some(Status::Ok));
    assert_eq!(repeat.payload.work_title, Some("Alpha".to_string()));

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limited_load_succeeds_after_one_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/12345"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_string(work_page("Alpha", "ada")))
        .mount(&server)
        .await;

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine
        .load_works_from_work_urls(&[format!("{}/works/12345", server.uri())])
        .await;

    let retried = next_after_action(&mut rx, ActionKind::LoadWork).await;
    assert_eq!(retried.status, Some(Status::Retry));
    assert!(retried.payload.error.as_deref().unwrap_or_default().contains("10s"));

    let succeeded = next_after_action(&mut rx, ActionKind::LoadWork).await;
    assert_eq!(succeeded.status, Some(Status::Ok));

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn user_removal_during_backoff_cancels_the_timer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/12345"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine
        .load_works_from_work_urls(&[format!("{}/works/12345", server.uri())])
        .await;

    let retried = next_after_action(&mut rx, ActionKind::LoadWork).await;
    assert_eq!(retried.status, Some(Status::Retry));

    // Cancel before the 10s timer would fire.
    engine.remove(12345).await;

    // Advance well past the scheduled delay; nothing should re-enqueue.
    tokio::time::advance(Duration::from_secs(30)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(rx.try_recv().is_err(), "no further observer event after removal");

    engine.stop().await;
}

#[tokio::test]
async fn series_expansion_enqueues_each_work() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/77"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_blurb(&[1, 2, 3])))
        .mount(&server)
        .await;
    for id in [1u64, 2, 3] {
        Mock::given(method("GET"))
            .and(path(format!("/works/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(work_page("Chapter", "ada")))
            .mount(&server)
            .await;
    }

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine
        .load_works_from_series_urls(&[format!("{}/series/77", server.uri())])
        .await;

    let series_done = next_after_action(&mut rx, ActionKind::LoadSeries).await;
    assert_eq!(series_done.status, Some(Status::Ok));
    assert_eq!(series_done.payload.results, Some(vec![1, 2, 3]));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = next_after_action(&mut rx, ActionKind::LoadWork).await;
        assert_eq!(event.status, Some(Status::Ok));
        seen.push(event);
    }
    assert_eq!(seen.len(), 3);

    engine.stop().await;
}

#[tokio::test]
async fn listing_loads_only_the_requested_pages() {
    let server = MockServer::start().await;
    let listing_url = format!("{}/tags/x/works?page=5", server.uri());

    Mock::given(method("GET"))
        .and(path("/tags/x/works"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><ol class=\"pagination\"><a>1</a><a>2</a><a>3</a></ol></body></html>",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tags/x/works"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_blurb(&[101])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tags/x/works"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_blurb(&[102])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tags/x/works"))
        .and(query_param("page", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_blurb(&[])))
        .expect(0)
        .mount(&server)
        .await;
    for id in [101u64, 102] {
        Mock::given(method("GET"))
            .and(path(format!("/works/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(work_page("Chapter", "ada")))
            .mount(&server)
            .await;
    }

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine.load_works_from_generic_url(listing_url, 1, 2).await;

    let list_done = next_after_action(&mut rx, ActionKind::LoadResultsList).await;
    assert_eq!(list_done.status, Some(Status::Ok));

    let mut pages_seen = Vec::new();
    for _ in 0..2 {
        let event = next_after_action(&mut rx, ActionKind::LoadResultsPage).await;
        assert_eq!(event.status, Some(Status::Ok));
        pages_seen.push(event.payload.results_page);
    }
    pages_seen.sort();
    assert_eq!(pages_seen, vec![Some(1), Some(2)]);

    engine.stop().await;
}

#[tokio::test]
async fn shutdown_with_armed_retries_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/201"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works/202"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let (engine, mut rx, _dir) = build_engine(&server).await;
    engine
        .load_works_from_work_urls(&[
            format!("{}/works/201", server.uri()),
            format!("{}/works/202", server.uri()),
        ])
        .await;

    for _ in 0..2 {
        let event = next_after_action(&mut rx, ActionKind::LoadWork).await;
        assert_eq!(event.status, Some(Status::Retry));
    }

    tokio::time::timeout(Duration::from_secs(2), engine.stop())
        .await
        .expect("stop() returns within a bounded time");

    assert!(
        tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err(),
        "no observer event fires after stop()"
    );
}
