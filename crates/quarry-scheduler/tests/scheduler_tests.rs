//! End-to-end scheduler runs against a local HTTP server and mock engines

use quarry_acquire::{HttpFetcher, RateLimiter, Source, SourceChain, TemplateSource};
use quarry_domain::traits::StateStore;
use quarry_domain::{ArtifactKind, ArtifactLayout, ExtractedDocument, ItemId, Section, Status};
use quarry_extractor::{ExtractionEngine, Extractor, ExtractorConfig, MockEngine};
use quarry_scheduler::{Classification, Scheduler, SchedulerConfig};
use quarry_store::SqliteStateStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn valid_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'x').take(2000));
    bytes.extend_from_slice(b"\n%%EOF\n");
    bytes
}

fn good_doc() -> ExtractedDocument {
    ExtractedDocument {
        title: Some("A study of things".to_string()),
        abstract_text: Some("We study things.".to_string()),
        sections: vec![Section::new("Introduction", "x".repeat(200))],
    }
}

fn ids(raw: &[&str]) -> Vec<ItemId> {
    raw.iter().map(|s| ItemId::parse(s).unwrap()).collect()
}

struct Harness {
    _dir: TempDir,
    server: MockServer,
    store: Arc<SqliteStateStore>,
    layout: ArtifactLayout,
    http: Arc<HttpFetcher>,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("papers"), dir.path().join("output"));
        let limiter = Arc::new(RateLimiter::new(1000.0, 100).unwrap());
        let http = Arc::new(
            HttpFetcher::new(limiter, Duration::from_secs(5), "quarry-test", 0, Duration::from_millis(1))
                .unwrap(),
        );
        let store = Arc::new(SqliteStateStore::open(dir.path().join("state.db")).unwrap());
        Self {
            _dir: dir,
            server: MockServer::start().await,
            store,
            layout,
            http,
        }
    }

    async fn serve_missing(&self, source: &str) {
        Mock::given(method("GET"))
            .and(path_regex(format!("^/{}/", source)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    async fn serve_pdf(&self, source: &str) {
        Mock::given(method("GET"))
            .and(path_regex(format!("^/{}/", source)))
            .respond_with(ResponseTemplate::new(200).set_body_raw(valid_pdf(), "application/pdf"))
            .mount(&self.server)
            .await;
    }

    async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    fn place_raw(&self, id: &ItemId) {
        let path = self.layout.raw_path(id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, valid_pdf()).unwrap();
    }

    fn scheduler(
        &self,
        grobid: MockEngine,
        fast: MockEngine,
        config: SchedulerConfig,
    ) -> Scheduler<SqliteStateStore> {
        let sources: Vec<Arc<dyn Source>> = ["s1", "s2"]
            .iter()
            .map(|name| {
                Arc::new(TemplateSource::new(
                    *name,
                    format!("{}/{}/{{id}}", self.server.uri(), name),
                    None,
                )) as Arc<dyn Source>
            })
            .collect();
        let chain = SourceChain::new(
            sources,
            Arc::clone(&self.http),
            Arc::clone(&self.store),
            self.layout.clone(),
        );
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![Arc::new(grobid), Arc::new(fast)];
        let extractor = Extractor::new(engines, self.layout.clone(), ExtractorConfig::default()).unwrap();
        Scheduler::new(config, Arc::clone(&self.store), chain, Arc::new(extractor)).unwrap()
    }

    fn default_scheduler(&self) -> Scheduler<SqliteStateStore> {
        self.scheduler(
            MockEngine::new("grobid", good_doc()),
            MockEngine::new("fast", good_doc()),
            SchedulerConfig::default(),
        )
    }

    fn snapshots(&self, ids: &[ItemId]) -> Vec<quarry_domain::Snapshot> {
        ids.iter().map(|id| self.store.get(id).unwrap().unwrap()).collect()
    }

    fn event_count(&self, ids: &[ItemId]) -> usize {
        ids.iter().map(|id| self.store.events(id).unwrap().len()).sum()
    }
}

#[tokio::test]
async fn test_run_acquires_then_extracts() {
    let h = Harness::new().await;
    h.serve_missing("s1").await;
    h.serve_pdf("s2").await;
    let items = ids(&["10.1/a", "10.1/b", "10.1/c"]);

    let summary = h.default_scheduler().run(&items, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.acquired, 3);
    assert_eq!(summary.extracted, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.network_attempts, 6);

    for snap in h.snapshots(&items) {
        assert_eq!(snap.downloaded, Status::Success);
        assert_eq!(snap.download_source.as_deref(), Some("s2"));
        assert!(snap.source("s1").is_failed());
        assert_eq!(snap.engine_status("grobid"), Status::Success);
        assert_eq!(snap.engine_status("fast"), Status::Unknown);
        assert_eq!(snap.has_content, Status::Success);
        assert!(h.layout.result_path(&snap.id, "grobid").unwrap().exists());
    }
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = Harness::new().await;
    h.serve_missing("s1").await;
    h.serve_pdf("s2").await;
    let items = ids(&["10.1/a", "10.1/b", "10.1/c", "10.1/d"]);
    let scheduler = h.default_scheduler();

    scheduler.run(&items, CancellationToken::new()).await.unwrap();
    let snapshots = h.snapshots(&items);
    let events = h.event_count(&items);
    let requests = h.request_count().await;

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.skipped_complete, 4);
    assert_eq!(summary.processed(), 0);
    assert_eq!(summary.network_attempts, 0);
    assert_eq!(h.request_count().await, requests);
    assert_eq!(h.snapshots(&items), snapshots);
    assert_eq!(h.event_count(&items), events);
}

#[tokio::test]
async fn test_exhausted_after_retry_budget() {
    let h = Harness::new().await;
    h.serve_missing("s1").await;
    h.serve_missing("s2").await;
    let items = ids(&["10.1/gone"]);
    let config = SchedulerConfig {
        acquisition_retry_budget: 2,
        ..Default::default()
    };
    let scheduler = h.scheduler(
        MockEngine::new("grobid", good_doc()),
        MockEngine::new("fast", good_doc()),
        config,
    );

    for expected_retries in 1..=2 {
        let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed, 1);
        let snap = &h.snapshots(&items)[0];
        assert_eq!(snap.retry_count, expected_retries);
        assert!(snap.all_sources_failed(["s1", "s2"]));
        assert!(snap.last_error.as_deref().unwrap().contains("exhausted"));
    }

    let requests = h.request_count().await;
    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped_exhausted, 1);
    assert_eq!(h.request_count().await, requests);

    let partition = scheduler.partition(&items).unwrap();
    assert_eq!(partition.exhausted, items);

    // an explicit reset makes the item schedulable again
    h.store.reset(&items[0]).unwrap();
    let job = &scheduler.partition(&items).unwrap().jobs[0];
    assert_eq!(job.class, Classification::NeedsAcquisition);
}

#[tokio::test]
async fn test_raw_on_disk_skips_network() {
    let h = Harness::new().await;
    let items = ids(&["10.1/local"]);
    h.place_raw(&items[0]);

    let summary = h.default_scheduler().run(&items, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.acquired, 0);
    assert_eq!(summary.network_attempts, 0);
    assert_eq!(h.request_count().await, 0);

    let snap = &h.snapshots(&items)[0];
    assert_eq!(snap.downloaded, Status::Success);
    assert_eq!(snap.engine_status("grobid"), Status::Success);
}

#[tokio::test]
async fn test_fallback_engine_completes_item() {
    let h = Harness::new().await;
    let items = ids(&["10.1/fallback"]);
    h.place_raw(&items[0]);
    let scheduler = h.scheduler(
        MockEngine::failing("grobid", "service unavailable"),
        MockEngine::new("fast", good_doc()),
        SchedulerConfig::default(),
    );

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.extracted, 1);

    let snap = &h.snapshots(&items)[0];
    assert_eq!(snap.engine_status("grobid"), Status::Failure);
    assert_eq!(snap.engine_status("fast"), Status::Success);
    assert_eq!(snap.retry_count, 0);

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped_complete, 1);
}

#[tokio::test]
async fn test_every_engine_failing_counts_one_retry() {
    let h = Harness::new().await;
    let items = ids(&["10.1/thin"]);
    h.place_raw(&items[0]);
    let scheduler = h.scheduler(
        MockEngine::failing("grobid", "bad layout"),
        MockEngine::failing("fast", "no text"),
        SchedulerConfig::default(),
    );

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.failed, 1);

    let snap = &h.snapshots(&items)[0];
    assert_eq!(snap.retry_count, 1);
    assert_eq!(snap.engine_status("grobid"), Status::Failure);
    assert_eq!(snap.engine_status("fast"), Status::Failure);
    assert!(snap.last_error.as_deref().unwrap().contains("no text"));
}

#[tokio::test]
async fn test_panicking_item_does_not_stop_pool() {
    let h = Harness::new().await;
    let items = ids(&["10.1/p1", "10.1/p2", "10.1/p3"]);
    for id in &items {
        h.place_raw(id);
    }
    let config = SchedulerConfig {
        workers: 2,
        fallback_engines: Vec::new(),
        extraction_retry_budget: 2,
        ..Default::default()
    };
    let grobid = MockEngine::panicking("grobid");
    let calls = grobid.clone();
    let scheduler = h.scheduler(grobid, MockEngine::new("fast", good_doc()), config);

    for expected_retries in 1..=2 {
        let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.cancelled, 0);
        for snap in h.snapshots(&items) {
            assert!(snap.last_error.as_deref().unwrap().contains("panicked"));
            assert_eq!(snap.retry_count, expected_retries);
            assert_eq!(snap.engine_status("grobid"), Status::Failure);
        }
    }
    assert_eq!(calls.call_count(), 6);

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped_exhausted, 3);
    assert_eq!(summary.processed(), 0);
    assert_eq!(calls.call_count(), 6);
}

#[tokio::test]
async fn test_junk_raw_file_is_quarantined_and_acquired_again() {
    let h = Harness::new().await;
    h.serve_pdf("s1").await;
    let items = ids(&["10.1/junk"]);
    let raw = h.layout.raw_path(&items[0]);
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, "<html>captcha page</html>".repeat(100)).unwrap();
    let scheduler = h.default_scheduler();

    let job = &scheduler.partition(&items).unwrap().jobs[0];
    assert_eq!(job.class, Classification::NeedsAcquisition);

    let summary = scheduler.run(&items, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.acquired, 1);
    assert_eq!(summary.extracted, 1);
    assert_eq!(h.request_count().await, 1);
    assert_eq!(std::fs::read(&raw).unwrap(), valid_pdf());

    let quarantined = h
        .layout
        .quarantine_dir(&ArtifactKind::Raw)
        .join(raw.file_name().unwrap());
    assert!(std::fs::read_to_string(quarantined).unwrap().starts_with("<html>"));

    let snap = &h.snapshots(&items)[0];
    assert_eq!(snap.downloaded, Status::Success);
    assert_eq!(snap.download_source.as_deref(), Some("s1"));
    assert_eq!(snap.engine_status("grobid"), Status::Success);
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let h = Harness::new().await;
    h.serve_pdf("s1").await;
    let items = ids(&["10.1/x", "10.1/y"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = h.default_scheduler().run(&items, cancel).await.unwrap();

    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.processed(), 0);
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn test_unknown_engine_rejected() {
    let h = Harness::new().await;
    let config = SchedulerConfig {
        engine: "ocr".to_string(),
        ..Default::default()
    };
    let chain = SourceChain::new(Vec::new(), Arc::clone(&h.http), Arc::clone(&h.store), h.layout.clone());
    let extractor = Extractor::new(
        vec![Arc::new(MockEngine::new("grobid", good_doc())) as Arc<dyn ExtractionEngine>],
        h.layout.clone(),
        ExtractorConfig::default(),
    )
    .unwrap();
    let result = Scheduler::new(config, Arc::clone(&h.store), chain, Arc::new(extractor));
    assert!(result.is_err());
}
