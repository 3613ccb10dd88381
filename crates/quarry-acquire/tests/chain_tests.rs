//! SourceChain tests against a local HTTP server

use quarry_acquire::{AcquireError, HttpFetcher, RateLimiter, Source, SourceChain, TemplateSource};
use quarry_domain::traits::StateStore;
use quarry_domain::{ArtifactLayout, ExtractedDocument, ItemId, Section, Status};
use quarry_extractor::{LenientProbe, MockEngine};
use quarry_store::SqliteStateStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn valid_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'x').take(2000));
    bytes.extend_from_slice(b"\n%%EOF\n");
    bytes
}

fn truncated_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'x').take(2000));
    bytes
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
        Self {
            _dir: dir,
            server: MockServer::start().await,
            store: Arc::new(SqliteStateStore::in_memory().unwrap()),
            layout,
            http,
        }
    }

    fn source(&self, name: &str) -> Arc<dyn Source> {
        Arc::new(TemplateSource::new(
            name,
            format!("{}/{}/{{id}}", self.server.uri(), name),
            None,
        ))
    }

    fn chain(&self, names: &[&str]) -> SourceChain<SqliteStateStore> {
        SourceChain::new(
            names.iter().map(|n| self.source(n)).collect(),
            Arc::clone(&self.http),
            Arc::clone(&self.store),
            self.layout.clone(),
        )
    }

    async fn requests_to(&self, prefix: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().starts_with(prefix))
            .count()
    }
}

fn item() -> ItemId {
    ItemId::parse("10.1234/paper.1").unwrap()
}

fn lenient_probe(chars: usize) -> LenientProbe {
    let doc = ExtractedDocument {
        sections: vec![Section::new("p1", "t".repeat(chars))],
        ..Default::default()
    };
    LenientProbe::new(Arc::new(MockEngine::new("fast", doc)), 100, Duration::from_secs(5))
}

#[tokio::test]
async fn test_second_source_wins_and_third_untouched() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path_regex("^/s1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>paywall</html>"),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/s2/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(valid_pdf()),
        )
        .mount(&h.server)
        .await;

    let chain = h.chain(&["s1", "s2", "s3"]);
    let acquired = chain.acquire(&item()).await.unwrap();

    assert_eq!(acquired.source.as_deref(), Some("s2"));
    assert!(!acquired.cache_hit);
    assert_eq!(std::fs::read(&acquired.path).unwrap(), valid_pdf());

    let snap = h.store.get(&item()).unwrap().unwrap();
    assert!(snap.source("s1").is_failed());
    assert_eq!(snap.source("s2").outcome, Status::Success);
    assert!(!snap.source("s3").attempted);
    assert_eq!(snap.downloaded, Status::Success);
    assert_eq!(snap.download_source.as_deref(), Some("s2"));
    assert_eq!(h.requests_to("/s3/").await, 0);
}

#[tokio::test]
async fn test_existing_valid_artifact_is_cache_hit() {
    let h = Harness::new().await;
    let raw = h.layout.raw_path(&item());
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, valid_pdf()).unwrap();

    let chain = h.chain(&["s1"]);
    let acquired = chain.acquire(&item()).await.unwrap();

    assert!(acquired.cache_hit);
    assert!(acquired.source.is_none());
    assert_eq!(h.http.attempts(), 0);
    assert!(h.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_all_sources_fail_is_exhausted() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let chain = h.chain(&["s1", "s2"]);
    let err = chain.acquire(&item()).await.unwrap_err();
    assert!(matches!(err, AcquireError::Exhausted { attempted: 2, .. }));

    let snap = h.store.get(&item()).unwrap().unwrap();
    assert!(snap.all_sources_failed(["s1", "s2"]));
    assert_eq!(snap.downloaded, Status::Unknown);
    assert!(!h.layout.raw_path(&item()).exists());
}

#[tokio::test]
async fn test_malformed_pdf_kept_by_lenient_check() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path_regex("^/s1/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(truncated_pdf()))
        .mount(&h.server)
        .await;

    let chain = h.chain(&["s1"]).with_lenient(Some(lenient_probe(500)));
    let acquired = chain.acquire(&item()).await.unwrap();

    assert!(acquired.lenient);
    assert_eq!(acquired.source.as_deref(), Some("s1"));
    assert!(acquired.path.exists());
}

#[tokio::test]
async fn test_malformed_pdf_quarantined_without_enough_text() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path_regex("^/s1/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(truncated_pdf()))
        .mount(&h.server)
        .await;

    let chain = h.chain(&["s1"]).with_lenient(Some(lenient_probe(10)));
    let err = chain.acquire(&item()).await.unwrap_err();

    assert!(matches!(err, AcquireError::Exhausted { .. }));
    assert!(!h.layout.raw_path(&item()).exists());
    let quarantined = h
        .layout
        .raw_dir()
        .join("invalid_pdfs")
        .join(format!("{}.pdf", item().file_stem()));
    assert!(quarantined.exists());
}

#[tokio::test]
async fn test_invalid_existing_artifact_replaced() {
    let h = Harness::new().await;
    let raw = h.layout.raw_path(&item());
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, b"<html>not a pdf</html>").unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/s1/{}", item())))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(valid_pdf()))
        .expect(1)
        .mount(&h.server)
        .await;

    let chain = h.chain(&["s1"]);
    let acquired = chain.acquire(&item()).await.unwrap();

    assert!(!acquired.cache_hit);
    assert_eq!(std::fs::read(&raw).unwrap(), valid_pdf());
    assert!(h.layout.raw_dir().join("invalid_pdfs").read_dir().unwrap().next().is_some());
}
