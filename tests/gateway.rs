mod common;

use reqwest::StatusCode;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use common::{acquirer, typical_encodings, FakeCatalog, FakeExtractor, FakeTransform};
use jaye::server::{create_router, AppContext};

struct TestGateway {
    addr: SocketAddr,
    client: reqwest::Client,
    extractor: Arc<FakeExtractor>,
    _cache: TempDir,
    _handle: JoinHandle<()>,
}

impl TestGateway {
    async fn start() -> Self {
        let cache = TempDir::new().unwrap();
        let extractor = Arc::new(FakeExtractor::with("abc123", typical_encodings()));
        let transform = Arc::new(FakeTransform::default());
        let catalog = Arc::new(FakeCatalog::with(&[("abc123", "Café \"live\" / set")]));

        let ctx = AppContext::new(
            Arc::new(acquirer(cache.path(), Arc::clone(&extractor), transform)),
            catalog,
        );
        let app = create_router(ctx, "*");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            extractor,
            _cache: cache,
            _handle: handle,
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    async fn get_json(&self, path_and_query: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path_and_query)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn health_answers_ok() {
    let gateway = TestGateway::start().await;
    let response = gateway.client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn missing_or_unknown_service_is_rejected() {
    let gateway = TestGateway::start().await;

    let (status, body) = gateway.get_json("/info?id=abc123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["response"], "service id not supplied");

    let (status, body) = gateway.get_json("/info?service=vimeo&id=abc123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"], "service not found");
}

#[tokio::test]
async fn info_and_search_use_the_envelope() {
    let gateway = TestGateway::start().await;

    let (status, body) = gateway.get_json("/info?service=youtube&id=abc123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["response"]["id"], "abc123");
    assert_eq!(body["response"]["url"], "https://youtube.com/watch?v=abc123");

    let (status, body) = gateway.get_json("/search?service=youtube&q=live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], serde_json::json!(["abc123"]));

    let (status, _) = gateway.get_json("/search?service=youtube").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_video_is_not_found_with_sanitized_message() {
    let gateway = TestGateway::start().await;
    let (status, body) = gateway.get_json("/audio?service=youtube&id=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["response"], "resource not found");
}

#[tokio::test]
async fn audio_download_streams_the_artifact() {
    let gateway = TestGateway::start().await;
    let response = gateway
        .client
        .get(gateway.url("/audio?service=youtube&id=abc123"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "audio/mpeg");
    let disposition = headers["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("inline; filename=\"Caf_ _live_ _ set.mp3\""));
    assert_eq!(headers["content-length"], "14");
    assert_eq!(response.text().await.unwrap(), "mp3:abc123:251");
}

#[tokio::test]
async fn video_with_json_accept_returns_info_after_acquisition() {
    let gateway = TestGateway::start().await;
    let response = gateway
        .client
        .get(gateway.url("/video?service=youtube&id=abc123"))
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["response"]["title"], "Café \"live\" / set");
    assert_eq!(gateway.extractor.downloads(), 2);
}

#[tokio::test]
async fn list_reports_cached_videos() {
    let gateway = TestGateway::start().await;

    let (_, body) = gateway.get_json("/list?service=youtube").await;
    assert_eq!(body["response"], serde_json::json!([]));

    gateway
        .client
        .get(gateway.url("/audio?service=youtube&id=abc123"))
        .send()
        .await
        .unwrap();

    let (status, body) = gateway.get_json("/list?service=youtube").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"][0]["id"], "abc123");
}
