//! HTTP-level tests for the image fetcher.

use labelscan_inference::ImageFetcher;
use reqwest::Client;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n0123456789abcdef";

#[tokio::test]
async fn test_download_resolves_mime_from_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/label.bin"))
        .and(header_exists("User-Agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG_BYTES)
                .insert_header("Content-Type", "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new());
    let payload = fetcher
        .fetch(&format!("{}/label.bin", server.uri()))
        .await
        .unwrap();
    assert_eq!(payload.mime_type, "image/png");
    assert_eq!(payload.bytes, PNG_BYTES);
}

#[tokio::test]
async fn test_download_sniffs_mime_when_header_useless() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG_BYTES)
                .insert_header("Content-Type", "application/octet-stream"),
        )
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new());
    let payload = fetcher
        .fetch(&format!("{}/download", server.uri()))
        .await
        .unwrap();
    assert_eq!(payload.mime_type, "image/png");
}

#[tokio::test]
async fn test_download_retries_retryable_status_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.png"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new());
    let payload = fetcher
        .fetch(&format!("{}/flaky.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(payload.bytes, PNG_BYTES);
}

#[tokio::test]
async fn test_download_fails_fast_on_non_retryable_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new());
    let err = fetcher
        .fetch(&format!("{}/gone.png", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("http=404"));
}

#[tokio::test]
async fn test_download_aborts_over_size_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new()).with_max_bytes(1024);
    let err = fetcher
        .fetch(&format!("{}/huge.png", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("image too large"));
}

#[tokio::test]
async fn test_download_rejects_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
        .mount(&server)
        .await;

    let fetcher = ImageFetcher::new(Client::new());
    let err = fetcher
        .fetch(&format!("{}/empty.png", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("empty image bytes"));
}
