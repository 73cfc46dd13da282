//! Image fetching: data-URI decode and bounded, retried HTTP downloads.

use base64::Engine;
use futures::StreamExt;
use labelscan_core::{defaults, Error, ImageFormat, ImagePayload, Result};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

fn data_url_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^data:(image/[a-zA-Z0-9.+-]+);base64$").unwrap())
}

/// Resolves an image URL (HTTP or base64 data URI) into bytes plus a
/// validated MIME type, enforcing a maximum size.
pub struct ImageFetcher {
    client: Client,
    max_image_bytes: usize,
    timeout_secs: u64,
    retries: u32,
    backoff_secs: f64,
}

impl ImageFetcher {
    /// Create a fetcher sharing the given HTTP client for connection reuse.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
            timeout_secs: defaults::DOWNLOAD_TIMEOUT_SECS,
            retries: defaults::DOWNLOAD_RETRIES,
            backoff_secs: defaults::RETRY_BACKOFF_SECS,
        }
    }

    pub fn with_max_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Fetch `url` into raw bytes and a resolved MIME type.
    pub async fn fetch(&self, url: &str) -> Result<ImagePayload> {
        if url.starts_with("data:image/") {
            return self.decode_data_url(url);
        }
        self.download(url).await
    }

    fn decode_data_url(&self, url: &str) -> Result<ImagePayload> {
        let (header, encoded) = url
            .split_once(',')
            .ok_or_else(|| Error::Fetch("invalid data URL format".to_string()))?;
        let captures = data_url_header_re()
            .captures(header.trim())
            .ok_or_else(|| Error::Fetch("unsupported data URL header".to_string()))?;
        let mime_type = captures[1].to_ascii_lowercase();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Fetch(format!("invalid base64 image data: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::Fetch("empty image bytes from data URL".to_string()));
        }
        if bytes.len() > self.max_image_bytes {
            return Err(Error::Fetch(format!(
                "image too large: {} bytes > {}",
                bytes.len(),
                self.max_image_bytes
            )));
        }
        Ok(ImagePayload { bytes, mime_type })
    }

    async fn download(&self, url: &str) -> Result<ImagePayload> {
        let mut last_error: Option<Error> = None;
        for attempt in 0..=self.retries {
            match self.download_once(url).await {
                Ok(payload) => return Ok(payload),
                Err(DownloadError::Terminal(err)) => return Err(err),
                Err(DownloadError::Retryable(err)) => {
                    if attempt < self.retries {
                        let delay =
                            Duration::from_secs_f64(self.backoff_secs * (attempt + 1) as f64);
                        warn!(
                            attempt,
                            retry_delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "image download failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(Error::Fetch(format!(
            "image download error: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn download_once(&self, url: &str) -> std::result::Result<ImagePayload, DownloadError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", defaults::DOWNLOAD_USER_AGENT)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| DownloadError::Retryable(Error::Request(e.to_string())))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let err = Error::Fetch(format!("image download failed: http={}", status));
            if defaults::RETRYABLE_HTTP_STATUS.contains(&status) {
                return Err(DownloadError::Retryable(err));
            }
            return Err(DownloadError::Terminal(err));
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| DownloadError::Retryable(Error::Request(e.to_string())))?;
            if bytes.len() + chunk.len() > self.max_image_bytes {
                // Abort without keeping partial bytes.
                return Err(DownloadError::Terminal(Error::Fetch(format!(
                    "image too large: {} bytes > {}",
                    bytes.len() + chunk.len(),
                    self.max_image_bytes
                ))));
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(DownloadError::Terminal(Error::Fetch(
                "empty image bytes".to_string(),
            )));
        }

        let mime_type = guess_mime_type(url, content_type.as_deref(), &bytes);
        debug!(image_bytes = bytes.len(), mime_type = %mime_type, "image downloaded");
        Ok(ImagePayload { bytes, mime_type })
    }
}

enum DownloadError {
    Retryable(Error),
    Terminal(Error),
}

/// Resolve a MIME type with priority: response content-type header when it
/// names an `image/*` type, then URL path extension, then magic bytes, then
/// a safe default.
pub fn guess_mime_type(url: &str, content_type: Option<&str>, bytes: &[u8]) -> String {
    if let Some(header) = content_type {
        let guessed = header
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if guessed.starts_with("image/") {
            return guessed;
        }
    }

    if let Some(mime) = mime_from_url_extension(url) {
        return mime.to_string();
    }

    // Magic-byte detection is authoritative for binary formats.
    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        if mime.starts_with("image/") {
            return mime.to_string();
        }
    }
    if let Some(format) = ImageFormat::sniff(bytes) {
        return format.mime_type().to_string();
    }

    "application/octet-stream".to_string()
}

fn mime_from_url_extension(url: &str) -> Option<&'static str> {
    let path = url
        .split('#')
        .next()
        .unwrap_or(url)
        .split('?')
        .next()
        .unwrap_or(url);
    let ext = path.rsplit('/').next()?.rsplit_once('.')?.1;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
