//! Upload/download exchange with the compression service.

use crate::constants::{
    API_ENDPOINT, API_USER, COMPRESSION_COUNT_HEADER, CONNECT_TIMEOUT_SECS, TEMP_FILE_PREFIX,
    UPLOAD_CHUNK_SIZE,
};
use crate::error::{CompressionError, Result};
use crate::quota::QuotaTracker;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, LOCATION};
use reqwest::{Body, Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Receives a completion fraction in `[0, 1]` for the current request.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Where the compressed result can be fetched, as returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: Url,
    pub compression_count: Option<u64>,
}

/// Body of a non-2xx API response.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

/// The network side of an image run.
#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Sends the file at `source` for compression.
    async fn upload(&self, source: &Path, on_progress: ProgressFn) -> Result<Redirect>;

    /// Streams the compressed result into a private temporary file.
    async fn download(&self, redirect: &Redirect, on_progress: ProgressFn) -> Result<TempPath>;
}

/// [`CompressionService`] backed by the Tinify HTTP API.
#[derive(Debug, Clone)]
pub struct TinifyClient {
    http: Client,
    endpoint: Url,
    token: String,
    quota: Arc<QuotaTracker>,
}

impl TinifyClient {
    pub fn new(token: impl Into<String>, quota: Arc<QuotaTracker>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CompressionError::MissingApiKey);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        let endpoint = Url::parse(API_ENDPOINT)
            .map_err(|_| CompressionError::InvalidLocation(API_ENDPOINT.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            token,
            quota,
        })
    }

    /// Points uploads at a different shrink endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn record_quota(&self, headers: &HeaderMap) -> Option<u64> {
        let count = parse_compression_count(headers)?;
        self.quota.record(count);
        Some(count)
    }
}

#[async_trait]
impl CompressionService for TinifyClient {
    async fn upload(&self, source: &Path, on_progress: ProgressFn) -> Result<Redirect> {
        let data = tokio::fs::read(source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CompressionError::SourceMissing(source.to_path_buf()),
            _ => CompressionError::Io(e),
        })?;
        let total = data.len() as u64;

        let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        let mut sent = 0u64;
        let body_stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent as f64 / total as f64);
            Ok::<_, std::io::Error>(chunk)
        });

        tracing::debug!(path = %source.display(), bytes = total, "uploading");
        let response = self
            .http
            .put(self.endpoint.clone())
            .basic_auth(API_USER, Some(&self.token))
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body_stream))
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        // Quota is recorded before any further state is reported.
        self.record_quota(&headers);
        tracing::debug!(status = status.as_u16(), "upload response");

        let body = if status.is_success() {
            Vec::new()
        } else {
            response.bytes().await?.to_vec()
        };
        interpret_upload_response(&self.endpoint, status, &headers, &body)
    }

    async fn download(&self, redirect: &Redirect, on_progress: ProgressFn) -> Result<TempPath> {
        tracing::debug!(location = %redirect.location, "downloading");
        let response = self.http.get(redirect.location.clone()).send().await?;
        self.record_quota(response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(decode_api_error(status, &body));
        }

        write_to_temp_file(response, on_progress).await
    }
}

async fn write_to_temp_file(response: Response, on_progress: ProgressFn) -> Result<TempPath> {
    let expected = response.content_length().filter(|len| *len > 0);
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile()?
        .into_parts();
    let mut out = tokio::fs::File::from_std(file);

    let mut received = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if let Some(total) = expected {
            on_progress((received as f64 / total as f64).min(1.0));
        }
    }
    out.flush().await?;
    drop(out);

    if expected.is_none() {
        on_progress(1.0);
    }
    tracing::debug!(bytes = received, path = %temp_path.display(), "download complete");
    Ok(temp_path)
}

/// Reads the `compression-count` header; values that are not unsigned integers are ignored.
pub fn parse_compression_count(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(COMPRESSION_COUNT_HEADER)?;
    match raw.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(count) => Some(count),
        None => {
            tracing::debug!(value = ?raw, "ignoring malformed compression-count header");
            None
        }
    }
}

/// Maps an upload response onto a [`Redirect`] or the matching error.
pub fn interpret_upload_response(
    endpoint: &Url,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Redirect> {
    if !status.is_success() {
        return Err(decode_api_error(status, body));
    }

    let raw = headers
        .get(LOCATION)
        .ok_or(CompressionError::MissingLocation)?
        .to_str()
        .map_err(|_| CompressionError::InvalidLocation(format!("{:?}", headers.get(LOCATION))))?;
    let location = endpoint
        .join(raw)
        .map_err(|_| CompressionError::InvalidLocation(raw.to_string()))?;

    Ok(Redirect {
        location,
        compression_count: parse_compression_count(headers),
    })
}

/// Decodes `{"error", "message"}`; anything else becomes a bare status error.
pub fn decode_api_error(status: StatusCode, body: &[u8]) -> CompressionError {
    match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(api) => CompressionError::Api {
            status: status.as_u16(),
            error: api.error,
            message: api.message,
        },
        Err(_) => CompressionError::UnexpectedStatus(status.as_u16()),
    }
}
