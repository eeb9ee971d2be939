//! Google Cloud Storage sink
//!
//! Uploads each snapshot with a single XML API `PUT` to
//! `<endpoint>/<bucket>/<blob>`. Blob metadata travels as `x-goog-meta-*`
//! headers, so content and metadata are replaced together in one request.
//!
//! Authentication is a bearer token supplied by the caller (for example from
//! `gcloud auth print-access-token` or the metadata server). Without a token
//! the request is sent anonymously, which works against emulators.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, error};

use tidemark::core::datasource::{Result, SnapshotSink};
use tidemark_api::{BlobMetadata, SyncError};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct GcsSink {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
}

impl GcsSink {
    pub fn new(bucket: impl Into<String>, access_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::sink_unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bucket: bucket.into(),
            access_token,
        })
    }

    /// Point at a different host, e.g. a local storage emulator
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object_url(&self, blob_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, blob_name)
    }

    fn build_request(
        &self,
        blob_name: &str,
        content: Vec<u8>,
        metadata: &BlobMetadata,
    ) -> Result<RequestBuilder> {
        let mut request = self
            .client
            .put(self.object_url(blob_name))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (key, value) in metadata.entries() {
            request = request.header(format!("x-goog-meta-{}", key), value);
        }

        if let Some(token) = &self.access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SyncError::sink_unavailable("Access token is not a valid header value"))?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        Ok(request.body(content))
    }
}

/// Server-side trouble and throttling are transient; anything else means the
/// write itself was rejected
fn classify_status(status: StatusCode, url: &str, body: &str) -> SyncError {
    let body = if body.len() > 500 {
        format!("{}... (truncated)", truncate_at_char_boundary(body, 500))
    } else {
        body.to_string()
    };
    let message = format!("HTTP {} from {}: {}", status.as_u16(), url, body);

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SyncError::sink_unavailable(message)
    } else {
        SyncError::write(message)
    }
}

fn classify_transport_error(e: reqwest::Error, url: &str) -> SyncError {
    if e.is_timeout() {
        SyncError::sink_unavailable(format!("Upload to {} timed out", url))
    } else if e.is_connect() {
        SyncError::sink_unavailable(format!(
            "Failed to connect to {}: check network connectivity and DNS. Error: {}",
            url, e
        ))
    } else {
        SyncError::write(format!("Upload to {} failed: {}", url, e))
    }
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl SnapshotSink for GcsSink {
    async fn write_snapshot(
        &self,
        blob_name: &str,
        content: Vec<u8>,
        metadata: &BlobMetadata,
    ) -> Result<()> {
        let url = self.object_url(blob_name);
        let size = content.len();

        let response = self
            .build_request(blob_name, content, metadata)?
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &url, &body);
            error!("[GcsSink] Upload of {} rejected: {}", blob_name, err);
            return Err(err);
        }

        debug!("[GcsSink] Uploaded gs://{}/{} ({} bytes)", self.bucket, blob_name, size);
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn metadata() -> BlobMetadata {
        BlobMetadata::new(Utc.with_ymd_and_hms(2026, 9, 1, 6, 30, 0).unwrap(), 42, 7)
    }

    #[test]
    fn test_request_carries_content_metadata_and_token() {
        let sink = GcsSink::new("risk-mirror", Some("ya29.token".to_string())).unwrap();

        let request = sink
            .build_request("sync/incidents.json", b"[]".to_vec(), &metadata())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(
            request.url().as_str(),
            "https://storage.googleapis.com/risk-mirror/sync/incidents.json"
        );

        let headers = request.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer ya29.token");
        assert_eq!(
            headers["x-goog-meta-lastsynctimestamp"],
            "2026-09-01T06:30:00.000Z"
        );
        assert_eq!(headers["x-goog-meta-recordcount"], "42");
        assert_eq!(headers["x-goog-meta-newrecordcount"], "7");
        assert_eq!(
            request.body().and_then(|b| b.as_bytes()),
            Some(b"[]".as_slice())
        );
    }

    #[test]
    fn test_anonymous_request_against_emulator() {
        let sink = GcsSink::new("local", None)
            .unwrap()
            .with_endpoint("http://localhost:4443/");

        let request = sink
            .build_request("sync/violations.json", Vec::new(), &metadata())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost:4443/local/sync/violations.json"
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_status_classification() {
        let url = "https://storage.googleapis.com/b/o";
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, url, "").kind(),
            "sink_unavailable"
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, url, "").kind(),
            "sink_unavailable"
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, url, "AccessDenied").kind(),
            "write_error"
        );

        let long_body = "é".repeat(400);
        let err = classify_status(StatusCode::BAD_REQUEST, url, &long_body);
        assert!(err.to_string().ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_sink_unavailable() {
        let sink = GcsSink::new("risk-mirror", None)
            .unwrap()
            .with_endpoint("http://127.0.0.1:1");

        let err = sink
            .write_snapshot("sync/incidents.json", b"[]".to_vec(), &metadata())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "sink_unavailable");
    }
}
