//! Object storage backends for the file source.

use async_trait::async_trait;
use blockfeed_store::{StoreError, StreamFileData, StreamFileProvider};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use crate::config::{BucketConfig, BucketProvider};
use crate::ImporterError;

/// Build the provider selected in the bucket configuration.
pub fn provider_from_config(config: &BucketConfig) -> Result<Arc<dyn StreamFileProvider>, ImporterError> {
    Ok(match config.provider {
        BucketProvider::Local => Arc::new(LocalFileProvider::new(&config.root)),
        BucketProvider::Http => Arc::new(HttpBucketProvider::new(
            config.endpoint.clone(),
            config.download_timeout(),
        )?),
    })
}

// ── Local directory ─────────────────────────────────────────────────────

/// Objects laid out as plain files below a root directory.
#[derive(Clone, Debug)]
pub struct LocalFileProvider {
    root: PathBuf,
}

impl LocalFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StreamFileProvider for LocalFileProvider {
    async fn get(&self, key: &str) -> Result<Option<StreamFileData>, StoreError> {
        let path = self.root.join(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let last_modified = tokio::fs::metadata(&path)
            .await?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Ok(Some(StreamFileData {
            key: key.to_string(),
            bytes,
            last_modified,
        }))
    }

    async fn list_network(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        folders.sort();
        Ok(folders)
    }
}

// ── HTTP bucket ─────────────────────────────────────────────────────────

/// A bucket served over plain HTTP: objects at `{endpoint}/{key}`, the
/// network folder listing as a JSON array at `{endpoint}/`.
#[derive(Clone)]
pub struct HttpBucketProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpBucketProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ImporterError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ImporterError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn backend(e: reqwest::Error) -> StoreError {
    StoreError::Backend(format!("request failed: {e}"))
}

/// `Last-Modified` is an HTTP date; missing or malformed headers read as 0.
fn parse_last_modified(value: Option<&str>) -> i64 {
    value
        .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or_default()
}

#[async_trait]
impl StreamFileProvider for HttpBucketProvider {
    async fn get(&self, key: &str) -> Result<Option<StreamFileData>, StoreError> {
        let response = self
            .http
            .get(format!("{}/{}", self.endpoint, key))
            .send()
            .await
            .map_err(backend)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "bucket returned HTTP {} for {key}",
                response.status()
            )));
        }

        let last_modified = parse_last_modified(
            response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response.bytes().await.map_err(backend)?.to_vec();
        Ok(Some(StreamFileData {
            key: key.to_string(),
            bytes,
            last_modified,
        }))
    }

    async fn list_network(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .http
            .get(format!("{}/", self.endpoint))
            .send()
            .await
            .map_err(backend)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "bucket returned HTTP {} for the folder listing",
                response.status()
            )));
        }
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| StoreError::Serialization(format!("invalid folder listing: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_provider_reads_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("testnet/block")).unwrap();
        std::fs::create_dir_all(dir.path().join("previewnet")).unwrap();
        std::fs::write(dir.path().join("testnet/block/1.blk.zstd"), [1, 2, 3]).unwrap();

        let provider = LocalFileProvider::new(dir.path());
        let data = provider.get("testnet/block/1.blk.zstd").await.unwrap().unwrap();
        assert_eq!(data.bytes, vec![1, 2, 3]);
        assert!(data.last_modified > 0);
        assert!(provider.get("testnet/block/2.blk.zstd").await.unwrap().is_none());
        assert_eq!(
            provider.list_network().await.unwrap(),
            vec!["previewnet".to_string(), "testnet".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let provider = LocalFileProvider::new("/nonexistent/blockfeed/bucket");
        assert!(provider.list_network().await.unwrap().is_empty());
    }

    #[test]
    fn last_modified_header() {
        assert_eq!(
            parse_last_modified(Some("Thu, 01 Jan 1970 00:00:01 GMT")),
            1_000
        );
        assert_eq!(parse_last_modified(Some("yesterday")), 0);
        assert_eq!(parse_last_modified(None), 0);
    }

    #[test]
    fn endpoint_trailing_slash_is_dropped() {
        let provider = HttpBucketProvider::new("http://bucket.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(provider.endpoint(), "http://bucket.local");
    }
}
