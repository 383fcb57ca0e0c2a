//! Downloads compressed block artifacts from object storage.

use async_trait::async_trait;
use blockfeed_store::{StoreError, StreamFileData, StreamFileProvider};
use blockfeed_types::{block_filename, BlockFile, SourceType};
use chrono::{DateTime, FixedOffset};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn, Instrument};

use crate::reader::BlockStreamReader;
use crate::tracing_spans::get_block_span;
use crate::verifier::BlockStreamVerifier;
use crate::{BlockSource, ImporterConfig, ImporterError, ImporterMetrics, NextBlock};

#[derive(Clone, Debug)]
pub struct FileSourceOptions {
    pub network: String,
    /// The network is periodically reset; artifacts live under the newest
    /// `{network}-{RFC 3339 timestamp}` folder.
    pub resettable: bool,
    pub end_block_number: Option<u64>,
    pub persist_bytes: bool,
    /// Keep a copy of every downloaded artifact below `stream_path`.
    pub write_files: bool,
    pub stream_path: PathBuf,
    pub download_timeout: Duration,
}

impl FileSourceOptions {
    pub fn from_config(config: &ImporterConfig) -> Self {
        Self {
            network: config.network.clone(),
            resettable: config.block.bucket.resettable,
            end_block_number: config.end_block_number,
            persist_bytes: config.block.persist_bytes,
            write_files: config.block.write_files,
            stream_path: config.block.stream_path.clone(),
            download_timeout: config.block.bucket.download_timeout(),
        }
    }
}

pub struct BlockFileSource {
    provider: Arc<dyn StreamFileProvider>,
    verifier: Arc<BlockStreamVerifier>,
    reader: BlockStreamReader,
    options: FileSourceOptions,
    metrics: Arc<ImporterMetrics>,
    folder: OnceCell<String>,
}

impl BlockFileSource {
    pub fn new(
        provider: Arc<dyn StreamFileProvider>,
        verifier: Arc<BlockStreamVerifier>,
        reader: BlockStreamReader,
        options: FileSourceOptions,
        metrics: Arc<ImporterMetrics>,
    ) -> Self {
        Self {
            provider,
            verifier,
            reader,
            options,
            metrics,
            folder: OnceCell::new(),
        }
    }

    /// The folder artifacts are read from, resolved once.
    pub async fn network_folder(&self) -> Result<&str, ImporterError> {
        let folder = self
            .folder
            .get_or_try_init(|| async {
                if !self.options.resettable {
                    return Ok(self.options.network.clone());
                }
                let folders = self.provider.list_network().await?;
                let folder = latest_network_folder(&self.options.network, &folders)
                    .ok_or_else(|| ImporterError::NetworkDiscovery(self.options.network.clone()))?;
                info!("Discovered latest network folder '{}'", folder);
                Ok::<_, ImporterError>(folder)
            })
            .await?;
        Ok(folder)
    }

    async fn download(&self, key: &str) -> Result<(StreamFileData, BlockFile), ImporterError> {
        let data = match tokio::time::timeout(self.options.download_timeout, self.provider.get(key)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("download of {key} timed out"),
                ))
                .into())
            }
        }
        .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let file = self.reader.read_file(&data, self.options.persist_bytes)?;
        Ok((data, file))
    }

    async fn write_file(&self, data: &StreamFileData) {
        let path = self.options.stream_path.join(&data.key);
        let written = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data.bytes).await
        }
        .await;
        match written {
            Ok(()) => debug!(path = %path.display(), "Wrote block file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write block file"),
        }
    }

    async fn get_block(&self, number: u64) -> Result<(), ImporterError> {
        let filename = block_filename(number, true);
        let key = format!("{}/block/{}", self.network_folder().await?, filename);

        let (data, file) = self
            .download(&key)
            .await
            .map_err(|e| ImporterError::Download {
                filename: filename.clone(),
                source: Box::new(e),
            })?;

        let latency = data.last_modified - file.consensus_end / 1_000_000;
        self.metrics.cloud_latency_ms.observe(latency.max(0) as f64);
        debug!(block = number, latency_ms = latency, "Downloaded block file");

        self.verifier.verify(file).await?;

        if self.options.write_files {
            self.write_file(&data).await;
        }
        Ok(())
    }
}

/// The newest `{network}-{timestamp}` folder. Folders whose suffix is not
/// an RFC 3339 timestamp are ignored.
fn latest_network_folder(network: &str, folders: &[String]) -> Option<String> {
    let prefix = format!("{network}-");
    folders
        .iter()
        .filter_map(|folder| {
            let stamp = folder.strip_prefix(&prefix)?;
            let at: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(stamp).ok()?;
            Some((at, folder))
        })
        .max_by_key(|(at, _)| *at)
        .map(|(_, folder)| folder.clone())
}

#[async_trait]
impl BlockSource for BlockFileSource {
    async fn get(&self) -> Result<(), ImporterError> {
        let number = match self.verifier.next_block_number().await? {
            NextBlock::Earliest => {
                return Err(ImporterError::Unsupported(
                    "BlockFileSource doesn't support earliest available block number".into(),
                ))
            }
            next if next.is_past(self.options.end_block_number) => return Ok(()),
            NextBlock::Number(number) => number,
        };

        let span = get_block_span(SourceType::File.as_str(), number);
        self.get_block(number).instrument(span).await
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }
}
