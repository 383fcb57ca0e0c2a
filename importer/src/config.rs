//! Importer configuration with TOML file support.

use blockfeed_types::{Ledger, NodeContribution, SourceType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::verifier::CompatibilityWindow;
use crate::ImporterError;

/// Configuration of the importer.
///
/// Can be loaded from a TOML file via [`ImporterConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImporterConfig {
    /// Network name, the top-level prefix in object storage.
    #[serde(default = "default_network")]
    pub network: String,

    /// First block to import when nothing has been verified yet.
    #[serde(default)]
    pub start_block_number: Option<u64>,

    /// Last block to import, inclusive.
    #[serde(default)]
    pub end_block_number: Option<u64>,

    /// Start from the first block the selected node can serve.
    #[serde(default)]
    pub earliest_available: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub block: BlockConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_source_type")]
    pub source_type: SourceType,

    /// Delay between two pulls of the ingestion loop.
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,

    /// Keep raw downloaded bytes on the block handed downstream.
    #[serde(default)]
    pub persist_bytes: bool,

    /// Archive downloaded artifacts under `stream_path`.
    #[serde(default)]
    pub write_files: bool,

    #[serde(default = "default_stream_path")]
    pub stream_path: PathBuf,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub bucket: BucketConfig,

    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Bootstrap ledger used until one is persisted or published.
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,

    #[serde(default = "default_node_port")]
    pub port: u16,

    /// Lower is preferred.
    #[serde(default)]
    pub priority: u32,
}

impl NodeConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_max_block_items")]
    pub max_block_items: usize,

    /// Consecutive failures after which a node is marked inactive.
    #[serde(default = "default_max_subscribe_attempts")]
    pub max_subscribe_attempts: u32,

    #[serde(default = "default_readmit_delay_ms")]
    pub readmit_delay_ms: u64,

    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,

    /// Longest wait for the next complete block of a subscription.
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,

    /// Responses buffered ahead of the consumer per subscription.
    #[serde(default = "default_response_buffer")]
    pub response_buffer: usize,
}

impl StreamConfig {
    pub fn readmit_delay(&self) -> Duration {
        Duration::from_millis(self.readmit_delay_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    /// Lowest latency first.
    Latency,
    /// Lowest priority number first, lowest latency within a priority.
    #[default]
    PriorityThenLatency,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: SchedulerPolicy,

    /// Minimum time between two node switches.
    #[serde(default = "default_min_reschedule_interval_ms")]
    pub min_reschedule_interval_ms: u64,

    /// Latency advantage a candidate needs before a switch.
    #[serde(default = "default_latency_switch_threshold_ms")]
    pub latency_switch_threshold_ms: u64,

    /// Latency is not sampled after a block whose processing took longer.
    #[serde(default = "default_max_post_processing_latency_ms")]
    pub max_post_processing_latency_ms: u64,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketProvider {
    /// A directory mirroring the bucket layout.
    #[default]
    Local,
    /// An HTTP endpoint serving objects by key.
    Http,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(default)]
    pub provider: BucketProvider,

    /// Root directory for the local provider.
    #[serde(default = "default_bucket_root")]
    pub root: PathBuf,

    /// Base URL for the HTTP provider.
    #[serde(default)]
    pub endpoint: String,

    /// Artifacts live under the newest `{network}-{RFC 3339}` folder.
    #[serde(default)]
    pub resettable: bool,

    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
}

impl BucketConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

/// Versions for which a previous-hash mismatch is tolerated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default = "default_compat_from")]
    pub compat_from: String,

    /// Exclusive upper bound.
    #[serde(default = "default_compat_until")]
    pub compat_until: String,

    #[serde(default = "default_compat_excluded_pre_release")]
    pub compat_excluded_pre_release: String,
}

impl VerifierConfig {
    pub fn compatibility_window(&self) -> Result<CompatibilityWindow, ImporterError> {
        let parse = |s: &str| {
            s.parse()
                .map_err(|e| ImporterError::Config(format!("invalid compatibility version '{s}': {e}")))
        };
        Ok(CompatibilityWindow::new(
            parse(&self.compat_from)?,
            parse(&self.compat_until)?,
            self.compat_excluded_pre_release.clone(),
        ))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Hex-encoded compressed threshold public key.
    pub ledger_id: String,

    #[serde(default)]
    pub history_proof_verification_key: String,

    #[serde(default)]
    pub node_contributions: Vec<NodeContributionConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeContributionConfig {
    pub node_id: u64,
    pub weight: u64,
    #[serde(default)]
    pub history_proof_key: String,
}

impl LedgerConfig {
    pub fn to_ledger(&self) -> Result<Ledger, ImporterError> {
        let decode = |field: &str, value: &str| {
            hex::decode(value).map_err(|e| ImporterError::Config(format!("invalid hex in {field}: {e}")))
        };
        let node_contributions = self
            .node_contributions
            .iter()
            .map(|c| {
                Ok(NodeContribution {
                    node_id: c.node_id,
                    weight: c.weight,
                    history_proof_key: decode("history_proof_key", &c.history_proof_key)?,
                })
            })
            .collect::<Result<_, ImporterError>>()?;

        Ok(Ledger {
            ledger_id: decode("ledger_id", &self.ledger_id)?,
            history_proof_verification_key: decode(
                "history_proof_verification_key",
                &self.history_proof_verification_key,
            )?,
            node_contributions,
            consensus_timestamp: 0,
        })
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> String {
    "testnet".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_source_type() -> SourceType {
    SourceType::Auto
}

fn default_frequency_ms() -> u64 {
    100
}

fn default_stream_path() -> PathBuf {
    PathBuf::from("./blockfeed_data/streams")
}

fn default_node_port() -> u16 {
    40840
}

fn default_max_block_items() -> usize {
    800_000
}

fn default_max_subscribe_attempts() -> u32 {
    3
}

fn default_readmit_delay_ms() -> u64 {
    60_000
}

fn default_status_timeout_ms() -> u64 {
    5_000
}

fn default_block_timeout_ms() -> u64 {
    10_000
}

fn default_response_buffer() -> usize {
    32
}

fn default_min_reschedule_interval_ms() -> u64 {
    60_000
}

fn default_latency_switch_threshold_ms() -> u64 {
    500
}

fn default_max_post_processing_latency_ms() -> u64 {
    500
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_bucket_root() -> PathBuf {
    PathBuf::from("./blockfeed_data/bucket")
}

fn default_download_timeout_ms() -> u64 {
    30_000
}

fn default_compat_from() -> String {
    "0.68.0".to_string()
}

fn default_compat_until() -> String {
    "0.69.0".to_string()
}

fn default_compat_excluded_pre_release() -> String {
    "alpha".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ImporterConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ImporterError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ImporterError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ImporterError> {
        toml::from_str(s).map_err(|e| ImporterError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("ImporterConfig is always serializable to TOML")
    }

    /// Reject combinations the importer cannot run with.
    pub fn validate(&self) -> Result<(), ImporterError> {
        let invalid = |msg: &str| Err(ImporterError::Config(msg.to_string()));

        if self.block.stream.max_block_items == 0 {
            return invalid("block.stream.max_block_items must be positive");
        }
        if self.block.stream.max_subscribe_attempts == 0 {
            return invalid("block.stream.max_subscribe_attempts must be positive");
        }
        if let (Some(start), Some(end)) = (self.start_block_number, self.end_block_number) {
            if end < start {
                return invalid("end_block_number must not be less than start_block_number");
            }
        }
        if self.block.nodes.iter().any(|n| n.host.trim().is_empty()) {
            return invalid("block node host must not be empty");
        }
        if self.block.source_type == SourceType::BlockNode && self.block.nodes.is_empty() {
            return invalid("source_type block_node requires at least one block node");
        }
        if self.earliest_available && self.start_block_number.is_some() {
            return invalid("earliest_available and start_block_number are mutually exclusive");
        }
        if self.block.bucket.provider == BucketProvider::Http && self.block.bucket.endpoint.is_empty() {
            return invalid("block.bucket.endpoint is required for the http provider");
        }
        self.block.verifier.compatibility_window()?;
        if let Some(ledger) = &self.block.ledger {
            ledger.to_ledger()?;
        }
        Ok(())
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            start_block_number: None,
            end_block_number: None,
            earliest_available: false,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            block: BlockConfig::default(),
        }
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_type: default_source_type(),
            frequency_ms: default_frequency_ms(),
            persist_bytes: false,
            write_files: false,
            stream_path: default_stream_path(),
            nodes: Vec::new(),
            stream: StreamConfig::default(),
            scheduler: SchedulerConfig::default(),
            bucket: BucketConfig::default(),
            verifier: VerifierConfig::default(),
            ledger: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_block_items: default_max_block_items(),
            max_subscribe_attempts: default_max_subscribe_attempts(),
            readmit_delay_ms: default_readmit_delay_ms(),
            status_timeout_ms: default_status_timeout_ms(),
            block_timeout_ms: default_block_timeout_ms(),
            response_buffer: default_response_buffer(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerPolicy::default(),
            min_reschedule_interval_ms: default_min_reschedule_interval_ms(),
            latency_switch_threshold_ms: default_latency_switch_threshold_ms(),
            max_post_processing_latency_ms: default_max_post_processing_latency_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            provider: BucketProvider::default(),
            root: default_bucket_root(),
            endpoint: String::new(),
            resettable: false,
            download_timeout_ms: default_download_timeout_ms(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            compat_from: default_compat_from(),
            compat_until: default_compat_until(),
            compat_excluded_pre_release: default_compat_excluded_pre_release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = ImporterConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = ImporterConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.network, config.network);
        assert_eq!(parsed.block.stream.max_block_items, config.block.stream.max_block_items);
        assert_eq!(parsed.block.scheduler.policy, SchedulerPolicy::PriorityThenLatency);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ImporterConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.network, "testnet");
        assert!(config.block.enabled);
        assert_eq!(config.block.source_type, SourceType::Auto);
        assert_eq!(config.block.stream.max_subscribe_attempts, 3);
        assert_eq!(config.log_format, "human");
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            network = "mainnet"
            start_block_number = 10

            [block]
            source_type = "block_node"

            [[block.nodes]]
            host = "node-a"
            priority = 1

            [[block.nodes]]
            host = "node-b"
            port = 9000

            [block.scheduler]
            policy = "latency"
        "#;
        let config = ImporterConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.network, "mainnet");
        assert_eq!(config.start_block_number, Some(10));
        assert_eq!(config.block.nodes.len(), 2);
        assert_eq!(config.block.nodes[0].endpoint(), "node-a:40840");
        assert_eq!(config.block.nodes[1].endpoint(), "node-b:9000");
        assert_eq!(config.block.scheduler.policy, SchedulerPolicy::Latency);
        assert_eq!(config.block.stream.readmit_delay_ms, 60_000); // default
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = ImporterConfig::from_toml_file("/nonexistent/blockfeed.toml");
        assert!(matches!(result.unwrap_err(), ImporterError::Config(_)));
    }

    #[test]
    fn validation_rejects_inconsistent_settings() {
        let mut config = ImporterConfig {
            start_block_number: Some(5),
            end_block_number: Some(4),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.end_block_number = None;
        config.earliest_available = true;
        assert!(config.validate().is_err());

        let mut config = ImporterConfig::default();
        config.block.source_type = SourceType::BlockNode;
        assert!(config.validate().is_err());

        let mut config = ImporterConfig::default();
        config.block.stream.max_block_items = 0;
        assert!(config.validate().is_err());

        let mut config = ImporterConfig::default();
        config.block.verifier.compat_from = "not-a-version".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bootstrap_ledger_decodes_hex() {
        let config = LedgerConfig {
            ledger_id: "0a0b".into(),
            history_proof_verification_key: String::new(),
            node_contributions: vec![NodeContributionConfig {
                node_id: 3,
                weight: 5,
                history_proof_key: "ff".into(),
            }],
        };
        let ledger = config.to_ledger().unwrap();
        assert_eq!(ledger.ledger_id, vec![0x0a, 0x0b]);
        assert_eq!(ledger.node_contributions[0].history_proof_key, vec![0xff]);

        let bad = LedgerConfig {
            ledger_id: "zz".into(),
            ..config
        };
        assert!(matches!(bad.to_ledger(), Err(ImporterError::Config(_))));
    }
}
