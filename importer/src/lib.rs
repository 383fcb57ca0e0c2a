//! Block ingestion core.
//!
//! Pulls blocks from redundant upstream sources and hands them downstream
//! verified and in strict, gap-free order:
//! - [`BlockNode`] wraps one upstream node: status probes, stream assembly,
//!   failure counting and readmission
//! - [`Scheduler`] orders nodes by priority and latency and decides when a
//!   switch is worth it; [`LatencyProbe`] measures the alternatives
//! - [`BlockNodeSubscriber`] and [`BlockFileSource`] pull the next block from
//!   nodes or object storage, [`CompositeBlockSource`] arbitrates between them
//! - [`BlockStreamVerifier`] checks continuity and threshold signatures and
//!   advances the shared [`Cursor`]

pub mod block_node;
pub mod composite;
pub mod config;
pub mod cursor;
pub mod error;
pub mod file_source;
pub mod importer;
pub mod latency;
pub mod latency_probe;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod provider;
pub mod reader;
pub mod scheduler;
pub mod shutdown;
pub mod source;
pub mod subscriber;
pub mod tracing_spans;
pub mod transformer;
pub mod tss;
pub mod verifier;

pub use block_node::BlockNode;
pub use composite::CompositeBlockSource;
pub use config::{
    BlockConfig, BucketConfig, BucketProvider, ImporterConfig, LedgerConfig, NodeConfig,
    SchedulerConfig, SchedulerPolicy, StreamConfig, VerifierConfig,
};
pub use cursor::{Cursor, CursorPosition};
pub use error::{BlockStreamError, ImporterError};
pub use file_source::{BlockFileSource, FileSourceOptions};
pub use importer::{Collaborators, Importer, NodeStatus};
pub use latency::LatencyTracker;
pub use latency_probe::LatencyProbe;
pub use logging::{init_logging, LogFormat};
pub use metrics::ImporterMetrics;
pub use notifier::{ChannelNotifier, LoggingNotifier};
pub use provider::{provider_from_config, HttpBucketProvider, LocalFileProvider};
pub use reader::BlockStreamReader;
pub use scheduler::Scheduler;
pub use shutdown::ShutdownController;
pub use source::{BlockSource, NextBlock};
pub use subscriber::BlockNodeSubscriber;
pub use transformer::{BlockFileTransformer, DefaultTransformer};
pub use tss::LedgerTssVerifier;
pub use verifier::{BlockStreamVerifier, CompatibilityWindow};
