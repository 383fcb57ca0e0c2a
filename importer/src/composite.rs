//! Arbitrates between the node subscriber and the file source.

use async_trait::async_trait;
use blockfeed_types::{is_streamed_filename, SourceType};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

use crate::verifier::BlockStreamVerifier;
use crate::{BlockConfig, BlockSource, ImporterError, ImporterMetrics};

/// Consecutive failures after which a source counts as unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct Health {
    node_errors: u32,
    file_errors: u32,
}

impl Health {
    fn errors(&mut self, source: SourceType) -> &mut u32 {
        match source {
            SourceType::File => &mut self.file_errors,
            _ => &mut self.node_errors,
        }
    }
}

#[derive(Debug)]
struct State {
    current: SourceType,
    health: Health,
}

pub struct CompositeBlockSource {
    enabled: bool,
    source_type: SourceType,
    has_nodes: bool,
    node_source: Arc<dyn BlockSource>,
    file_source: Arc<dyn BlockSource>,
    verifier: Arc<BlockStreamVerifier>,
    metrics: Arc<ImporterMetrics>,
    state: Mutex<State>,
}

impl CompositeBlockSource {
    pub fn new(
        config: &BlockConfig,
        node_source: Arc<dyn BlockSource>,
        file_source: Arc<dyn BlockSource>,
        verifier: Arc<BlockStreamVerifier>,
        metrics: Arc<ImporterMetrics>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            source_type: config.source_type,
            has_nodes: !config.nodes.is_empty(),
            node_source,
            file_source,
            verifier,
            metrics,
            state: Mutex::new(State {
                current: SourceType::BlockNode,
                health: Health::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Which source the next `get()` goes to.
    ///
    /// In AUTO mode the current source is kept until it has failed
    /// [`UNHEALTHY_THRESHOLD`] times in a row, then the other one is tried.
    /// Once both are unhealthy every failure flips the choice. After blocks
    /// have been streamed the node subscriber gets twice as many attempts.
    pub async fn select(&self) -> Result<SourceType, ImporterError> {
        match self.source_type {
            SourceType::BlockNode | SourceType::File => return Ok(self.source_type),
            SourceType::Auto => {}
        }
        if !self.has_nodes {
            return Ok(SourceType::File);
        }

        let streamed = self
            .verifier
            .last_verified()
            .await?
            .is_some_and(|record| is_streamed_filename(&record.name));

        let mut state = self.state();
        let current = state.current;
        let threshold = match current {
            SourceType::BlockNode if streamed => UNHEALTHY_THRESHOLD * 2,
            _ => UNHEALTHY_THRESHOLD,
        };
        let errors = *state.health.errors(current);
        if errors >= threshold {
            let other = match current {
                SourceType::File => SourceType::BlockNode,
                _ => SourceType::File,
            };
            info!(
                "Switching from {} source to {} source after {} consecutive failures",
                current, other, errors
            );
            state.current = other;
        }
        Ok(state.current)
    }

    fn source(&self, source_type: SourceType) -> &Arc<dyn BlockSource> {
        match source_type {
            SourceType::File => &self.file_source,
            _ => &self.node_source,
        }
    }
}

#[async_trait]
impl BlockSource for CompositeBlockSource {
    /// Run one pull on the selected source.
    ///
    /// Failures are logged and counted against the source; only fatal
    /// verification errors are returned.
    async fn get(&self) -> Result<(), ImporterError> {
        if !self.enabled {
            return Ok(());
        }

        let selected = self.select().await?;
        match self.source(selected).get().await {
            Ok(()) => {
                *self.state().health.errors(selected) = 0;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to get block from {} source", selected);
                self.metrics
                    .source_failures
                    .with_label_values(&[selected.as_str()])
                    .inc();
                *self.state().health.errors(selected) += 1;
                if e.is_fatal() {
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }
}
