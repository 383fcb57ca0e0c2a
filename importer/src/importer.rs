//! Wires the sources, scheduler and verifier together and runs the
//! ingestion loop.

use blockfeed_protocol::{BlockNodeClient, ServerStatusResponse, TcpBlockNodeClient};
use blockfeed_store::{LedgerStore, RecordFileStore, StreamFileNotifier, StreamFileProvider};
use blockfeed_types::{Clock, SourceType};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::block_node::BlockNode;
use crate::cursor::Cursor;
use crate::file_source::{BlockFileSource, FileSourceOptions};
use crate::latency_probe::LatencyProbe;
use crate::reader::BlockStreamReader;
use crate::scheduler::Scheduler;
use crate::subscriber::BlockNodeSubscriber;
use crate::tss::LedgerTssVerifier;
use crate::verifier::BlockStreamVerifier;
use crate::{
    BlockSource, CompositeBlockSource, ImporterConfig, ImporterError, ImporterMetrics,
    ShutdownController,
};

/// External collaborators of the importer.
#[derive(Clone)]
pub struct Collaborators {
    pub record_store: Arc<dyn RecordFileStore>,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub provider: Arc<dyn StreamFileProvider>,
    pub notifier: Arc<dyn StreamFileNotifier>,
    pub clock: Arc<dyn Clock>,
}

/// Availability of one configured block node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub endpoint: String,
    /// `None` when the node serves nothing or could not be reached.
    pub range: Option<ServerStatusResponse>,
}

pub struct Importer {
    config: ImporterConfig,
    composite: CompositeBlockSource,
    scheduler: Arc<Scheduler>,
    verifier: Arc<BlockStreamVerifier>,
    probe: Arc<LatencyProbe>,
    metrics: Arc<ImporterMetrics>,
}

impl Importer {
    /// Build an importer talking to `clients`, one per configured node and in
    /// the same order.
    pub fn new(
        config: ImporterConfig,
        clients: Vec<Arc<dyn BlockNodeClient>>,
        collaborators: Collaborators,
    ) -> Result<Self, ImporterError> {
        config.validate()?;
        if clients.len() != config.block.nodes.len() {
            return Err(ImporterError::Config(format!(
                "{} block node clients for {} configured nodes",
                clients.len(),
                config.block.nodes.len()
            )));
        }

        let Collaborators {
            record_store,
            ledger_store,
            provider,
            notifier,
            clock,
        } = collaborators;
        let metrics = Arc::new(ImporterMetrics::new());

        let bootstrap = config
            .block
            .ledger
            .as_ref()
            .map(|ledger| ledger.to_ledger())
            .transpose()?;
        let verifier = Arc::new(
            BlockStreamVerifier::new(
                Arc::new(Cursor::new(record_store)),
                LedgerTssVerifier::new(ledger_store, bootstrap),
                notifier,
                metrics.clone(),
            )
            .with_compatibility_window(config.block.verifier.compatibility_window()?)
            .with_start(config.start_block_number, config.earliest_available),
        );

        let nodes = clients
            .into_iter()
            .zip(&config.block.nodes)
            .enumerate()
            .map(|(index, (client, node))| {
                Arc::new(BlockNode::new(
                    client,
                    index,
                    node.priority,
                    &config.block.stream,
                    clock.clone(),
                ))
            })
            .collect();
        let scheduler = Arc::new(Scheduler::new(
            nodes,
            &config.block.scheduler,
            clock.clone(),
            metrics.clone(),
        ));

        let subscriber = Arc::new(BlockNodeSubscriber::new(
            scheduler.clone(),
            verifier.clone(),
            BlockStreamReader::new(clock.clone()),
            config.end_block_number,
        ));
        let file_source = Arc::new(BlockFileSource::new(
            provider,
            verifier.clone(),
            BlockStreamReader::new(clock.clone()),
            FileSourceOptions::from_config(&config),
            metrics.clone(),
        ));
        let composite = CompositeBlockSource::new(
            &config.block,
            subscriber,
            file_source,
            verifier.clone(),
            metrics.clone(),
        );
        let probe = Arc::new(LatencyProbe::new(
            scheduler.clone(),
            verifier.clone(),
            BlockStreamReader::new(clock),
            Duration::from_millis(config.block.scheduler.probe_interval_ms),
            config.block.stream.block_timeout(),
        ));

        Ok(Self {
            config,
            composite,
            scheduler,
            verifier,
            probe,
            metrics,
        })
    }

    /// Build an importer with a TCP client per configured node.
    pub fn from_config(config: ImporterConfig, collaborators: Collaborators) -> Result<Self, ImporterError> {
        let clients = config
            .block
            .nodes
            .iter()
            .map(|node| {
                Arc::new(
                    TcpBlockNodeClient::new(node.endpoint())
                        .with_response_buffer(config.block.stream.response_buffer),
                ) as Arc<dyn BlockNodeClient>
            })
            .collect();
        Self::new(config, clients, collaborators)
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ImporterMetrics> {
        &self.metrics
    }

    pub fn verifier(&self) -> &Arc<BlockStreamVerifier> {
        &self.verifier
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// One pull through the composite source.
    pub async fn get(&self) -> Result<(), ImporterError> {
        self.composite.get().await
    }

    /// Probe every configured node for its available block range.
    pub async fn node_status(&self) -> Vec<NodeStatus> {
        let mut statuses = Vec::with_capacity(self.scheduler.nodes().len());
        for node in self.scheduler.nodes() {
            statuses.push(NodeStatus {
                endpoint: node.endpoint().to_string(),
                range: node.block_range().await,
            });
        }
        statuses
    }

    /// Pull every `frequency_ms` until shutdown. A fatal verification error
    /// stops the loop and is returned.
    pub async fn run(&self, shutdown: &ShutdownController) -> Result<(), ImporterError> {
        let mut stop = shutdown.subscribe();
        let probe = (!self.scheduler.nodes().is_empty() && self.config.block.source_type != SourceType::File)
            .then(|| Arc::clone(&self.probe).spawn(shutdown.subscribe()));

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.block.frequency_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            network = %self.config.network,
            source = %self.config.block.source_type,
            nodes = self.scheduler.nodes().len(),
            "Importer started"
        );

        let result = loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.recv() => break Ok(()),
            }
            tokio::select! {
                pulled = self.get() => match pulled {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Stopping importer after fatal error");
                        break Err(e);
                    }
                    Err(e) => warn!(error = %e, "Block pull failed"),
                },
                _ = stop.recv() => break Ok(()),
            }
        };

        if let Some(probe) = probe {
            probe.abort();
        }
        info!("Importer stopped");
        result
    }
}
