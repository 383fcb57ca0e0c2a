//! Shared wiring for the importer integration tests.
#![allow(dead_code)]

use blockfeed_importer::{Collaborators, Importer, ImporterConfig, NodeConfig};
use blockfeed_nullables::{NullBlockNode, NullClock, NullFileProvider, NullNotifier};
use blockfeed_protocol::BlockNodeClient;
use blockfeed_store::{MemoryLedgerStore, MemoryRecordStore, StreamFileProvider};
use blockfeed_types::Ledger;
use std::sync::Arc;

/// Consensus end of generated block 0, in millis.
pub const GENESIS_MILLIS: i64 = 1_700_000_000_000;

pub struct Harness {
    pub importer: Importer,
    pub notifier: Arc<NullNotifier>,
    pub clock: Arc<NullClock>,
    pub record_store: Arc<MemoryRecordStore>,
}

pub fn node_config(host: &str, priority: u32) -> NodeConfig {
    NodeConfig {
        host: host.to_string(),
        port: 40840,
        priority,
    }
}

/// Config with one entry per null node, in order, using the node's endpoint
/// as host.
pub fn config_for(nodes: &[(Arc<NullBlockNode>, u32)]) -> ImporterConfig {
    let mut config = ImporterConfig::default();
    config.block.nodes = nodes
        .iter()
        .map(|(node, priority)| node_config(node.endpoint(), *priority))
        .collect();
    config
}

pub fn harness(
    config: ImporterConfig,
    nodes: Vec<Arc<NullBlockNode>>,
    provider: Arc<dyn StreamFileProvider>,
    ledger: Option<Ledger>,
) -> Harness {
    let notifier = Arc::new(NullNotifier::new());
    let clock = Arc::new(NullClock::new(GENESIS_MILLIS));
    let record_store = Arc::new(MemoryRecordStore::new());
    let ledger_store = Arc::new(MemoryLedgerStore::new());
    if let Some(ledger) = ledger {
        ledger_store.save(ledger).unwrap();
    }

    let clients = nodes
        .into_iter()
        .map(|node| node as Arc<dyn BlockNodeClient>)
        .collect();
    let importer = Importer::new(
        config,
        clients,
        Collaborators {
            record_store: record_store.clone(),
            ledger_store,
            provider,
            notifier: notifier.clone(),
            clock: clock.clone(),
        },
    )
    .expect("valid importer config");

    Harness {
        importer,
        notifier,
        clock,
        record_store,
    }
}

pub fn empty_bucket() -> Arc<NullFileProvider> {
    Arc::new(NullFileProvider::new())
}
