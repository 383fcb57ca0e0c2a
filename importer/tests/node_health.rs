//! Node failure counting, inactivity and readmission.

mod common;

use blockfeed_importer::{BlockNode, StreamConfig};
use blockfeed_nullables::{NullBlockNode, NullClock};
use blockfeed_protocol::StreamStatus;
use blockfeed_types::SourceType;
use common::{config_for, empty_bucket, harness};
use std::sync::Arc;

const READMIT_DELAY_MS: u64 = 1_000;

fn node(clock: &Arc<NullClock>) -> BlockNode {
    let config = StreamConfig {
        readmit_delay_ms: READMIT_DELAY_MS,
        ..StreamConfig::default()
    };
    BlockNode::new(Arc::new(NullBlockNode::new("a:1")), 0, 0, &config, clock.clone())
}

#[test]
fn third_consecutive_failure_marks_inactive() {
    let clock = Arc::new(NullClock::new(0));
    let node = node(&clock);

    node.on_error();
    node.on_error();
    assert!(node.is_active());
    node.on_error();
    assert!(!node.is_active());
}

#[test]
fn readmission_waits_for_the_delay() {
    let clock = Arc::new(NullClock::new(0));
    let node = node(&clock);
    for _ in 0..3 {
        node.on_error();
    }

    assert!(!node.try_readmit(false).is_active());
    clock.advance(READMIT_DELAY_MS as i64);
    assert!(!node.try_readmit(false).is_active());
    clock.advance(1);
    assert!(node.try_readmit(false).is_active());
}

#[test]
fn forced_readmission_ignores_the_delay() {
    let clock = Arc::new(NullClock::new(0));
    let node = node(&clock);
    for _ in 0..3 {
        node.on_error();
    }
    assert!(node.try_readmit(true).is_active());
}

#[test]
fn readmitted_node_counts_from_zero() {
    let clock = Arc::new(NullClock::new(0));
    let node = node(&clock);
    for _ in 0..3 {
        node.on_error();
    }
    assert!(!node.is_active());
    node.try_readmit(true);
    node.on_error();
    node.on_error();
    assert!(node.is_active());
    node.on_error();
    assert!(!node.is_active());
}

#[tokio::test]
async fn failures_accumulate_across_delivered_blocks() {
    let mut generator = blockfeed_nullables::BlockGenerator::new(1);
    let a = Arc::new(NullBlockNode::new("a:1").with_blocks(generator.blocks(1)));
    a.set_end_status(StreamStatus::NotAvailable);
    let mut config = config_for(&[(a.clone(), 0)]);
    config.block.source_type = SourceType::BlockNode;
    let h = harness(config, vec![a.clone()], empty_bucket(), Some(generator.ledger()));
    let node = &h.importer.scheduler().nodes()[0];

    // every subscription delivers a new block, then fails
    h.importer.get().await.unwrap();
    for _ in 0..2 {
        assert!(node.is_active());
        a.add_block(generator.next_block());
        h.importer.get().await.unwrap();
    }
    assert_eq!(h.notifier.indices(), vec![0, 1, 2]);
    assert!(!node.is_active());
}

#[tokio::test]
async fn failed_subscriptions_deactivate_the_node() {
    let mut generator = blockfeed_nullables::BlockGenerator::new(1);
    let a = Arc::new(NullBlockNode::new("a:1").with_blocks(generator.blocks(1)));
    a.fail_next_subscribes(3);
    let mut config = config_for(&[(a.clone(), 0)]);
    config.block.source_type = SourceType::BlockNode;
    let h = harness(config, vec![a.clone()], empty_bucket(), Some(generator.ledger()));

    for _ in 0..3 {
        h.importer.get().await.unwrap();
    }
    let node = &h.importer.scheduler().nodes()[0];
    assert!(!node.is_active());
    assert!(h.notifier.indices().is_empty());

    // the only node with the block is readmitted early
    h.importer.get().await.unwrap();
    assert!(node.is_active());
    assert_eq!(h.notifier.indices(), vec![0]);
    assert_eq!(a.subscriptions().len(), 4);
}
