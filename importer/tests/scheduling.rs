//! Node preference and switching between nodes.

mod common;

use async_trait::async_trait;
use blockfeed_importer::{
    BlockNode, BlockNodeSubscriber, BlockSource, BlockStreamReader, BlockStreamVerifier, Cursor,
    ImporterMetrics, LatencyTracker, LedgerTssVerifier, NextBlock, Scheduler, SchedulerConfig,
    SchedulerPolicy, StreamConfig,
};
use blockfeed_nullables::{BlockGenerator, NullBlockNode, NullClock};
use blockfeed_store::{MemoryLedgerStore, MemoryRecordStore, StreamFileNotifier};
use blockfeed_types::VerifiedRecord;
use common::GENESIS_MILLIS;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn nodes_with(
    layout: &[(&str, u32, usize)],
    generator_seed: u8,
    clock: &Arc<NullClock>,
) -> (Vec<Arc<NullBlockNode>>, Vec<Arc<BlockNode>>) {
    let mut generator = BlockGenerator::new(generator_seed);
    let max = layout.iter().map(|s| s.2).max().unwrap_or(0);
    let blocks = generator.blocks(max);
    let clients: Vec<_> = layout
        .iter()
        .map(|(endpoint, _, count)| {
            Arc::new(NullBlockNode::new(*endpoint).with_blocks(blocks[..*count].to_vec()))
        })
        .collect();
    let nodes = clients
        .iter()
        .zip(layout)
        .enumerate()
        .map(|(index, (client, (_, priority, _)))| {
            Arc::new(BlockNode::new(
                client.clone(),
                index,
                *priority,
                &StreamConfig::default(),
                clock.clone(),
            ))
        })
        .collect();
    (clients, nodes)
}

#[tokio::test]
async fn preferred_priority_wins_regardless_of_config_order() {
    let clock = Arc::new(NullClock::new(0));
    let (_, nodes) = nodes_with(&[("a:1", 1, 3), ("b:1", 0, 3)], 1, &clock);
    let scheduler = Scheduler::new(
        nodes,
        &SchedulerConfig::default(),
        clock,
        Arc::new(ImporterMetrics::new()),
    );
    let (node, start) = scheduler.select(NextBlock::Number(0)).await.unwrap();
    assert_eq!(node.endpoint(), "b:1");
    assert_eq!(start, 0);
}

#[tokio::test]
async fn lower_latency_wins_within_a_tier() {
    let clock = Arc::new(NullClock::new(0));
    let (_, nodes) = nodes_with(&[("a:1", 0, 3), ("b:1", 0, 3)], 1, &clock);
    nodes[0].record_latency(300);
    nodes[1].record_latency(100);
    let scheduler = Scheduler::new(
        nodes,
        &SchedulerConfig::default(),
        clock,
        Arc::new(ImporterMetrics::new()),
    );
    let (node, _) = scheduler.select(NextBlock::Number(1)).await.unwrap();
    assert_eq!(node.endpoint(), "b:1");
}

#[tokio::test]
async fn nodes_without_the_block_are_skipped() {
    let clock = Arc::new(NullClock::new(0));
    let (_, nodes) = nodes_with(&[("a:1", 0, 1), ("b:1", 1, 3)], 1, &clock);
    let scheduler = Scheduler::new(
        nodes,
        &SchedulerConfig::default(),
        clock,
        Arc::new(ImporterMetrics::new()),
    );
    let (node, _) = scheduler.select(NextBlock::Number(2)).await.unwrap();
    assert_eq!(node.endpoint(), "b:1");
}

#[tokio::test]
async fn switches_respect_hysteresis() {
    let clock = Arc::new(NullClock::new(0));
    let (_, nodes) = nodes_with(&[("a:1", 0, 3), ("b:1", 0, 3)], 1, &clock);
    let config = SchedulerConfig {
        min_reschedule_interval_ms: 10_000,
        latency_switch_threshold_ms: 500,
        ..SchedulerConfig::default()
    };
    let metrics = Arc::new(ImporterMetrics::new());
    let scheduler = Scheduler::new(nodes.clone(), &config, clock.clone(), metrics.clone());
    scheduler.select(NextBlock::Number(0)).await.unwrap();
    nodes[0].record_latency(1_000);

    // candidate not measured yet
    clock.advance(20_000);
    assert!(!scheduler.evaluate(1).await);

    // measured, but not faster by more than the threshold
    nodes[1].record_latency(600);
    assert!(!scheduler.evaluate(1).await);

    // faster, but the candidate does not have the block
    nodes[1].record_latency(100);
    nodes[1].record_latency(100);
    assert!(!scheduler.evaluate(3).await);

    assert!(scheduler.evaluate(1).await);
    assert!(scheduler.should_reschedule());

    // the next selection takes the faster node and clears the request
    let (node, _) = scheduler.select(NextBlock::Number(1)).await.unwrap();
    assert_eq!(node.endpoint(), "b:1");
    assert!(!scheduler.should_reschedule());
    assert_eq!(metrics.node_switches.get(), 1);

    // a fresh switch is not allowed before the interval has passed again
    nodes[0].record_latency(-5_000);
    nodes[0].record_latency(-5_000);
    nodes[0].record_latency(-5_000);
    assert!(!scheduler.evaluate(1).await);
    clock.advance(10_001);
    assert!(scheduler.evaluate(1).await);
}

/// Makes `faster` look fast and asks for a switch while block 1 is handed
/// downstream, i.e. in the middle of a subscription.
struct SwitchDuringBlockOne {
    scheduler: Arc<Scheduler>,
    faster: Arc<BlockNode>,
    clock: Arc<NullClock>,
    seen: Mutex<Vec<(u64, String)>>,
}

#[async_trait]
impl StreamFileNotifier for SwitchDuringBlockOne {
    async fn verified(&self, record: VerifiedRecord) {
        if record.index == 1 {
            for _ in 0..3 {
                self.faster.record_latency(10);
            }
            self.clock.advance(120_000);
            assert!(self.scheduler.evaluate(2).await);
        }
        self.seen.lock().unwrap().push((record.index, record.node));
    }
}

#[tokio::test]
async fn subscriber_switches_only_at_block_boundaries() {
    let clock = Arc::new(NullClock::new(GENESIS_MILLIS));
    let mut generator = BlockGenerator::new(2);
    let ledger = generator.ledger();
    let blocks = generator.blocks(6);
    let a = Arc::new(NullBlockNode::new("a:1").with_blocks(blocks.clone()));
    let b = Arc::new(NullBlockNode::new("b:1").with_blocks(blocks));
    a.set_items_per_set(2);

    let nodes: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .enumerate()
        .map(|(index, client)| {
            Arc::new(BlockNode::new(client, index, 0, &StreamConfig::default(), clock.clone()))
        })
        .collect();
    for _ in 0..3 {
        nodes[0].record_latency(1_000);
        nodes[1].record_latency(2_000);
    }
    let metrics = Arc::new(ImporterMetrics::new());
    let scheduler = Arc::new(Scheduler::new(
        nodes.clone(),
        &SchedulerConfig::default(),
        clock.clone(),
        metrics.clone(),
    ));
    let notifier = Arc::new(SwitchDuringBlockOne {
        scheduler: scheduler.clone(),
        faster: nodes[1].clone(),
        clock: clock.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let verifier = Arc::new(BlockStreamVerifier::new(
        Arc::new(Cursor::new(Arc::new(MemoryRecordStore::new()))),
        LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), Some(ledger)),
        notifier.clone(),
        metrics.clone(),
    ));
    let subscriber = BlockNodeSubscriber::new(
        scheduler.clone(),
        verifier,
        BlockStreamReader::new(clock.clone()),
        None,
    );

    // the first subscription ends right after block 1
    subscriber.get().await.unwrap();
    subscriber.get().await.unwrap();

    let seen = notifier.seen.lock().unwrap().clone();
    let expected: Vec<(u64, String)> = [(0, "a:1"), (1, "a:1"), (2, "b:1"), (3, "b:1"), (4, "b:1"), (5, "b:1")]
        .into_iter()
        .map(|(index, node)| (index, node.to_string()))
        .collect();
    assert_eq!(seen, expected);
    assert_eq!(a.subscriptions().len(), 1);
    assert_eq!(b.subscriptions()[0].start_block_number, 2);
    assert_eq!(metrics.node_switches.get(), 1);
}

#[tokio::test]
async fn measured_node_is_preferred_over_an_unmeasured_one() {
    let clock = Arc::new(NullClock::new(0));
    let (_, nodes) = nodes_with(&[("unmeasured:1", 0, 3), ("measured:1", 0, 3)], 1, &clock);
    assert_eq!(LatencyTracker::new().latency(), i64::MIN);
    nodes[1].record_latency(10);

    for policy in [SchedulerPolicy::Latency, SchedulerPolicy::PriorityThenLatency] {
        let config = SchedulerConfig {
            policy,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(
            nodes.clone(),
            &config,
            clock.clone(),
            Arc::new(ImporterMetrics::new()),
        );
        let order: Vec<_> = scheduler.ordered().iter().map(|n| n.endpoint().to_string()).collect();
        assert_eq!(order, vec!["measured:1", "unmeasured:1"]);
        let (node, _) = scheduler.select(NextBlock::Number(0)).await.unwrap();
        assert_eq!(node.endpoint(), "measured:1");
    }
}

proptest! {
    /// The statistic is always one of the recent samples and never exceeds
    /// their range.
    #[test]
    fn latency_is_a_recent_sample(samples in prop::collection::vec(-10_000i64..10_000, 1..40)) {
        let mut tracker = LatencyTracker::new();
        for s in &samples {
            tracker.record(*s);
        }
        let recent = &samples[samples.len().saturating_sub(5)..];
        let latency = tracker.latency();
        prop_assert!(recent.contains(&latency));
        prop_assert!(latency >= *recent.iter().min().unwrap());
        prop_assert!(latency <= *recent.iter().max().unwrap());
    }
}
