//! Node ordering, selection and switch decisions.

use blockfeed_types::Clock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::block_node::BlockNode;
use crate::config::{SchedulerConfig, SchedulerPolicy};
use crate::latency::UNMEASURED;
use crate::{ImporterError, ImporterMetrics, NextBlock};

/// Sentinel for "no block processed yet" in the post-processing latency.
const NO_PREVIOUS_BLOCK: i64 = 0;

pub struct Scheduler {
    nodes: Vec<Arc<BlockNode>>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<ImporterMetrics>,
    current: Mutex<Option<Arc<BlockNode>>>,
    /// Millis of the last change of the streaming node.
    last_switch: AtomicI64,
    last_post_processing_latency: AtomicI64,
    reschedule: AtomicBool,
    /// Rotates which candidates the latency probe measures.
    probe_offset: AtomicUsize,
}

impl Scheduler {
    pub fn new(
        nodes: Vec<Arc<BlockNode>>,
        config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<ImporterMetrics>,
    ) -> Self {
        Self {
            nodes,
            config: config.clone(),
            clock,
            metrics,
            current: Mutex::new(None),
            last_switch: AtomicI64::new(i64::MIN),
            last_post_processing_latency: AtomicI64::new(NO_PREVIOUS_BLOCK),
            reschedule: AtomicBool::new(false),
            probe_offset: AtomicUsize::new(0),
        }
    }

    pub fn nodes(&self) -> &[Arc<BlockNode>] {
        &self.nodes
    }

    pub fn policy(&self) -> SchedulerPolicy {
        self.config.policy
    }

    /// The node currently being streamed from.
    pub fn current(&self) -> Option<Arc<BlockNode>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every node in preference order; configuration order breaks ties.
    /// Unmeasured nodes come last within their tier.
    pub fn ordered(&self) -> Vec<Arc<BlockNode>> {
        let mut nodes = self.nodes.clone();
        match self.config.policy {
            SchedulerPolicy::Latency => nodes.sort_by_cached_key(|n| (latency_key(n), n.index())),
            SchedulerPolicy::PriorityThenLatency => {
                nodes.sort_by_cached_key(|n| (n.priority(), latency_key(n), n.index()))
            }
        }
        nodes
    }

    /// Pick the node to stream `next` from and the block to start at.
    ///
    /// The first active node that has the block wins. When none does, the
    /// first inactive node that has it is readmitted early.
    pub async fn select(&self, next: NextBlock) -> Result<(Arc<BlockNode>, u64), ImporterError> {
        let mut inactive = Vec::new();
        for node in self.ordered() {
            if !node.try_readmit(false).is_active() {
                inactive.push(node);
                continue;
            }
            if let Some(start) = Self::resolve(&node, next).await {
                self.set_current(&node);
                return Ok((node, start));
            }
        }

        for node in inactive {
            if let Some(start) = Self::resolve(&node, next).await {
                node.try_readmit(true);
                self.set_current(&node);
                return Ok((node, start));
            }
        }

        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Err(ImporterError::NoNodeAvailable(next))
    }

    async fn resolve(node: &BlockNode, next: NextBlock) -> Option<u64> {
        let range = node.block_range().await?;
        match next {
            NextBlock::Earliest => Some(range.first_available_block),
            NextBlock::Number(n) => range.contains(n).then_some(n),
        }
    }

    fn set_current(&self, node: &Arc<BlockNode>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let switched = current.as_ref().map_or(true, |c| c.index() != node.index());
        if switched {
            if current.is_some() {
                self.metrics.node_switches.inc();
            }
            self.last_switch.store(self.clock.now_millis(), Ordering::SeqCst);
            self.last_post_processing_latency
                .store(NO_PREVIOUS_BLOCK, Ordering::SeqCst);
        }
        *current = Some(Arc::clone(node));
        self.reschedule.store(false, Ordering::SeqCst);
    }

    /// Active alternatives to the current node: its own priority tier under
    /// [`SchedulerPolicy::PriorityThenLatency`], every other node under
    /// [`SchedulerPolicy::Latency`].
    pub fn candidates(&self) -> Vec<Arc<BlockNode>> {
        let Some(current) = self.current() else {
            return Vec::new();
        };
        self.ordered()
            .into_iter()
            .filter(|n| n.index() != current.index() && n.is_active())
            .filter(|n| match self.config.policy {
                SchedulerPolicy::Latency => true,
                SchedulerPolicy::PriorityThenLatency => n.priority() == current.priority(),
            })
            .collect()
    }

    /// Up to `limit` candidates, rotating through all of them across calls.
    pub fn probe_candidates(&self, limit: usize) -> Vec<Arc<BlockNode>> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return candidates;
        }
        let offset = self.probe_offset.fetch_add(limit, Ordering::SeqCst) % candidates.len();
        candidates
            .iter()
            .cycle()
            .skip(offset)
            .take(limit.min(candidates.len()))
            .cloned()
            .collect()
    }

    /// Account for a verified streamed block.
    ///
    /// The latency sample (`completed_at` minus consensus end) is dropped
    /// when processing of the previous block took too long, since a slow
    /// consumer delays reading the stream and skews it.
    pub fn record_block(&self, node: &BlockNode, consensus_end_nanos: i64, completed_at: i64) {
        let processed_at = self.clock.now_millis();
        let previous = self
            .last_post_processing_latency
            .swap(processed_at - completed_at, Ordering::SeqCst);
        if previous > self.config.max_post_processing_latency_ms as i64 {
            debug!(node = %node, previous_ms = previous, "Skipping latency sample after slow processing");
            return;
        }
        let latency = completed_at - consensus_end_nanos / 1_000_000;
        node.record_latency(latency);
        self.metrics.stream_latency_ms.observe(latency.max(0) as f64);
    }

    /// Decide whether the current node should be replaced.
    ///
    /// A switch is requested only when the last switch is older than the
    /// minimum interval, a candidate is faster by more than the threshold,
    /// and that candidate has block `next`. Unmeasured nodes never trigger.
    pub async fn evaluate(&self, next: u64) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        let since_switch = self
            .clock
            .now_millis()
            .saturating_sub(self.last_switch.load(Ordering::SeqCst));
        if since_switch <= self.config.min_reschedule_interval_ms as i64 {
            return false;
        }
        let current_latency = current.latency();
        if current_latency == UNMEASURED {
            return false;
        }

        for candidate in self.candidates() {
            let latency = candidate.latency();
            if latency == UNMEASURED {
                continue;
            }
            let gap = current_latency.saturating_sub(latency);
            if gap > self.config.latency_switch_threshold_ms as i64 && candidate.has_block(next).await {
                info!(
                    "Rescheduling from {} ({} ms) to {} ({} ms) at block {}",
                    current, current_latency, candidate, latency, next
                );
                self.reschedule.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    /// Whether a switch was requested since the last selection.
    pub fn should_reschedule(&self) -> bool {
        self.reschedule.load(Ordering::SeqCst)
    }
}

fn latency_key(node: &BlockNode) -> (bool, i64) {
    let latency = node.latency();
    (latency == UNMEASURED, latency)
}
