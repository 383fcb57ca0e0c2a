//! Span constructors shared by the sources and the verifier.

use tracing::{info_span, Span};

/// One `get()` of a source.
pub fn get_block_span(source: &str, block_number: u64) -> Span {
    info_span!("get_block", source = %source, block = block_number)
}

/// Verification of a single block.
pub fn verify_block_span(block_number: u64) -> Span {
    info_span!("verify_block", block = block_number)
}

/// A latency measurement against a candidate node.
pub fn probe_span(node: &str, block_number: u64) -> Span {
    info_span!("latency_probe", node = %node, block = block_number)
}
