//! The block source abstraction shared by the node subscriber, the file
//! source and the composite arbiter.

use async_trait::async_trait;
use blockfeed_types::SourceType;
use std::fmt;

use crate::ImporterError;

/// The block a source should pull next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextBlock {
    Number(u64),
    /// Nothing verified and no start configured: whatever a node serves first.
    Earliest,
}

impl NextBlock {
    /// Whether the configured end bound has been passed.
    pub fn is_past(&self, end_block_number: Option<u64>) -> bool {
        match (self, end_block_number) {
            (NextBlock::Number(next), Some(end)) => *next > end,
            _ => false,
        }
    }
}

impl fmt::Display for NextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextBlock::Number(n) => write!(f, "{n}"),
            NextBlock::Earliest => f.write_str("earliest available"),
        }
    }
}

#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Pull, verify and hand downstream the next block(s).
    async fn get(&self) -> Result<(), ImporterError>;

    fn source_type(&self) -> SourceType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_bound_is_inclusive() {
        assert!(!NextBlock::Number(5).is_past(Some(5)));
        assert!(NextBlock::Number(6).is_past(Some(5)));
        assert!(!NextBlock::Number(6).is_past(None));
        assert!(!NextBlock::Earliest.is_past(Some(0)));
    }
}
