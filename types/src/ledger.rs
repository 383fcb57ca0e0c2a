//! Ledger material needed to verify threshold signatures.

use serde::{Deserialize, Serialize};

use crate::{LedgerIdPublication, NodeContribution};

/// The ledger id (threshold public key) plus the address book it was built from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub ledger_id: Vec<u8>,
    pub history_proof_verification_key: Vec<u8>,
    pub node_contributions: Vec<NodeContribution>,
    /// Consensus time of the publication, nanos.
    pub consensus_timestamp: i64,
}

impl Ledger {
    pub fn from_publication(publication: &LedgerIdPublication, consensus_timestamp: i64) -> Self {
        Self {
            ledger_id: publication.ledger_id.clone(),
            history_proof_verification_key: publication.history_proof_verification_key.clone(),
            node_contributions: publication.node_contributions.clone(),
            consensus_timestamp,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.node_contributions
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.weight))
    }
}
