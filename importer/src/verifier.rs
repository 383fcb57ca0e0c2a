//! Chain continuity and signature checks, the gate every block passes
//! before it is handed downstream.

use blockfeed_crypto::state_proof_root;
use blockfeed_store::StreamFileNotifier;
use blockfeed_types::{
    block_number_from_filename, BlockFile, Ledger, SemanticVersion, VerifiedRecord,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};

use crate::cursor::{Cursor, CursorPosition};
use crate::tracing_spans::verify_block_span;
use crate::transformer::{BlockFileTransformer, DefaultTransformer};
use crate::tss::LedgerTssVerifier;
use crate::{ImporterError, ImporterMetrics, NextBlock};

/// Versions whose previous-hash links are not checked.
///
/// Blocks produced while the root hash algorithm changed link to roots
/// computed the old way. The window is half-open on the release part of the
/// version; pre-releases tagged with `excluded_pre_release` are outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompatibilityWindow {
    from: SemanticVersion,
    until: SemanticVersion,
    excluded_pre_release: String,
}

impl CompatibilityWindow {
    pub fn new(from: SemanticVersion, until: SemanticVersion, excluded_pre_release: impl Into<String>) -> Self {
        Self {
            from,
            until,
            excluded_pre_release: excluded_pre_release.into(),
        }
    }

    pub fn contains(&self, version: &SemanticVersion) -> bool {
        let release = SemanticVersion::new(version.major, version.minor, version.patch);
        self.from <= release
            && release < self.until
            && !version.has_pre_release(&self.excluded_pre_release)
    }
}

impl Default for CompatibilityWindow {
    fn default() -> Self {
        Self::new(SemanticVersion::new(0, 68, 0), SemanticVersion::new(0, 69, 0), "alpha")
    }
}

pub struct BlockStreamVerifier {
    cursor: Arc<Cursor>,
    tss: LedgerTssVerifier,
    transformer: Arc<dyn BlockFileTransformer>,
    notifier: Arc<dyn StreamFileNotifier>,
    metrics: Arc<ImporterMetrics>,
    compatibility: CompatibilityWindow,
    start_block_number: Option<u64>,
    earliest_available: bool,
}

impl BlockStreamVerifier {
    pub fn new(
        cursor: Arc<Cursor>,
        tss: LedgerTssVerifier,
        notifier: Arc<dyn StreamFileNotifier>,
        metrics: Arc<ImporterMetrics>,
    ) -> Self {
        Self {
            cursor,
            tss,
            transformer: Arc::new(DefaultTransformer),
            notifier,
            metrics,
            compatibility: CompatibilityWindow::default(),
            start_block_number: None,
            earliest_available: false,
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn BlockFileTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_compatibility_window(mut self, window: CompatibilityWindow) -> Self {
        self.compatibility = window;
        self
    }

    /// Where to begin when nothing has been verified yet.
    pub fn with_start(mut self, start_block_number: Option<u64>, earliest_available: bool) -> Self {
        self.start_block_number = start_block_number;
        self.earliest_available = earliest_available;
        self
    }

    pub fn cursor(&self) -> &Arc<Cursor> {
        &self.cursor
    }

    pub async fn last_verified(&self) -> Result<Option<VerifiedRecord>, ImporterError> {
        Ok(self.cursor.position().await?.record().cloned())
    }

    pub async fn next_block_number(&self) -> Result<NextBlock, ImporterError> {
        Ok(match self.cursor.position().await? {
            CursorPosition::At(record) => NextBlock::Number(record.index + 1),
            CursorPosition::Empty => match self.start_block_number {
                Some(start) => NextBlock::Number(start),
                None if self.earliest_available => NextBlock::Earliest,
                None => NextBlock::Number(0),
            },
        })
    }

    /// Verify `block` against the cursor, hand it downstream and advance the
    /// cursor. A rejected block leaves the cursor untouched.
    pub async fn verify(&self, block: BlockFile) -> Result<VerifiedRecord, ImporterError> {
        let span = verify_block_span(block.index);
        async move {
            let started = Instant::now();
            let result = self.verify_and_advance(block).await;
            match &result {
                Ok(record) => {
                    self.metrics.blocks_verified.inc();
                    self.metrics.last_verified_block.set(record.index as i64);
                    self.metrics
                        .verification_duration_ms
                        .observe(started.elapsed().as_secs_f64() * 1_000.0);
                }
                Err(_) => self.metrics.verification_failures.inc(),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn verify_and_advance(&self, block: BlockFile) -> Result<VerifiedRecord, ImporterError> {
        let mut cursor = self.cursor.lock().await?;

        let number = block_number_from_filename(&block.name).map_err(|_| {
            ImporterError::InvalidStreamFile(format!(
                "Failed to parse block number from filename {}",
                block.name
            ))
        })?;
        if number != block.index {
            return Err(ImporterError::InvalidStreamFile(format!(
                "Block number mismatch, from filename = {}, from content = {}",
                number, block.index
            )));
        }
        if let Some(proof) = &block.proof {
            if proof.block != block.index {
                return Err(ImporterError::InvalidStreamFile(format!(
                    "Block number mismatch, from proof = {}, from content = {}",
                    proof.block, block.index
                )));
            }
        }

        if let Some(previous) = cursor.record() {
            if previous.index.checked_add(1) != Some(block.index) {
                return Err(ImporterError::InvalidStreamFile(format!(
                    "Non-consecutive block number, previous = {}, current = {}",
                    previous.index, block.index
                )));
            }
            if block.previous_hash != previous.hash {
                if !self.compatibility.contains(&block.hapi_version) {
                    return Err(ImporterError::HashMismatch {
                        name: block.name.clone(),
                        expected: previous.hash.to_hex(),
                        actual: block.previous_hash.to_hex(),
                        kind: "Previous",
                    });
                }
                debug!(
                    block = block.index,
                    version = %block.hapi_version,
                    "Ignoring previous hash mismatch within the compatibility window"
                );
            }
        }

        let published = self.verify_signature(&block)?;

        let record = self.transformer.transform(block)?;
        if let Some(ledger) = published {
            self.tss.set_ledger(ledger);
        }
        self.notifier.verified(record.clone()).await;
        *cursor = CursorPosition::At(VerifiedRecord {
            bytes: None,
            ..record.clone()
        });
        Ok(record)
    }

    /// Check the block proof. Returns the ledger the block publishes, to be
    /// installed once the block is accepted.
    ///
    /// A publication is only trusted on its own when no ledger exists yet.
    /// Otherwise the block must be signed under the current ledger.
    fn verify_signature(&self, block: &BlockFile) -> Result<Option<Ledger>, ImporterError> {
        if block.is_record_file() {
            return Ok(None);
        }
        let proof = block.proof.as_ref().ok_or_else(|| {
            ImporterError::InvalidStreamFile(format!("Block file {} has no block proof", block.name))
        })?;

        let root = match proof.state_proof() {
            Some(state_proof) => state_proof_root(block.index, &block.raw_hash, state_proof)?,
            None => block.raw_hash,
        };

        let published = block
            .ledger_id_publication
            .as_ref()
            .map(|publication| Ledger::from_publication(publication, block.consensus_start));
        match &published {
            Some(ledger) if !self.tss.has_ledger()? => {
                self.tss.verify_with(ledger, block.index, &root, proof.signature())?
            }
            _ => self.tss.verify(block.index, &root, proof.signature())?,
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_window_bounds() {
        let window = CompatibilityWindow::default();
        assert!(!window.contains(&SemanticVersion::new(0, 67, 9)));
        assert!(window.contains(&SemanticVersion::new(0, 68, 0)));
        assert!(window.contains(&SemanticVersion::new(0, 68, 5)));
        assert!(window.contains(&SemanticVersion::new(0, 68, 0).with_pre("rc.1")));
        assert!(!window.contains(&SemanticVersion::new(0, 68, 0).with_pre("alpha.2")));
        assert!(!window.contains(&SemanticVersion::new(0, 69, 0)));
    }
}
