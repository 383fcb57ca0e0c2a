//! Threshold signature checks against the current ledger.

use blockfeed_crypto::verify_tss;
use blockfeed_store::LedgerStore;
use blockfeed_types::{BlockHash, Ledger};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::ImporterError;

/// Verifies block signatures with the ledger id of the current ledger.
///
/// The ledger is loaded lazily from the ledger store, falling back to the
/// configured bootstrap ledger, and replaced whenever a block publishes a
/// new one.
pub struct LedgerTssVerifier {
    store: Arc<dyn LedgerStore>,
    bootstrap: Option<Ledger>,
    ledger: Mutex<Option<Ledger>>,
}

impl LedgerTssVerifier {
    pub fn new(store: Arc<dyn LedgerStore>, bootstrap: Option<Ledger>) -> Self {
        Self {
            store,
            bootstrap,
            ledger: Mutex::new(None),
        }
    }

    pub fn set_ledger(&self, ledger: Ledger) {
        info!(
            ledger_id = %hex::encode(&ledger.ledger_id),
            nodes = ledger.node_contributions.len(),
            total_weight = ledger.total_weight(),
            "Installed new ledger"
        );
        *self.ledger.lock().unwrap_or_else(|e| e.into_inner()) = Some(ledger);
    }

    fn ledger_id(&self) -> Result<Option<Vec<u8>>, ImporterError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        if ledger.is_none() {
            *ledger = self.store.find_latest()?.or_else(|| self.bootstrap.clone());
        }
        Ok(ledger.as_ref().map(|l| l.ledger_id.clone()))
    }

    /// Whether a ledger is installed or can be loaded.
    pub fn has_ledger(&self) -> Result<bool, ImporterError> {
        Ok(self.ledger_id()?.is_some())
    }

    pub fn verify(&self, block: u64, root: &BlockHash, signature: &[u8]) -> Result<(), ImporterError> {
        let Some(ledger_id) = self.ledger_id()? else {
            return Err(ImporterError::SignatureVerification(format!(
                "No ledger available to verify block {block}"
            )));
        };
        check_signature(&ledger_id, block, root, signature)
    }

    /// Verify against `ledger` without installing it.
    pub fn verify_with(
        &self,
        ledger: &Ledger,
        block: u64,
        root: &BlockHash,
        signature: &[u8],
    ) -> Result<(), ImporterError> {
        check_signature(&ledger.ledger_id, block, root, signature)
    }
}

fn check_signature(ledger_id: &[u8], block: u64, root: &BlockHash, signature: &[u8]) -> Result<(), ImporterError> {
    match verify_tss(ledger_id, root, signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ImporterError::SignatureVerification(format!(
            "TSS signature verification failed for block {block}"
        ))),
        Err(e) => Err(ImporterError::SignatureVerification(format!(
            "TSS signature verification failed for block {block}: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfeed_crypto::ThresholdSigner;
    use blockfeed_store::MemoryLedgerStore;

    fn ledger(signer: &ThresholdSigner) -> Ledger {
        Ledger {
            ledger_id: signer.ledger_id(),
            ..Default::default()
        }
    }

    #[test]
    fn verifies_with_the_stored_ledger() {
        let signer = ThresholdSigner::from_seed(&[1; 32]).unwrap();
        let store = MemoryLedgerStore::new();
        store.save(ledger(&signer)).unwrap();
        let verifier = LedgerTssVerifier::new(Arc::new(store), None);

        let root = BlockHash::new([5; 48]);
        verifier.verify(3, &root, &signer.sign(&root)).unwrap();
        let err = verifier.verify(3, &BlockHash::new([6; 48]), &signer.sign(&root)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "TSS signature verification failed for block 3");
    }

    #[test]
    fn falls_back_to_bootstrap_and_accepts_replacement() {
        let first = ThresholdSigner::from_seed(&[1; 32]).unwrap();
        let second = ThresholdSigner::from_seed(&[2; 32]).unwrap();
        let verifier = LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), Some(ledger(&first)));
        let root = BlockHash::new([5; 48]);

        verifier.verify(1, &root, &first.sign(&root)).unwrap();
        assert!(verifier.verify(1, &root, &second.sign(&root)).is_err());

        verifier.set_ledger(ledger(&second));
        verifier.verify(2, &root, &second.sign(&root)).unwrap();
    }

    #[test]
    fn verify_with_leaves_the_current_ledger() {
        let first = ThresholdSigner::from_seed(&[1; 32]).unwrap();
        let second = ThresholdSigner::from_seed(&[2; 32]).unwrap();
        let verifier = LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), Some(ledger(&first)));
        let root = BlockHash::new([5; 48]);

        verifier.verify_with(&ledger(&second), 1, &root, &second.sign(&root)).unwrap();
        assert!(verifier.verify(1, &root, &second.sign(&root)).is_err());
        verifier.verify(1, &root, &first.sign(&root)).unwrap();
    }

    #[test]
    fn no_ledger_is_fatal() {
        let verifier = LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), None);
        assert!(!verifier.has_ledger().unwrap());
        let err = verifier.verify(1, &BlockHash::ZERO, &[]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn malformed_signature_is_fatal() {
        let signer = ThresholdSigner::from_seed(&[1; 32]).unwrap();
        let verifier = LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), Some(ledger(&signer)));
        assert!(verifier.verify(1, &BlockHash::ZERO, &[1, 2, 3]).unwrap_err().is_fatal());
    }
}
