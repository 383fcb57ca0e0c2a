//! BLS12-381 threshold signature verification.
//!
//! The ledger id is the aggregate threshold public key: a compressed G1 point
//! (48 bytes). Block signatures are compressed G2 points (96 bytes) over the
//! block's effective root hash, in the `min_pk` scheme.

use blockfeed_types::BlockHash;
use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;

use crate::CryptoError;

/// Domain separation tag for signatures on G2 with SHA-256 hash-to-curve.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Verify `signature` over `root` against `ledger_id`.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and an
/// error when either point fails to decode.
pub fn verify_tss(ledger_id: &[u8], root: &BlockHash, signature: &[u8]) -> Result<bool, CryptoError> {
    let pk = PublicKey::from_bytes(ledger_id)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("G1 point deserialization: {e:?}")))?;
    let sig = Signature::from_bytes(signature)
        .map_err(|e| CryptoError::InvalidSignature(format!("G2 point deserialization: {e:?}")))?;

    let result = sig.verify(true, root.as_bytes(), BLS_DST, &[], &pk, true);
    Ok(result == BLST_ERROR::BLST_SUCCESS)
}

/// Holds a threshold secret key and signs block roots.
///
/// Production signing happens inside the network; this exists to produce
/// verifiable fixtures and simulated block streams.
pub struct ThresholdSigner {
    secret: SecretKey,
}

impl ThresholdSigner {
    /// Derive a key from at least 32 bytes of input keying material.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(seed, &[])
            .map_err(|e| CryptoError::InvalidPublicKey(format!("key generation failed: {e:?}")))?;
        Ok(Self { secret })
    }

    /// Compressed public key, i.e. the ledger id.
    pub fn ledger_id(&self) -> Vec<u8> {
        self.secret.sk_to_pk().compress().to_vec()
    }

    pub fn sign(&self, root: &BlockHash) -> Vec<u8> {
        self.secret.sign(root.as_bytes(), BLS_DST, &[]).compress().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(byte: u8) -> ThresholdSigner {
        ThresholdSigner::from_seed(&[byte; 32]).unwrap()
    }

    #[test]
    fn valid_signature_verifies() {
        let signer = signer(7);
        let root = BlockHash::new([3; 48]);
        let signature = signer.sign(&root);
        assert_eq!(signer.ledger_id().len(), 48);
        assert_eq!(signature.len(), 96);
        assert!(verify_tss(&signer.ledger_id(), &root, &signature).unwrap());
    }

    #[test]
    fn wrong_message_fails() {
        let signer = signer(7);
        let signature = signer.sign(&BlockHash::new([3; 48]));
        assert!(!verify_tss(&signer.ledger_id(), &BlockHash::new([4; 48]), &signature).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let root = BlockHash::new([3; 48]);
        let signature = signer(7).sign(&root);
        assert!(!verify_tss(&signer(8).ledger_id(), &root, &signature).unwrap());
    }

    #[test]
    fn garbage_points_are_errors() {
        let root = BlockHash::new([3; 48]);
        assert!(verify_tss(&[1, 2, 3], &root, &[0; 96]).is_err());
        let signer = signer(7);
        assert!(verify_tss(&signer.ledger_id(), &root, &[0xff; 10]).is_err());
    }

    #[test]
    fn short_seed_is_rejected() {
        assert!(ThresholdSigner::from_seed(&[1; 8]).is_err());
    }
}
