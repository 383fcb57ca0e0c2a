//! Deterministic block chains for tests.
//!
//! Each generated block links to the previous block's root and carries a
//! threshold signature from a seed-derived key, so it passes verification
//! against [`BlockGenerator::ledger`].

use blockfeed_crypto::{hash_internal, hash_leaf, BlockRootHashDigest, RootParts, ThresholdSigner};
use blockfeed_types::{
    Block, BlockFooter, BlockHash, BlockHeader, BlockItem, BlockProof, BlockTimestamp,
    EventHeader, Ledger, LedgerIdPublication, MerklePath, NodeContribution, ProofKind,
    RecordFileItem, RoundHeader, SemanticVersion, SiblingNode, SignedBlockProof,
    SignedTransaction, StateChanges, StateProof, TransactionBody, TransactionOutput,
    TransactionResult,
};

/// 2023-11-14T22:13:20Z
const GENESIS_NANOS: i64 = 1_700_000_000_000_000_000;
const BLOCK_INTERVAL_NANOS: i64 = 2_000_000_000;
const SUCCESS_STATUS: u32 = 22;

pub struct BlockGenerator {
    seed: u8,
    signer: ThresholdSigner,
    next_number: u64,
    previous_root: BlockHash,
    hapi_version: SemanticVersion,
    pending_publication: Option<LedgerIdPublication>,
    successor: Option<(u8, ThresholdSigner)>,
}

impl BlockGenerator {
    pub fn new(seed: u8) -> Self {
        let signer = ThresholdSigner::from_seed(&[seed; 32]).expect("32-byte seed is long enough");
        Self {
            seed,
            signer,
            next_number: 0,
            previous_root: BlockHash::ZERO,
            hapi_version: SemanticVersion::new(0, 70, 0),
            pending_publication: None,
            successor: None,
        }
    }

    /// Continue a chain at `number` whose last root was `previous_root`.
    pub fn starting_at(mut self, number: u64, previous_root: BlockHash) -> Self {
        self.next_number = number;
        self.previous_root = previous_root;
        self
    }

    pub fn with_version(mut self, version: SemanticVersion) -> Self {
        self.hapi_version = version;
        self
    }

    pub fn set_version(&mut self, version: SemanticVersion) {
        self.hapi_version = version;
    }

    /// Make the next block carry a ledger id publication for this signer.
    pub fn with_ledger_publication(mut self) -> Self {
        self.pending_publication = Some(self.publication());
        self
    }

    /// Make the next block publish the ledger of a signer seeded with `seed`,
    /// signed by the current signer. Later blocks are signed by the successor.
    pub fn hand_over_to(&mut self, seed: u8) {
        let successor = ThresholdSigner::from_seed(&[seed; 32]).expect("32-byte seed is long enough");
        self.pending_publication = Some(publication_of(seed, &successor));
        self.successor = Some((seed, successor));
    }

    pub fn next_number(&self) -> u64 {
        self.next_number
    }

    /// Root hash of the last generated block.
    pub fn previous_root(&self) -> BlockHash {
        self.previous_root
    }

    pub fn ledger_id(&self) -> Vec<u8> {
        self.signer.ledger_id()
    }

    pub fn publication(&self) -> LedgerIdPublication {
        publication_of(self.seed, &self.signer)
    }

    /// The ledger whose id verifies every block from this generator.
    pub fn ledger(&self) -> Ledger {
        Ledger::from_publication(&self.publication(), GENESIS_NANOS)
    }

    /// Consensus start of block `number`, nanos.
    pub fn consensus_start(number: u64) -> i64 {
        GENESIS_NANOS + number as i64 * BLOCK_INTERVAL_NANOS
    }

    /// Next block with a signature directly over its root.
    pub fn next_block(&mut self) -> Block {
        let (mut items, parts) = self.unsigned_items();
        let root = parts.root();
        items.push(self.signed_proof(self.next_number, &root));
        self.advance(root);
        if let Some((seed, signer)) = self.successor.take() {
            self.seed = seed;
            self.signer = signer;
        }
        Block { items }
    }

    pub fn blocks(&mut self, count: usize) -> Vec<Block> {
        (0..count).map(|_| self.next_block()).collect()
    }

    /// Next two blocks, the first proven through a state proof rooted at the
    /// second's signed root.
    pub fn next_pair_with_state_proof(&mut self) -> (Block, Block) {
        let number = self.next_number;
        let (mut first, first_parts) = self.unsigned_items();
        let first_root = first_parts.root();
        self.advance(first_root);

        let (mut second, second_parts) = self.unsigned_items();
        let second_root = second_parts.root();
        let signature = self.signer.sign(&second_root);
        second.push(self.signed_proof(number + 1, &second_root));
        self.advance(second_root);

        first.push(BlockItem::BlockProof(BlockProof {
            block: number,
            proof: ProofKind::StateProof(StateProof {
                paths: vec![
                    MerklePath {
                        timestamp_leaf: Some(second_parts.timestamp_leaf.clone()),
                        ..Default::default()
                    },
                    MerklePath {
                        hash: Some(first_parts.leaves[0]),
                        siblings: state_proof_siblings(&first_parts, &second_parts),
                        ..Default::default()
                    },
                    MerklePath::default(),
                ],
                signed_block_proof: SignedBlockProof {
                    block_signature: signature,
                },
            }),
        }));

        (Block { items: first }, Block { items: second })
    }

    /// Next block as a legacy record file item.
    pub fn record_file_block(&mut self) -> Block {
        let number = self.next_number;
        let start = Self::consensus_start(number);
        let hash = hash_leaf(format!("record-file-{}-{number}", self.seed).as_bytes());
        let item = RecordFileItem {
            block_number: number,
            name: format!("{}.rcd", BlockTimestamp::from_nanos(start).seconds),
            hash,
            previous_hash: self.previous_root,
            consensus_start: start,
            consensus_end: start + BLOCK_INTERVAL_NANOS - 1,
            hapi_version: self.hapi_version.clone(),
            transaction_count: 2,
        };
        self.advance(hash);
        Block {
            items: vec![BlockItem::RecordFile(item)],
        }
    }

    fn advance(&mut self, root: BlockHash) {
        self.previous_root = root;
        self.next_number += 1;
    }

    fn signed_proof(&self, number: u64, root: &BlockHash) -> BlockItem {
        BlockItem::BlockProof(BlockProof {
            block: number,
            proof: ProofKind::Signed(SignedBlockProof {
                block_signature: self.signer.sign(root),
            }),
        })
    }

    /// Every item of the next block except the proof, and its root parts.
    fn unsigned_items(&mut self) -> (Vec<BlockItem>, RootParts) {
        let number = self.next_number;
        let start = Self::consensus_start(number);
        let timestamp = BlockTimestamp::from_nanos(start);
        let body = match self.pending_publication.take() {
            Some(publication) => TransactionBody::LedgerIdPublication(publication),
            None => TransactionBody::Opaque(number.to_be_bytes().to_vec()),
        };

        let items = vec![
            BlockItem::BlockHeader(BlockHeader {
                number,
                hapi_proto_version: self.hapi_version.clone(),
                software_version: self.hapi_version.clone(),
                block_timestamp: timestamp,
            }),
            BlockItem::RoundHeader(RoundHeader {
                round_number: number * 10 + 1,
            }),
            BlockItem::EventHeader(EventHeader {
                creator_node_id: number % 3,
                birth_round: number * 10,
            }),
            BlockItem::SignedTransaction(SignedTransaction {
                body,
                signatures: vec![self.seed; 4],
            }),
            BlockItem::TransactionResult(TransactionResult {
                consensus_timestamp: BlockTimestamp::from_nanos(start + 1_000),
                status: SUCCESS_STATUS,
            }),
            BlockItem::TransactionOutput(TransactionOutput { data: vec![1] }),
            BlockItem::StateChanges(StateChanges {
                consensus_timestamp: BlockTimestamp::from_nanos(start + 1_000),
                changes: vec![number as u8],
            }),
            BlockItem::BlockFooter(BlockFooter {
                previous_block_root_hash: self.previous_root,
                root_hash_of_all_block_hashes_tree: hash_leaf(&number.to_be_bytes()),
                start_of_block_state_root_hash: hash_leaf(&[self.seed]),
            }),
        ];

        let mut digest = BlockRootHashDigest::new();
        for item in &items {
            digest
                .add_item(item)
                .expect("generated items always encode");
        }
        let parts = digest
            .into_parts()
            .expect("generated blocks always have a header and footer");
        (items, parts)
    }
}

fn publication_of(seed: u8, signer: &ThresholdSigner) -> LedgerIdPublication {
    LedgerIdPublication {
        ledger_id: signer.ledger_id(),
        history_proof_verification_key: vec![seed; 8],
        node_contributions: (0..3)
            .map(|node_id| NodeContribution {
                node_id,
                weight: 10,
                history_proof_key: vec![seed, node_id as u8],
            })
            .collect(),
    }
}

/// Siblings climbing from `current`'s previous root to `current`'s root, then
/// on through `next`'s tree (in which `current`'s root is the first leaf).
fn state_proof_siblings(current: &RootParts, next: &RootParts) -> Vec<SiblingNode> {
    let right = |hash| SiblingNode {
        is_left: false,
        hash,
    };
    let upper = |parts: &RootParts| {
        let l = &parts.leaves;
        (
            hash_internal(&l[2], &l[3]),
            hash_internal(&hash_internal(&l[4], &l[5]), &hash_internal(&l[6], &l[7])),
        )
    };

    let (current_pair, current_half) = upper(current);
    let (next_pair, next_half) = upper(next);
    vec![
        right(current.leaves[1]),
        right(current_pair),
        right(current_half),
        SiblingNode {
            is_left: true,
            hash: hash_leaf(&current.timestamp_leaf),
        },
        right(next.leaves[1]),
        right(next_pair),
        right(next_half),
    ]
}
