use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod mine;
pub mod replica;

pub use chain::{Chain, ChainFault, ChainValidator, Ledger, Peer};
pub use config::{LedgerConfig, MiningStrategy};
pub use error::{LedgerError, Result};
pub use mine::Miner;
pub use replica::Replica;

pub type Hash = [u8; 32];

/// Sentinel `previous_hash` of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Opaque application data carried by a block. The ledger never looks inside.
pub type Payload = Vec<Value>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub timestamp: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: now_millis(),
        }
    }
}

impl From<&Transaction> for Value {
    fn from(tx: &Transaction) -> Self {
        // Strings and integers only, so serialization cannot fail.
        serde_json::to_value(tx).unwrap_or_default()
    }
}

impl From<Transaction> for Value {
    fn from(tx: Transaction) -> Self {
        Value::from(&tx)
    }
}

/// A hash-linked ledger entry. Fields are read-only once built; only mining
/// (inside this crate) moves `nonce` and `hash`, and always together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: u64,
    payload: Payload,
    #[serde(with = "hex_hash")]
    previous_hash: Hash,
    nonce: u64,
    #[serde(with = "hex_hash")]
    hash: Hash,
}

impl Block {
    pub fn new(index: u64, timestamp: u64, payload: Payload, previous_hash: Hash) -> Self {
        let hash = block_hash(index, timestamp, &payload, &previous_hash, 0);
        Self {
            index,
            timestamp,
            payload,
            previous_hash,
            nonce: 0,
            hash,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The stored hash. Use [`Block::recompute_hash`] to check it.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Hash of the block's current fields, independent of the stored `hash`.
    pub fn recompute_hash(&self) -> Hash {
        block_hash(
            self.index,
            self.timestamp,
            &self.payload,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn is_self_consistent(&self) -> bool {
        self.recompute_hash() == self.hash
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        pow::meets_difficulty(&self.hash, difficulty)
    }

    pub(crate) fn sealed(mut self, nonce: u64, hash: Hash) -> Self {
        self.nonce = nonce;
        self.hash = hash;
        self
    }
}

/// Hash of a block's five logical fields. See [`HashMaterial`] for the encoding.
pub fn block_hash(
    index: u64,
    timestamp: u64,
    payload: &[Value],
    previous_hash: &Hash,
    nonce: u64,
) -> Hash {
    HashMaterial::new(index, timestamp, payload, previous_hash).digest(nonce)
}

/// Pre-rendered, nonce-independent part of a block's canonical encoding.
///
/// The encoding is compact JSON with keys in lexicographic order
/// (`index`, `nonce`, `payload`, `previous_hash`, `timestamp`), which is the
/// byte-for-byte output of `serde_json` for the same object. Payload objects
/// are key-sorted by `serde_json::Map`, so insertion order never reaches the digest.
pub(crate) struct HashMaterial {
    index: u64,
    payload: String,
    previous_hash: String,
    timestamp: u64,
}

impl HashMaterial {
    pub(crate) fn new(index: u64, timestamp: u64, payload: &[Value], previous_hash: &Hash) -> Self {
        Self {
            index,
            payload: Value::Array(payload.to_vec()).to_string(),
            previous_hash: hex::encode(previous_hash),
            timestamp,
        }
    }

    pub(crate) fn of(block: &Block) -> Self {
        Self::new(
            block.index,
            block.timestamp,
            &block.payload,
            &block.previous_hash,
        )
    }

    pub(crate) fn encode(&self, nonce: u64) -> String {
        format!(
            r#"{{"index":{},"nonce":{},"payload":{},"previous_hash":"{}","timestamp":{}}}"#,
            self.index, nonce, self.payload, self.previous_hash, self.timestamp
        )
    }

    pub(crate) fn digest(&self, nonce: u64) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.encode(nonce).as_bytes());
        hasher.finalize().into()
    }
}

mod hex_hash {
    use super::Hash;
    use hex::FromHex;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        <Hash>::from_hex(s).map_err(D::Error::custom)
    }
}

pub mod pow {
    use super::{Block, Hash, HashMaterial};
    use crate::constants::{BYTE, NIBBLE};

    /// Mine the block by incrementing the nonce until its hash starts with
    /// `difficulty` zero hex digits. Difficulty must be below the hash's hex length.
    pub fn mine_block(block: Block, difficulty: u32) -> Block {
        let material = HashMaterial::of(&block);
        let mut nonce = block.nonce;
        loop {
            let hash = material.digest(nonce);
            if meets_difficulty(&hash, difficulty) {
                return block.sealed(nonce, hash);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Like [`mine_block`] but gives up after `max_attempts` hashes.
    pub fn mine_block_bounded(block: Block, difficulty: u32, max_attempts: u64) -> Option<Block> {
        let material = HashMaterial::of(&block);
        let mut nonce = block.nonce;
        for _ in 0..max_attempts {
            let hash = material.digest(nonce);
            if meets_difficulty(&hash, difficulty) {
                return Some(block.sealed(nonce, hash));
            }
            nonce = nonce.wrapping_add(1);
        }
        None
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        leading_zero_digits(hash) >= difficulty
    }

    /// Leading `'0'` characters of the hash's hex rendering.
    pub fn leading_zero_digits(hash: &Hash) -> u32 {
        count_leading_zero_bits(hash) / NIBBLE
    }

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += BYTE as u32;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }
}
