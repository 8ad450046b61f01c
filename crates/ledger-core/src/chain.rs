use crate::{
    config::LedgerConfig,
    consensus,
    constants::GENESIS_INDEX,
    error::Result,
    mine::Miner,
    now_millis, Block, Payload, ZERO_HASH,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, info};

/// An ordered, hash-linked run of blocks starting at genesis.
pub type Chain = Vec<Block>;

/// A participant the ledger keeps informed. Handles are in-process references;
/// there is no transport behind them.
pub trait Peer: Send + Sync {
    fn name(&self) -> &str;

    /// An immutable snapshot of the peer's current chain.
    fn chain(&self) -> Arc<Chain>;

    /// Called after the ledger's chain changed. May be delivered more than once.
    fn on_ledger_changed(&self);
}

/// Why a chain failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("chain has no genesis block")]
    Empty,
    #[error("block {index}: stored hash does not match its fields")]
    HashMismatch { index: u64 },
    #[error("block {index}: previous_hash does not match the preceding block")]
    BrokenLink { index: u64 },
    #[error("block at position {position}: expected index {expected}, found {found}")]
    IndexGap {
        position: usize,
        expected: u64,
        found: u64,
    },
    #[error("block {index}: hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
    #[error("genesis block must point at the zero hash")]
    BadGenesisLink,
}

/// Full-chain check: recomputes every hash from stored fields and walks the
/// back-links. Never mines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainValidator {
    difficulty: u32,
}

impl ChainValidator {
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    pub fn check(&self, chain: &[Block]) -> std::result::Result<(), ChainFault> {
        let genesis = chain.first().ok_or(ChainFault::Empty)?;
        if genesis.previous_hash() != &ZERO_HASH {
            return Err(ChainFault::BadGenesisLink);
        }

        for (position, block) in chain.iter().enumerate() {
            let expected = GENESIS_INDEX + position as u64;
            if block.index() != expected {
                return Err(ChainFault::IndexGap {
                    position,
                    expected,
                    found: block.index(),
                });
            }
            if !block.is_self_consistent() {
                return Err(ChainFault::HashMismatch {
                    index: block.index(),
                });
            }
            if !block.meets_difficulty(self.difficulty) {
                return Err(ChainFault::InsufficientWork {
                    index: block.index(),
                    difficulty: self.difficulty,
                });
            }
            if position > 0 && block.previous_hash() != chain[position - 1].hash() {
                return Err(ChainFault::BrokenLink {
                    index: block.index(),
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, chain: &[Block]) -> bool {
        match self.check(chain) {
            Ok(()) => true,
            Err(fault) => {
                debug!(%fault, len = chain.len(), "chain rejected");
                false
            }
        }
    }
}

/// The shared ledger. Appends mine off-lock against a snapshot of the tip and
/// insert only if the tip is still the one they built on.
pub struct Ledger {
    config: LedgerConfig,
    miner: Miner,
    chain: RwLock<Arc<Chain>>,
    peers: RwLock<Vec<Weak<dyn Peer>>>,
}

impl Ledger {
    pub fn new() -> Result<Self> {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_difficulty(difficulty: u32) -> Result<Self> {
        Self::with_config(LedgerConfig::with_difficulty(difficulty))
    }

    pub fn with_config(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let miner = Miner::from_config(&config);
        let genesis = Block::new(
            GENESIS_INDEX,
            now_millis(),
            vec![Value::from(config.genesis_payload.as_str())],
            ZERO_HASH,
        );
        // The attempt bound only gates appends; genesis is always mined to completion.
        let genesis = Miner::new(config.difficulty, config.mining, None).mine(genesis)?;
        info!(difficulty = config.difficulty, hash = %genesis.hash_hex(), "ledger created");

        Ok(Self {
            config,
            miner,
            chain: RwLock::new(Arc::new(vec![genesis])),
            peers: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty()
    }

    pub fn validator(&self) -> ChainValidator {
        ChainValidator::new(self.difficulty())
    }

    /// Snapshot of the current chain. Later appends never show up in it.
    pub fn chain(&self) -> Arc<Chain> {
        self.chain.read().clone()
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Always false: a ledger holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    pub fn tip(&self) -> Option<Block> {
        self.chain.read().last().cloned()
    }

    /// Mines `payload` into a block on top of the current tip and appends it.
    ///
    /// If another append lands while this one is mining, the mined block is
    /// discarded and the search restarts on the new tip, so no two accepted
    /// blocks ever share a `previous_hash`.
    pub fn append(&self, payload: Payload) -> Result<Block> {
        let (block, _retries) = self.append_with(payload, |candidate| self.miner.mine(candidate))?;
        Ok(block)
    }

    /// Append loop with the proof-of-work step supplied by the caller. No lock
    /// is held while `mine` runs. Returns the block and how many times the tip
    /// moved underneath it.
    fn append_with<F>(&self, payload: Payload, mut mine: F) -> Result<(Block, u32)>
    where
        F: FnMut(Block) -> Result<Block>,
    {
        let mut retries = 0u32;
        let block = loop {
            let (index, previous_hash) = match self.chain.read().last() {
                Some(tip) => (tip.index() + 1, *tip.hash()),
                None => (GENESIS_INDEX, ZERO_HASH),
            };
            let candidate = Block::new(index, now_millis(), payload.clone(), previous_hash);
            let mined = mine(candidate)?;

            let mut chain = self.chain.write();
            let tip = chain.last().map(|b| *b.hash()).unwrap_or(ZERO_HASH);
            if tip == previous_hash {
                Arc::make_mut(&mut *chain).push(mined.clone());
                break mined;
            }
            drop(chain);
            retries += 1;
            debug!(index, retries, "tip moved while mining, retrying");
        };

        info!(index = block.index(), hash = %block.hash_hex(), retries, "block appended");
        self.notify_peers();
        Ok((block, retries))
    }

    /// Validates the ledger's own chain.
    pub fn validate(&self) -> bool {
        self.validate_chain(&self.chain())
    }

    /// Validates an arbitrary candidate chain against this ledger's difficulty.
    pub fn validate_chain(&self, chain: &[Block]) -> bool {
        self.validator().is_valid(chain)
    }

    /// Registers a peer. Peers are keyed by identity, not by name: two peers
    /// sharing a name are both kept. Returns `false` if this peer was already
    /// registered.
    pub fn register_peer<P: Peer + 'static>(&self, peer: &Arc<P>) -> bool {
        let handle: Weak<dyn Peer> = Arc::downgrade(peer) as Weak<dyn Peer>;
        let mut peers = self.peers.write();
        if peers.iter().any(|known| Weak::ptr_eq(known, &handle)) {
            return false;
        }
        debug!(peer = %peer.name(), "peer registered");
        peers.push(handle);
        true
    }

    /// Removes exactly this peer, leaving any namesakes registered.
    pub fn unregister_peer(&self, peer: &dyn Peer) -> bool {
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|known| !std::ptr::addr_eq(known.as_ptr(), peer));
        before != peers.len()
    }

    /// Live peers in registration order. Dropped peers are pruned.
    pub fn peers(&self) -> Vec<Arc<dyn Peer>> {
        let mut peers = self.peers.write();
        peers.retain(|handle| handle.strong_count() > 0);
        peers.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.peers().iter().map(|p| p.name().to_string()).collect()
    }

    /// Longest-valid-chain rule against every registered peer. Returns `true`
    /// if the ledger adopted a peer's chain.
    pub fn resolve_conflicts(&self) -> bool {
        let current = self.chain();
        let candidates: Vec<Arc<Chain>> = self.peers().iter().map(|p| p.chain()).collect();
        let (replaced, winner) = consensus::resolve(current, candidates, &self.validator());
        if !replaced {
            return false;
        }

        {
            let mut chain = self.chain.write();
            // An append may have landed during the scan.
            if winner.len() <= chain.len() {
                debug!(
                    winner = winner.len(),
                    current = chain.len(),
                    "chain grew during resolution, keeping it"
                );
                return false;
            }
            *chain = winner;
        }

        info!(len = self.len(), "adopted longer peer chain");
        self.notify_peers();
        true
    }

    fn notify_peers(&self) {
        for peer in self.peers() {
            debug!(peer = %peer.name(), "notifying peer");
            peer.on_ledger_changed();
        }
    }
}
