use crate::{
    config::{LedgerConfig, MiningStrategy},
    error::{LedgerError, Result},
    pow::{self, meets_difficulty},
    Block, HashMaterial,
};
use rayon::prelude::*;
use tracing::info;

/// Proof-of-work gate used by the ledger to admit new blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Miner {
    difficulty: u32,
    strategy: MiningStrategy,
    max_attempts: Option<u64>,
}

impl Miner {
    pub fn new(difficulty: u32, strategy: MiningStrategy, max_attempts: Option<u64>) -> Self {
        Self {
            difficulty,
            strategy,
            max_attempts,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(
            config.difficulty,
            config.mining,
            config.max_mining_attempts,
        )
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn strategy(&self) -> MiningStrategy {
        self.strategy
    }

    /// Searches for a nonce that puts `difficulty` zero hex digits in front of the hash.
    pub fn mine(&self, block: Block) -> Result<Block> {
        let index = block.index();
        let mined = match (self.strategy, self.max_attempts) {
            (MiningStrategy::Sequential, None) => Some(pow::mine_block(block, self.difficulty)),
            (MiningStrategy::Sequential, Some(limit)) => {
                pow::mine_block_bounded(block, self.difficulty, limit)
            }
            (MiningStrategy::Parallel, limit) => {
                mine_block_parallel(block, self.difficulty, limit)
            }
        };

        let block = mined.ok_or(LedgerError::MiningExhausted {
            difficulty: self.difficulty,
            attempts: self.max_attempts.unwrap_or(u64::MAX),
        })?;

        info!(
            "Mined block {} with nonce {} and hash {}",
            index,
            block.nonce(),
            block.hash_hex()
        );
        Ok(block)
    }
}

/// Mines a block by searching nonces in parallel until its hash meets `difficulty`.
/// Any satisfying nonce may win, so results are not reproducible across runs.
pub fn mine_block_parallel(block: Block, difficulty: u32, max_attempts: Option<u64>) -> Option<Block> {
    // Only the nonce varies per attempt; render everything else once.
    let material = HashMaterial::of(&block);
    let start = block.nonce();
    let limit = max_attempts.unwrap_or(u64::MAX);

    let found = (0u64..limit)
        .into_par_iter()
        .map(|offset| start.wrapping_add(offset))
        .find_any(|nonce| meets_difficulty(&material.digest(*nonce), difficulty))?;

    let hash = material.digest(found);
    Some(block.sealed(found, hash))
}
