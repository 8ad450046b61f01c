use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIFFICULTY, GENESIS_PAYLOAD, HASH_HEX_SIZE};
use crate::error::{LedgerError, Result};

/// How a block's nonce space is searched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStrategy {
    #[default]
    Sequential,
    /// Split the nonce range across the rayon pool.
    Parallel,
}

/// Ledger settings. Every field has a default so partial JSON documents are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Required count of leading `'0'` hex digits in every block hash.
    /// Must stay below the hash's hex length or mining can never finish.
    pub difficulty: u32,
    pub mining: MiningStrategy,
    /// Upper bound on nonces tried per block. `None` searches until found.
    pub max_mining_attempts: Option<u64>,
    pub genesis_payload: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining: MiningStrategy::default(),
            max_mining_attempts: None,
            genesis_payload: GENESIS_PAYLOAD.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty as usize >= HASH_HEX_SIZE {
            return Err(LedgerError::MiningDeadlock {
                difficulty: self.difficulty,
            });
        }
        if self.max_mining_attempts == Some(0) {
            return Err(LedgerError::Config(
                "max_mining_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
