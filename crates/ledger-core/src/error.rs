use thiserror::Error;

use crate::constants::HASH_HEX_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A replica refused to join because the ledger's chain did not validate.
    #[error("replica `{name}` cannot join: ledger failed validation")]
    InvalidLedger { name: String },

    /// The configured difficulty asks for more leading zeros than a hash can carry.
    #[error(
        "difficulty {difficulty} is unreachable: a hash has {} hex digits, difficulty must be below that",
        HASH_HEX_SIZE
    )]
    MiningDeadlock { difficulty: u32 },

    #[error("no nonce met difficulty {difficulty} within {attempts} attempts")]
    MiningExhausted { difficulty: u32, attempts: u64 },

    #[error("invalid ledger config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
