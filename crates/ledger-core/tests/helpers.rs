#![allow(dead_code)]

use ledger_core::{Chain, Ledger, Peer};
use serde_json::Value;
use std::sync::Arc;

pub const DIFFICULTY: u32 = 1;

/// A chain of `len` blocks (genesis included) mined on a throwaway ledger.
pub fn build_chain(len: usize) -> Arc<Chain> {
    let ledger = Ledger::with_difficulty(DIFFICULTY).expect("ledger");
    for i in 1..len {
        ledger
            .append(vec![Value::from(format!("block-{i}"))])
            .expect("append");
    }
    ledger.chain()
}

/// Rewrites one field of the block at `position` through its JSON form,
/// leaving the stored hash untouched.
pub fn tamper(chain: &Chain, position: usize, field: &str, value: Value) -> Arc<Chain> {
    let mut json = serde_json::to_value(chain).expect("serialize chain");
    json[position][field] = value;
    Arc::new(serde_json::from_value(json).expect("deserialize chain"))
}

/// A peer whose chain never changes.
pub struct StaticPeer {
    name: String,
    chain: Arc<Chain>,
}

impl StaticPeer {
    pub fn new(name: &str, chain: Arc<Chain>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            chain,
        })
    }
}

impl Peer for StaticPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain(&self) -> Arc<Chain> {
        self.chain.clone()
    }

    fn on_ledger_changed(&self) {}
}
