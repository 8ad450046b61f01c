use crate::{
    chain::{Chain, Ledger, Peer},
    consensus,
    error::{LedgerError, Result},
    Block, Payload, Transaction,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A node holding its own snapshot of a shared ledger.
pub struct Replica {
    name: String,
    ledger: Arc<Ledger>,
    local_chain: RwLock<Arc<Chain>>,
    pending: Mutex<Payload>,
}

impl Replica {
    /// Joins `ledger` under `name`. Fails with [`LedgerError::InvalidLedger`]
    /// if the ledger's chain does not validate.
    pub fn join(name: impl Into<String>, ledger: Arc<Ledger>) -> Result<Arc<Self>> {
        let name = name.into();
        let snapshot = ledger.chain();
        if !ledger.validate_chain(&snapshot) {
            warn!(replica = %name, "refusing to join an invalid ledger");
            return Err(LedgerError::InvalidLedger { name });
        }

        let replica = Arc::new(Self {
            name,
            ledger: ledger.clone(),
            local_chain: RwLock::new(snapshot),
            pending: Mutex::new(Vec::new()),
        });
        ledger.register_peer(&replica);
        info!(replica = %replica.name, height = replica.local_chain.read().len(), "joined ledger");
        Ok(replica)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn local_chain(&self) -> Arc<Chain> {
        self.local_chain.read().clone()
    }

    pub fn pending(&self) -> Payload {
        self.pending.lock().clone()
    }

    /// Queues a payload entry for the next block. Does not mine.
    pub fn submit_payload(&self, entry: impl Into<Value>) {
        self.pending.lock().push(entry.into());
    }

    /// A transaction from this replica to `receiver`.
    pub fn create_transaction(&self, receiver: impl Into<String>, amount: u64) -> Transaction {
        Transaction::new(self.name.clone(), receiver, amount)
    }

    pub fn submit_transaction(&self, tx: &Transaction) {
        self.submit_payload(tx);
    }

    /// Mines everything queued so far into one block on the shared ledger.
    /// On failure the queued entries are put back in front of anything
    /// submitted meanwhile.
    pub fn mine_pending(&self) -> Result<Block> {
        let payload = std::mem::take(&mut *self.pending.lock());
        match self.ledger.append(payload.clone()) {
            Ok(block) => {
                self.refresh();
                info!(
                    "{} mined a new block with index {} and hash {}",
                    self.name,
                    block.index(),
                    block.hash_hex()
                );
                Ok(block)
            }
            Err(err) => {
                let mut pending = self.pending.lock();
                let submitted_meanwhile = std::mem::replace(&mut *pending, payload);
                pending.extend(submitted_meanwhile);
                Err(err)
            }
        }
    }

    /// Longest-valid-chain rule against the ledger and every other replica.
    /// Returns `true` if the local chain was replaced.
    pub fn resolve_conflicts(&self) -> bool {
        let mut candidates = vec![self.ledger.chain()];
        candidates.extend(
            self.ledger
                .peers()
                .iter()
                .filter(|peer| !std::ptr::addr_eq(Arc::as_ptr(*peer), self))
                .map(|peer| peer.chain()),
        );

        let (replaced, winner) =
            consensus::resolve(self.local_chain(), candidates, &self.ledger.validator());
        if replaced {
            info!(replica = %self.name, len = winner.len(), "adopted longer chain");
            *self.local_chain.write() = winner;
        }
        replaced
    }

    /// Leaves the ledger's peer set. The local chain is kept.
    pub fn leave(&self) -> bool {
        self.ledger.unregister_peer(self)
    }

    fn refresh(&self) {
        // Read the ledger under our own write lock so a slow refresh can
        // never overwrite a newer snapshot with an older one.
        let mut local = self.local_chain.write();
        *local = self.ledger.chain();
    }
}

impl Peer for Replica {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain(&self) -> Arc<Chain> {
        self.local_chain()
    }

    fn on_ledger_changed(&self) {
        self.refresh();
        debug!(replica = %self.name, len = self.local_chain.read().len(), "synced with ledger");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;

    fn ledger(difficulty: u32) -> Arc<Ledger> {
        Arc::new(Ledger::with_difficulty(difficulty).unwrap())
    }

    #[test]
    fn join_snapshots_and_registers() {
        let ledger = ledger(1);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        assert_eq!(alice.name(), "Alice");
        assert_eq!(alice.local_chain(), ledger.chain());
        assert_eq!(ledger.peer_names(), vec!["Alice"]);
    }

    #[test]
    fn namesakes_are_separate_replicas() {
        let ledger = ledger(1);
        let first = Replica::join("Alice", ledger.clone()).unwrap();
        let second = Replica::join("Alice", ledger.clone()).unwrap();
        assert_eq!(ledger.peer_names(), vec!["Alice", "Alice"]);

        second.submit_payload("A");
        second.mine_pending().unwrap();
        assert_eq!(first.local_chain().len(), 2);
        assert_eq!(second.local_chain().len(), 2);

        // Leaving removes only the caller.
        assert!(first.leave());
        assert!(!first.leave());
        assert_eq!(ledger.peer_names(), vec!["Alice"]);
        second.submit_payload("B");
        second.mine_pending().unwrap();
        ledger.append(vec![Value::from("C")]).unwrap();
        assert_eq!(first.local_chain().len(), 2);
        assert_eq!(second.local_chain(), ledger.chain());
    }

    #[test]
    fn submit_does_not_mine() {
        let ledger = ledger(1);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        let tx = alice.create_transaction("Bob", 12);
        alice.submit_transaction(&tx);
        alice.submit_payload("note");
        assert_eq!(alice.pending(), vec![Value::from(&tx), Value::from("note")]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn mine_pending_appends_and_clears_queue() {
        let ledger = ledger(2);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        let tx = alice.create_transaction("Bob", 12);
        assert_eq!(tx.sender, "Alice");
        alice.submit_transaction(&tx);

        let block = alice.mine_pending().unwrap();
        assert_eq!(block.index(), 2);
        assert_eq!(block.payload(), &[Value::from(&tx)]);
        assert!(block.hash_hex().starts_with("00"));
        assert!(alice.pending().is_empty());
        assert_eq!(alice.local_chain().last(), Some(&block));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn other_replicas_sync_on_append() {
        let ledger = ledger(1);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        let bob = Replica::join("Bob", ledger.clone()).unwrap();
        alice.submit_payload("A");
        alice.mine_pending().unwrap();
        assert_eq!(bob.local_chain().len(), 2);
        assert_eq!(bob.local_chain(), ledger.chain());
    }

    #[test]
    fn repeated_notifications_are_harmless() {
        let ledger = ledger(0);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        ledger.append(vec![Value::from("A")]).unwrap();
        alice.on_ledger_changed();
        alice.on_ledger_changed();
        assert_eq!(alice.local_chain(), ledger.chain());
    }

    #[test]
    fn failed_mining_restores_pending() {
        // One attempt at difficulty 4 fails unless nonce 0 happens to qualify.
        let config = LedgerConfig {
            difficulty: 4,
            max_mining_attempts: Some(1),
            ..LedgerConfig::default()
        };
        let ledger = Arc::new(Ledger::with_config(config).unwrap());
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        alice.submit_payload("first");
        alice.submit_payload("second");

        match alice.mine_pending() {
            Ok(block) => assert_eq!(block.payload().len(), 2),
            Err(err) => {
                assert_eq!(
                    err,
                    LedgerError::MiningExhausted {
                        difficulty: 4,
                        attempts: 1
                    }
                );
                assert_eq!(alice.pending(), vec![Value::from("first"), Value::from("second")]);
                assert_eq!(ledger.len(), 1);
            }
        }
    }

    #[test]
    fn leave_unregisters() {
        let ledger = ledger(0);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        assert!(alice.leave());
        ledger.append(vec![Value::from("A")]).unwrap();
        assert_eq!(alice.local_chain().len(), 1);
        assert!(ledger.peer_names().is_empty());
    }

    #[test]
    fn replica_adopts_longer_chain_from_ledger() {
        let ledger = ledger(1);
        let alice = Replica::join("Alice", ledger.clone()).unwrap();
        alice.leave();
        ledger.append(vec![Value::from("A")]).unwrap();
        ledger.append(vec![Value::from("B")]).unwrap();
        assert_eq!(alice.local_chain().len(), 1);

        assert!(alice.resolve_conflicts());
        assert_eq!(alice.local_chain(), ledger.chain());
        assert!(!alice.resolve_conflicts());
    }
}
