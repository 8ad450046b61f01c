pub(crate) const DEFAULT_NODES: [&str; 3] = ["Alice", "Bob", "Charlie"];
pub(crate) const TRANSACTIONS_PER_NODE: usize = 5;
pub(crate) const MIN_AMOUNT: u64 = 1;
pub(crate) const MAX_AMOUNT: u64 = 100;
