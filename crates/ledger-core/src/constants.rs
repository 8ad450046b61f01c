pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const NIBBLE: u32 = 4;
pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_PAYLOAD: &str = "Genesis Block";
pub const DEFAULT_DIFFICULTY: u32 = 2;
