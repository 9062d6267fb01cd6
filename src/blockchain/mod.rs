pub mod block;
pub mod model;
pub mod validate;

pub use block::{Block, compute_hash, meets_proof_of_work};
pub use model::{Ledger, LedgerError, Page, PageQuery, Pagination};
pub use validate::{ChainFault, Rejection, is_chain_valid, validate_successor, verify_chain};

/// Default Proof-of-Work difficulty (number of leading zero hex digits).
pub const DEFAULT_DIFFICULTY: u32 = 5;

/// Fixed genesis timestamp so the genesis hash is stable across restarts.
pub const GENESIS_TIMESTAMP: &str = "2025-01-01T00:00:00.000Z";

pub const GENESIS_DATA: &str = "Genesis Block";

/// `prevHash` sentinel carried by the genesis block.
pub const GENESIS_PREV_HASH: &str = "0";

/// Maximum block payload, in characters, after trimming.
pub const MAX_DATA_CHARS: usize = 1000;

/// Storage key holding the whole chain.
pub const DEFAULT_CHAIN_KEY: &str = "demo:chain";
