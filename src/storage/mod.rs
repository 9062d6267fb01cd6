pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

use crate::blockchain::Block;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored chain is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed whole-value store for the chain.
/// `set` must replace the value atomically: readers see the old or the new chain, never a mix.
pub trait ChainStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<Block>>>;

    fn set(&self, key: &str, chain: &[Block]) -> StoreResult<()>;

    /// Human-readable backend name (for logs and stats).
    fn kind(&self) -> &'static str;
}
