pub mod search;
pub mod task;

pub use search::{MinedNonce, MiningInput, MiningPolicy, MiningProgress, SearchOutcome, search};
pub use task::{MinerEvent, MiningTask};

/// Emit a progress report every this many attempts.
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Lower bound for the nonce ceiling, whatever the difficulty.
pub const BASE_NONCE_CEILING: u64 = 100_000_000;

/// Ceiling is at least this many times the expected attempt count (16^difficulty),
/// so P(timeout) <= e^-64 for an honest search.
pub const CEILING_SAFETY_FACTOR: u64 = 64;
