//! Hash-linked ledger with proof-of-work admission, served over HTTP.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod miner;
pub mod storage;
