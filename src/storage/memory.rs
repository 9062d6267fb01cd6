use std::collections::HashMap;
use std::sync::RwLock;

use super::{ChainStore, StoreError, StoreResult};
use crate::blockchain::Block;

/// In-process store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, Vec<Block>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<Block>>> {
        let map = self.map.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, chain: &[Block]) -> StoreResult<()> {
        let mut map = self.map.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(key.to_string(), chain.to_vec());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}
