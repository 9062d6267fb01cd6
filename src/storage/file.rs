//! Disk persistence: one pretty-printed JSON array per key.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use super::{ChainStore, StoreResult};
use crate::blockchain::Block;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Map a key to `<dir>/<hex of key>.json`, so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key)))
    }
}

impl ChainStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<Block>>> {
        let raw = match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn set(&self, key: &str, chain: &[Block]) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(chain)?;
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        // rename is atomic on the same filesystem
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
