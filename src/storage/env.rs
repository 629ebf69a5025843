//! Shared KV environment.
//!
//! One environment per process, opened once; store handles are cheap
//! clones of the underlying handle. The engine provides named
//! sub-databases, single-writer transactions, and snapshot-isolated
//! readers.

use std::path::Path;

use heed::{Env, EnvOpenOptions};
use tracing::info;

use crate::error::Result;

/// Default memory-map size (sparse; only written pages take disk).
pub const DEFAULT_MAP_SIZE: usize = 16 * 1024 * 1024 * 1024;
/// Sub-database limit: segment + metadata pair per entity kind, with
/// headroom for per-timeframe bar databases.
pub const DEFAULT_MAX_DBS: u32 = 32;

/// Process-wide storage environment.
#[derive(Clone)]
pub struct StorageEnv {
    env: Env,
}

impl StorageEnv {
    /// Opens (or creates) the environment at `path` with explicit limits.
    pub fn open_with(path: &Path, map_size: usize, max_dbs: u32) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };
        info!(path = %path.display(), map_size, max_dbs, "storage environment opened");
        Ok(Self { env })
    }

    /// Opens the environment with default limits.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, DEFAULT_MAP_SIZE, DEFAULT_MAX_DBS)
    }

    /// Raw engine handle for store internals.
    pub(crate) fn raw(&self) -> &Env {
        &self.env
    }
}
