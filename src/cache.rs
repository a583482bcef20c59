//! Per-account cache persistence
//!
//! One JSON file per account key (username when known, token otherwise) under
//! the configured data directory. Read at startup to short-circuit the login
//! handshake; overwritten after every farming cycle so a restart resumes the
//! catalog walk instead of rescanning from the beginning.

use crate::error::Result;
use crate::types::SessionSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot store backed by one JSON file per account key
#[derive(Clone, Debug)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at the given directory
    ///
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot file for an account key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}_cache.json"))
    }

    /// Loads the snapshot for an account key, if one exists
    ///
    /// A missing file is a normal "absent" result. A file that exists but
    /// fails to parse is treated the same way with a warning: a fresh login
    /// is always possible, losing a corrupt cache is not worth aborting the
    /// account.
    pub fn load(&self, key: &str) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str(&contents) {
            Ok(snapshot) => {
                debug!(path = %path.display(), "cache snapshot restored");
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cache snapshot");
                Ok(None)
            }
        }
    }

    /// Overwrites the snapshot for an account key
    pub fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.path_for(key);
        fs::write(&path, serde_json::to_string(snapshot)?)?;
        debug!(path = %path.display(), "cache snapshot written");
        Ok(())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Path::new("./data"))
    }
}
