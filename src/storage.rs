use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Persisted key names, one JSON file each under the data directory.
pub const TASKS_KEY: &str = "glassy_tasks";
pub const NOTES_KEY: &str = "glassy_notes";
pub const PLAYLIST_KEY: &str = "playlist";
pub const CURRENT_INDEX_KEY: &str = "current_index";
pub const VOLUME_KEY: &str = "volume";
pub const RECENT_SEARCHES_KEY: &str = "recent_searches";

/// Whole-value JSON persistence, one file per key: every key is read once
/// at startup and overwritten in full on each mutation.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Reads and parses a key. Absent, unreadable, or damaged files are
    /// logged and degrade to `None` so startup still succeeds.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::error!("Error parsing {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::error!("Error reading {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Serializes a value and overwrites the key in full.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)?;
        let mut file = File::create(self.path_for(key))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
