//! Persisted archive state: the accumulated store and the hidden marks.
//!
//! Both live as JSON files in the data directory and are replaced atomically
//! (temp file in the same directory, then rename). Commands that load, change
//! and save a file hold the directory lock for the whole cycle, so two
//! processes cannot overwrite each other's merges.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use icalarchive_core::{Archive, HiddenMarks, SourceRecord, StoreSnapshot};
use serde::{Deserialize, Serialize};

const STORE_FILE: &str = "store.json";
const HIDDEN_FILE: &str = "hidden.json";
const LOCK_FILE: &str = "icalarchive.lock";

/// Exclusive hold on the data directory, released on drop.
pub struct DataLock {
    _file: File,
}

#[derive(Deserialize)]
struct StoreFile {
    #[serde(default)]
    sources: Vec<SourceRecord>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    sources: Vec<&'a SourceRecord>,
}

pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn new(path: PathBuf) -> Self {
        DataDir { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the data directory lock, failing if another process holds it.
    pub fn lock(&self) -> Result<DataLock> {
        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let path = self.path.join(LOCK_FILE);
        let file = File::create(&path).context("Failed to create lock file")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another icalarchive process is using {}.\n\
                If you believe this is an error, remove: {}",
                self.path.display(),
                path.display()
            )
        })?;

        Ok(DataLock { _file: file })
    }

    fn store_path(&self) -> PathBuf {
        self.path.join(STORE_FILE)
    }

    fn hidden_path(&self) -> PathBuf {
        self.path.join(HIDDEN_FILE)
    }

    /// Load the archive, or an empty one on first run.
    pub fn load_archive(&self) -> Result<Archive> {
        let path = self.store_path();
        if !path.exists() {
            return Ok(Archive::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: StoreFile = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt store file {}", path.display()))?;
        Ok(Archive::from_records(file.sources))
    }

    pub fn save_store(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let file = StoreFileRef {
            sources: snapshot.records().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        self.write_atomic(&self.store_path(), &json)
    }

    pub fn load_hidden(&self) -> Result<HiddenMarks> {
        let path = self.hidden_path();
        if !path.exists() {
            return Ok(HiddenMarks::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Corrupt marks file {}", path.display()))
    }

    pub fn save_hidden(&self, marks: &HiddenMarks) -> Result<()> {
        let json = serde_json::to_string_pretty(marks)?;
        self.write_atomic(&self.hidden_path(), &json)
    }

    fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.path)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
