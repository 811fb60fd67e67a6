//! Memory-mapped state store
//!
//! The record lives in a shared file mapping, so anything flushed here is
//! visible to the next process generation after an exec. Accessors read and
//! write the mapped bytes directly; there is no in-process copy.

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::record::{self, StateSnapshot, RECORD_SIZE};
use crate::error::StorageError;

/// Handle to the mapped learner record
pub struct StateStore {
    path: PathBuf,
    map: MmapMut,
}

impl StateStore {
    /// Open (creating if needed) the backing file and map the record.
    ///
    /// A header that does not match [`record::MAGIC`] / [`record::VERSION`]
    /// is reset to defaults and flushed before this returns.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StorageError::Open { path: path.clone(), source })?;

        let len = file
            .metadata()
            .map_err(|source| StorageError::Open { path: path.clone(), source })?
            .len();
        if len < RECORD_SIZE as u64 {
            debug!("Extending state file {:?} from {} to {} bytes", path, len, RECORD_SIZE);
            file.set_len(RECORD_SIZE as u64)
                .map_err(|source| StorageError::Resize {
                    path: path.clone(),
                    len: RECORD_SIZE as u64,
                    source,
                })?;
        }

        // SAFETY: single-writer discipline; no other process maps this file
        // while we hold it, and the file is at least RECORD_SIZE bytes.
        let map = unsafe { MmapOptions::new().len(RECORD_SIZE).map_mut(&file) }
            .map_err(|source| StorageError::Map { path: path.clone(), source })?;

        let mut store = Self { path, map };
        store.initialize_if_invalid()?;
        Ok(store)
    }

    /// Reset the record when its header is foreign, stale or zeroed
    fn initialize_if_invalid(&mut self) -> Result<bool, StorageError> {
        let magic = record::read_u32(&self.map, record::MAGIC_AT);
        let version = record::read_u32(&self.map, record::VERSION_AT);

        if magic == record::MAGIC && version == record::VERSION {
            debug!("State file {:?} header valid (iteration {})", self.path, self.iteration());
            return Ok(false);
        }

        if magic == 0 && version == 0 {
            info!("Initializing new state file {:?}", self.path);
        } else {
            warn!(
                "State file {:?} has header magic={:#010x} version={} (expected {:#010x}/{}); reinitializing",
                self.path, magic, version, record::MAGIC, record::VERSION
            );
        }
        self.reset()?;
        Ok(true)
    }

    /// Zero the record, write defaults, and flush
    pub fn reset(&mut self) -> Result<(), StorageError> {
        let buf = &mut self.map[..];
        buf.fill(0);
        record::write_u32(buf, record::MAGIC_AT, record::MAGIC);
        record::write_u32(buf, record::VERSION_AT, record::VERSION);
        record::write_u64(buf, record::ITERATION_AT, 0);
        record::write_f64(buf, record::WEIGHT_AT, record::DEFAULT_WEIGHT);
        record::write_f64(buf, record::BIAS_AT, record::DEFAULT_BIAS);
        record::write_f64(buf, record::RUNNING_REWARD_AT, record::DEFAULT_RUNNING_REWARD);
        self.flush()
    }

    /// Synchronously write the mapped record back to the file
    pub fn flush(&self) -> Result<(), StorageError> {
        self.map
            .flush()
            .map_err(|source| StorageError::Flush { path: self.path.clone(), source })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn iteration(&self) -> u64 {
        record::read_u64(&self.map, record::ITERATION_AT)
    }

    pub fn set_iteration(&mut self, value: u64) {
        record::write_u64(&mut self.map, record::ITERATION_AT, value);
    }

    /// Advance the iteration counter, returning the new value
    pub fn advance_iteration(&mut self) -> u64 {
        let next = self.iteration().wrapping_add(1);
        self.set_iteration(next);
        next
    }

    pub fn weight(&self) -> f64 {
        record::read_f64(&self.map, record::WEIGHT_AT)
    }

    pub fn set_weight(&mut self, value: f64) {
        record::write_f64(&mut self.map, record::WEIGHT_AT, value);
    }

    pub fn bias(&self) -> f64 {
        record::read_f64(&self.map, record::BIAS_AT)
    }

    pub fn set_bias(&mut self, value: f64) {
        record::write_f64(&mut self.map, record::BIAS_AT, value);
    }

    pub fn running_reward(&self) -> f64 {
        record::read_f64(&self.map, record::RUNNING_REWARD_AT)
    }

    pub fn set_running_reward(&mut self, value: f64) {
        record::write_f64(&mut self.map, record::RUNNING_REWARD_AT, value);
    }

    pub fn scratch(&self) -> String {
        record::read_scratch(&self.map)
    }

    /// Store a note, truncated to fit the scratch field
    pub fn set_scratch(&mut self, text: &str) {
        let written = record::write_scratch(&mut self.map, text);
        if written < text.len() {
            debug!("Scratch note truncated from {} to {} bytes", text.len(), written);
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::decode(&self.map)
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("state", &self.snapshot())
            .finish()
    }
}
