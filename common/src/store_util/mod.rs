//! Interfaces between the application code and the files on disk.
//!
//! Every collection is read in full, changed in memory and written back in full.
//! Writers hold an advisory lock on a sidecar `.lock` file for the whole
//! read-modify-write, and the data file is replaced by renaming a fully written
//! temporary file, so readers never see a half-written collection.

use super::*;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

mod sessions;
mod submissions;

pub use sessions::{SessionStore, StartOutcome};
pub use submissions::SubmissionStore;

/// A named, durable list of records.
pub trait Collection<T> {
    /// Read the current snapshot.
    fn load_all(&self) -> Result<Vec<T>, StoreError>;

    /// Replace the whole collection.
    fn save_all(&self, records: &[T]) -> Result<(), StoreError>;

    /// Load, let `f` change the records, then save, excluding other writers for the duration.
    /// Nothing is written if `f` returns an error.
    fn update<R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;
}

/// A collection stored as a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvCollection<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> CsvCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))
            }
            _ => Ok(()),
        }
    }

    /// Take the exclusive writer lock. Released when the returned file is dropped.
    fn acquire_lock(&self) -> Result<File, StoreError> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        lock_file
            .lock()
            .map_err(|e| StoreError::io(&lock_path, e))?;
        Ok(lock_file)
    }

    fn read(&self) -> Result<Vec<T>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let records = csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<T>, csv::Error>>()
            .map_err(|e| StoreError::csv(&self.path, e))?;
        log::debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn write(&self, records: &[T]) -> Result<(), StoreError> {
        self.ensure_parent()?;
        let temp_path = self.temp_path();
        let file = File::create(&temp_path).map_err(|e| StoreError::io(&temp_path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| StoreError::csv(&temp_path, e))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io(&temp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        log::debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

impl<T> Collection<T> for CsvCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load_all(&self) -> Result<Vec<T>, StoreError> {
        self.read()
    }

    fn save_all(&self, records: &[T]) -> Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        self.write(records)
    }

    fn update<R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let _lock = self.acquire_lock()?;
        let mut records = self.read()?;
        let result = f(&mut records)?;
        self.write(&records)?;
        Ok(result)
    }
}

/// A collection that only lives as long as the process. Mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryCollection<T> {
    records: Mutex<Vec<T>>,
}

impl<T> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl<T: Clone> Collection<T> for MemoryCollection<T> {
    fn load_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_all(&self, records: &[T]) -> Result<(), StoreError> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        Ok(())
    }

    fn update<R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = guard.clone();
        let result = f(&mut records)?;
        *guard = records;
        Ok(result)
    }
}
