//! JSON file helpers shared by settings and manifests.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// One mutex per path with a write in flight. Entries leave the table with
/// their last holder.
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn acquire_path_lock(path: &Path) -> Arc<Mutex<()>> {
    Arc::clone(
        PATH_LOCKS
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(()))),
    )
}

fn release_path_lock(path: &Path, lock: Arc<Mutex<()>>) {
    let mut locks = PATH_LOCKS.lock();
    drop(lock);
    // only the table still refers to it
    if locks.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
        locks.remove(path);
    }
}

#[cfg(test)]
fn path_lock_held(path: &Path) -> bool {
    PATH_LOCKS.lock().contains_key(path)
}

/// `defs.json` + `bak` -> `defs.json.bak`, next to the original.
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf, StorageError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::Invalid(format!("not a file path: {}", path.display())))?;
    let mut name = OsString::from(file_name);
    name.push(".");
    name.push(suffix);
    Ok(path.with_file_name(name))
}

/// Replace `path` with `data` so readers see either the old or the new
/// contents, never a partial file. The previous file is kept as `.bak`.
/// Writers to the same path within this process take turns.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let lock = acquire_path_lock(path);
    let result = {
        let _turn = lock.lock();
        replace_file(path, data)
    };
    release_path_lock(path, lock);
    result
}

fn replace_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let staging = sibling(path, "tmp")?;
    let backup = sibling(path, "bak")?;

    let mut file = fs::File::create(&staging)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if path.exists() {
        // losing the backup is not worth failing the write over
        let _ = fs::rename(path, &backup);
    }
    fs::rename(&staging, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}
