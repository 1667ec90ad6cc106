//! File-based lock provider
//!
//! Each named lock is an OS advisory lock on `<dir>/<name>.lock`. Every process
//! sharing the directory (typically the shared data directory mount) contends
//! on the same file. The holder writes JSON metadata into the file so that
//! other processes can report who owns the lock.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{LockHandle, LockProvider};

/// Metadata written by the current holder of a file lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Process ID of the holder
    pub pid: u32,
    /// Host the holder runs on
    pub host: String,
    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            pid: std::process::id(),
            host,
            acquired_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid {} on {} since {}",
            self.pid,
            self.host,
            self.acquired_at.to_rfc3339()
        )
    }
}

/// Lock provider backed by advisory file locks in a shared directory
#[derive(Debug, Clone)]
pub struct FileLockProvider {
    dir: PathBuf,
}

impl FileLockProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for the given lock name
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }

    fn open(&self, name: &str) -> anyhow::Result<(File, PathBuf)> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create lock directory '{}'", self.dir.display()))?;

        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open lock file '{}'", path.display()))?;
        Ok((file, path))
    }

    fn handle(&self, name: &str, file: File, path: PathBuf) -> Box<dyn LockHandle> {
        if let Err(e) = write_holder(&file) {
            // The lock is held regardless; the metadata is diagnostic only
            warn!(path = %path.display(), error = %e, "Failed to record lock holder");
        }
        debug!(name = %name, path = %path.display(), "File lock acquired");
        Box::new(FileLockHandle {
            name: name.to_string(),
            path,
            file: Some(file),
        })
    }

    /// Read the metadata written by the current (or last) holder of a lock
    pub fn holder(&self, name: &str) -> anyhow::Result<Option<LockHolder>> {
        let path = self.lock_path(name);
        let mut content = String::new();
        match File::open(&path) {
            Ok(mut file) => {
                file.read_to_string(&mut content)
                    .with_context(|| format!("failed to read lock file '{}'", path.display()))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open lock file '{}'", path.display()));
            }
        }

        if content.trim().is_empty() {
            return Ok(None);
        }
        let holder = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse lock file '{}'", path.display()))?;
        Ok(Some(holder))
    }
}

fn write_holder(mut file: &File) -> anyhow::Result<()> {
    let json = serde_json::to_string(&LockHolder::current())?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl LockProvider for FileLockProvider {
    fn provider_type(&self) -> &'static str {
        "file"
    }

    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn LockHandle>> {
        let (file, path) = self.open(name)?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock '{}'", path.display()))?;
        Ok(self.handle(name, file, path))
    }

    fn try_acquire(&self, name: &str) -> anyhow::Result<Option<Box<dyn LockHandle>>> {
        let (file, path) = self.open(name)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(self.handle(name, file, path))),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to lock '{}'", path.display())),
        }
    }
}

#[derive(Debug)]
struct FileLockHandle {
    name: String,
    path: PathBuf,
    file: Option<File>,
}

impl LockHandle for FileLockHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(mut self: Box<Self>) -> anyhow::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "Failed to clear lock holder");
        }
        FileExt::unlock(&file)
            .with_context(|| format!("failed to unlock '{}'", self.path.display()))?;
        debug!(name = %self.name, path = %self.path.display(), "File lock released");
        Ok(())
    }
}

impl Drop for FileLockHandle {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = FileExt::unlock(&file)
        {
            warn!(path = %self.path.display(), error = %e, "Failed to unlock dropped lock file");
        }
    }
}
