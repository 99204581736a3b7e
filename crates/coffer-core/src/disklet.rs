//! Path-keyed text storage.
//!
//! The stash store reads and writes whole JSON documents through this
//! trait. The filesystem implementation stages writes through a temp file
//! and renames, so a crash never leaves a half-written stash behind.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LoginError, Result};

/// What a listing entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// Keep only the file paths from a listing.
pub fn just_files(listing: Vec<(String, EntryKind)>) -> Vec<String> {
    listing
        .into_iter()
        .filter(|(_, kind)| *kind == EntryKind::File)
        .map(|(path, _)| path)
        .collect()
}

/// An async path-keyed text store.
#[async_trait]
pub trait Disklet: Send + Sync {
    /// List the direct entries of a folder. A missing folder lists empty.
    async fn list(&self, path: &str) -> Result<Vec<(String, EntryKind)>>;

    /// Read a file as UTF-8 text.
    async fn get_text(&self, path: &str) -> Result<String>;

    /// Replace a file's contents in one atomic step, creating parents.
    async fn set_text(&self, path: &str, text: &str) -> Result<()>;

    /// Delete a file. Deleting a missing file is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Filesystem-backed disklet rooted at a base directory.
pub struct FsDisklet {
    base: PathBuf,
}

impl FsDisklet {
    /// Create a disklet rooted at `base`, creating the directory if needed.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)
            .map_err(|err| LoginError::Storage(format!("cannot create data directory: {err}")))?;
        Ok(FsDisklet { base })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }
}

#[async_trait]
impl Disklet for FsDisklet {
    async fn list(&self, path: &str) -> Result<Vec<(String, EntryKind)>> {
        let folder = self.resolve(path);
        let mut reader = match tokio::fs::read_dir(&folder).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(LoginError::Storage(format!(
                    "cannot list {}: {err}",
                    folder.display()
                )))
            }
        };

        let mut out = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| LoginError::Storage(format!("cannot read entry: {err}")))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let kind = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => EntryKind::Folder,
                Ok(file_type) if file_type.is_file() => EntryKind::File,
                _ => continue,
            };
            out.push((format!("{path}/{name}"), kind));
        }
        Ok(out)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let file = self.resolve(path);
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|err| LoginError::Storage(format!("cannot read {}: {err}", file.display())))
    }

    async fn set_text(&self, path: &str, text: &str) -> Result<()> {
        let file = self.resolve(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| LoginError::Storage(format!("cannot create directory: {err}")))?;
        }
        let staging = file.with_extension("tmp");
        tokio::fs::write(&staging, text)
            .await
            .map_err(|err| LoginError::Storage(format!("cannot write {}: {err}", file.display())))?;
        tokio::fs::rename(&staging, &file)
            .await
            .map_err(|err| LoginError::Storage(format!("cannot commit {}: {err}", file.display())))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LoginError::Storage(format!(
                "cannot delete {}: {err}",
                file.display()
            ))),
        }
    }
}

/// In-memory disklet for tests.
#[derive(Default)]
pub struct MemoryDisklet {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryDisklet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Disklet for MemoryDisklet {
    async fn list(&self, path: &str) -> Result<Vec<(String, EntryKind)>> {
        let prefix = format!("{path}/");
        let files = self.files.lock().expect("disklet lock");
        let mut out = Vec::new();
        let mut folders = Vec::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => out.push((key.clone(), EntryKind::File)),
                Some((folder, _)) => {
                    let full = format!("{prefix}{folder}");
                    if !folders.contains(&full) {
                        folders.push(full);
                    }
                }
            }
        }
        out.extend(folders.into_iter().map(|path| (path, EntryKind::Folder)));
        Ok(out)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        self.files
            .lock()
            .expect("disklet lock")
            .get(path)
            .cloned()
            .ok_or_else(|| LoginError::Storage(format!("cannot read {path}: not found")))
    }

    async fn set_text(&self, path: &str, text: &str) -> Result<()> {
        self.files
            .lock()
            .expect("disklet lock")
            .insert(path.to_owned(), text.to_owned());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.files.lock().expect("disklet lock").remove(path);
        Ok(())
    }
}
