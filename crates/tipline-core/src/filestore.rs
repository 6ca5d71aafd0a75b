//! On-disk submission storage layout.
//!
//! Maps a source's filesystem id to their directory under the store root.
//! Ids are validated against the base32 alphabet before any path join, so
//! a corrupted or hostile value can never escape the root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, TiplineError};

/// Maps filesystem ids to per-source directories under a fixed root.
pub struct Filestore {
    storage_path: PathBuf,
}

impl Filestore {
    /// Build a filestore rooted at `storage_path`.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::Storage` if the root is not an absolute path
    /// to an existing directory.
    pub fn new(storage_path: impl Into<PathBuf>) -> Result<Self> {
        let storage_path = storage_path.into();
        if !storage_path.is_absolute() {
            return Err(TiplineError::Storage(format!(
                "Store root must be an absolute path: {}",
                storage_path.display()
            )));
        }
        if !storage_path.is_dir() {
            return Err(TiplineError::Storage(format!(
                "Store root does not exist: {}",
                storage_path.display()
            )));
        }
        Ok(Self { storage_path })
    }

    /// Build the filestore from deployment configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.store_dir.clone())
    }

    /// The source directory for `filesystem_id`.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::InvalidInput` if the id contains anything
    /// outside the base32 alphabet a derived id can hold.
    pub fn path(&self, filesystem_id: &str) -> Result<PathBuf> {
        validate_filesystem_id(filesystem_id)?;
        Ok(self.storage_path.join(filesystem_id))
    }

    /// Create the directory for a newly registered source.
    pub fn create_source_directory(&self, filesystem_id: &str) -> Result<PathBuf> {
        let path = self.path(filesystem_id)?;
        fs::create_dir(&path)
            .map_err(|e| TiplineError::Storage(format!("Could not create source directory: {}", e)))?;
        Ok(path)
    }

    /// The store root. Upload buffering creates its temporary files here.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}

fn validate_filesystem_id(filesystem_id: &str) -> Result<()> {
    let valid = !filesystem_id.is_empty()
        && filesystem_id
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c) || c == '=');
    if !valid {
        return Err(TiplineError::InvalidInput(
            "Invalid filesystem id".to_string(),
        ));
    }
    Ok(())
}
