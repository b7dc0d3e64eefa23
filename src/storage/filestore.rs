//! Markdown mirror files on disk.
//!
//! One store per entity kind, rooted at `<repo>/<kind-directory>/`. The
//! store only touches the filesystem; staging and committing the resulting
//! paths is the git workspace's job. I/O errors propagate to the caller
//! unchanged so the sync engine decides how to record them.

use crate::slug::is_safe_slug;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Mirror file store for one entity kind.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Root of the git working tree.
    repo_root: PathBuf,
    /// Kind directory under the root, e.g. `skills`.
    directory: String,
}

impl FileStore {
    /// Creates a file store for a kind directory under the repo root.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, directory: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            directory: directory.into(),
        }
    }

    /// Returns the kind directory name.
    #[must_use]
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Returns the path of a mirror file relative to the repo root, as
    /// passed to git staging operations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slug is not filesystem-safe.
    pub fn relative_path(&self, slug: &str) -> Result<PathBuf> {
        if !is_safe_slug(slug) {
            return Err(Error::InvalidInput(format!(
                "slug contains invalid characters: {slug}"
            )));
        }
        Ok(Path::new(&self.directory).join(format!("{slug}.md")))
    }

    /// Returns the absolute path of a mirror file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slug is not filesystem-safe.
    pub fn absolute_path(&self, slug: &str) -> Result<PathBuf> {
        Ok(self.repo_root.join(self.relative_path(slug)?))
    }

    /// Writes rendered content for a slug, creating the kind directory on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write
    /// fails.
    pub fn write(&self, slug: &str, content: &str) -> Result<()> {
        let path = self.absolute_path(slug)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_mirror_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        fs::write(&path, content).map_err(|e| Error::OperationFailed {
            operation: "write_mirror_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    /// Reads the content for a slug, or `None` if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read(&self, slug: &str) -> Result<Option<String>> {
        let path = self.absolute_path(slug)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| Error::OperationFailed {
                operation: "read_mirror_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })
    }

    /// Moves a mirror file from one slug to another.
    ///
    /// Both the removal of the old path and the presence of the new path
    /// must be visible to the git staging step that follows, so this is a
    /// filesystem rename, not a copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn rename(&self, old_slug: &str, new_slug: &str) -> Result<()> {
        let old_path = self.absolute_path(old_slug)?;
        let new_path = self.absolute_path(new_slug)?;
        fs::rename(&old_path, &new_path).map_err(|e| Error::OperationFailed {
            operation: "rename_mirror_file".to_string(),
            cause: format!("{} -> {}: {e}", old_path.display(), new_path.display()),
        })
    }

    /// Deletes the mirror file for a slug. Returns false if no file
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, slug: &str) -> Result<bool> {
        let path = self.absolute_path(slug)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| Error::OperationFailed {
            operation: "delete_mirror_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Ok(true)
    }

    /// Returns true if a mirror file exists for the slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slug is not filesystem-safe.
    pub fn exists(&self, slug: &str) -> Result<bool> {
        Ok(self.absolute_path(slug)?.exists())
    }

    /// Lists slugs present in the kind directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_slugs(&self) -> Result<Vec<String>> {
        let dir = self.repo_root.join(&self.directory);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| Error::OperationFailed {
            operation: "read_mirror_dir".to_string(),
            cause: e.to_string(),
        })?;

        let mut slugs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::OperationFailed {
                operation: "read_mirror_dir_entry".to_string(),
                cause: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slugs.push(stem.to_string());
            }
        }

        slugs.sort();
        Ok(slugs)
    }
}
