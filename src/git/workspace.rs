//! The repository command layer.
//!
//! Wraps stage, commit, history, and diff operations on the single local
//! working copy of the mirror repository. The index is the one contended
//! resource in the whole engine; callers serialize mutating operations by
//! holding the engine's workspace lock around them.
//!
//! "Commit only if changed" is decided structurally: the staged index tree
//! is compared against the HEAD tree, and an identical tree yields `None`
//! instead of a commit. Subprocess exit codes are never involved, so a
//! genuine git failure can never masquerade as "no changes".

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Signature};
use std::path::{Path, PathBuf};

/// Identity used to author mirror commits.
///
/// Commits are authored as the acting user, not a generic service account,
/// so `git blame` on the mirror answers "who changed this" truthfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl CommitAuthor {
    /// Creates an author identity.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// The identity used for reconciler and tooling commits.
    #[must_use]
    pub fn system() -> Self {
        Self::new("vaultsync", "vaultsync@local")
    }
}

/// One commit in a mirror file's history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommitInfo {
    /// Full commit id.
    pub sha: String,
    /// Author display name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Commit timestamp.
    pub date: DateTime<Utc>,
    /// Commit message summary line.
    pub message: String,
}

/// Handle on the local mirror repository.
///
/// The repository is opened per operation; libgit2 handles are cheap and
/// this keeps the struct `Send` so it can live behind the engine's mutex.
pub struct GitWorkspace {
    /// Path to the working tree root.
    repo_path: PathBuf,
}

impl GitWorkspace {
    /// Creates a workspace handle for an existing repository.
    #[must_use]
    pub fn new(repo_path: impl AsRef<Path>) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }

    /// Initializes a repository at the path if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn init_if_needed(repo_path: impl AsRef<Path>) -> Result<Self> {
        let repo_path = repo_path.as_ref().to_path_buf();
        if !repo_path.join(".git").exists() {
            Repository::init(&repo_path).map_err(|e| Error::OperationFailed {
                operation: "init_repository".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(Self { repo_path })
    }

    /// Returns the working tree root.
    #[must_use]
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Opens the repository.
    fn open_repo(&self) -> Result<Repository> {
        Repository::open(&self.repo_path).map_err(|e| Error::OperationFailed {
            operation: "open_repository".to_string(),
            cause: e.to_string(),
        })
    }

    /// Builds a commit signature for an author.
    fn signature(author: &CommitAuthor) -> Result<Signature<'static>> {
        Signature::now(&author.name, &author.email).map_err(|e| Error::OperationFailed {
            operation: "create_signature".to_string(),
            cause: e.to_string(),
        })
    }

    /// Stages one or more paths (relative to the repo root).
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub fn add(&self, paths: &[&Path]) -> Result<()> {
        let repo = self.open_repo()?;
        let mut index = repo.index().map_err(|e| Error::OperationFailed {
            operation: "open_index".to_string(),
            cause: e.to_string(),
        })?;

        for path in paths {
            index.add_path(path).map_err(|e| Error::OperationFailed {
                operation: "stage_path".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
        }

        index.write().map_err(|e| Error::OperationFailed {
            operation: "write_index".to_string(),
            cause: e.to_string(),
        })
    }

    /// Stages the deletion of a path (relative to the repo root).
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let repo = self.open_repo()?;
        let mut index = repo.index().map_err(|e| Error::OperationFailed {
            operation: "open_index".to_string(),
            cause: e.to_string(),
        })?;

        // Removing a path the index never tracked is vacuous, not an error;
        // it happens when a mirror file is deleted before its first commit.
        match index.remove_path(path) {
            Ok(()) => {},
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(()),
            Err(e) => {
                return Err(Error::OperationFailed {
                    operation: "stage_removal".to_string(),
                    cause: format!("{}: {e}", path.display()),
                });
            },
        }

        index.write().map_err(|e| Error::OperationFailed {
            operation: "write_index".to_string(),
            cause: e.to_string(),
        })
    }

    /// Commits the staged index if it differs from HEAD.
    ///
    /// Returns the new commit id, or `None` when the staged tree is
    /// identical to the HEAD tree; re-running a no-op update must not
    /// pollute history.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails. Failures are not retried
    /// here; retry is the reconciler's job.
    pub fn commit_staged_if_any(
        &self,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<Option<String>> {
        let repo = self.open_repo()?;
        let mut index = repo.index().map_err(|e| Error::OperationFailed {
            operation: "open_index".to_string(),
            cause: e.to_string(),
        })?;

        let tree_id = index.write_tree().map_err(|e| Error::OperationFailed {
            operation: "write_tree".to_string(),
            cause: e.to_string(),
        })?;

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());

        // An index tree identical to HEAD means nothing is staged.
        // On an unborn branch an empty tree means the same.
        match &parent {
            Some(head) => {
                if head.tree_id() == tree_id {
                    return Ok(None);
                }
            },
            None => {
                let empty = repo
                    .treebuilder(None)
                    .and_then(|b| b.write())
                    .map_err(|e| Error::OperationFailed {
                        operation: "write_empty_tree".to_string(),
                        cause: e.to_string(),
                    })?;
                if tree_id == empty {
                    return Ok(None);
                }
            },
        }

        let tree = repo.find_tree(tree_id).map_err(|e| Error::OperationFailed {
            operation: "find_tree".to_string(),
            cause: e.to_string(),
        })?;
        let sig = Self::signature(author)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| Error::OperationFailed {
                operation: "commit".to_string(),
                cause: e.to_string(),
            })?;

        tracing::debug!(sha = %oid, "mirror commit created");
        Ok(Some(oid.to_string()))
    }

    /// Returns the commits that touched a path, newest first.
    ///
    /// Read-only, used for version-history display; not part of the write
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk fails.
    pub fn history(&self, path: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
        let repo = self.open_repo()?;

        if repo.head().is_err() {
            // Unborn branch, no history yet.
            return Ok(Vec::new());
        }

        let mut revwalk = repo.revwalk().map_err(|e| Error::OperationFailed {
            operation: "revwalk".to_string(),
            cause: e.to_string(),
        })?;
        revwalk.push_head().map_err(|e| Error::OperationFailed {
            operation: "revwalk_push_head".to_string(),
            cause: e.to_string(),
        })?;
        revwalk
            .set_sorting(git2::Sort::TIME)
            .map_err(|e| Error::OperationFailed {
                operation: "revwalk_sorting".to_string(),
                cause: e.to_string(),
            })?;

        let mut commits = Vec::new();
        for oid in revwalk {
            if commits.len() >= limit {
                break;
            }
            let oid = oid.map_err(|e| Error::OperationFailed {
                operation: "revwalk_next".to_string(),
                cause: e.to_string(),
            })?;
            let commit = repo.find_commit(oid).map_err(|e| Error::OperationFailed {
                operation: "find_commit".to_string(),
                cause: e.to_string(),
            })?;

            if commit_touches_path(&commit, path) {
                commits.push(commit_info(&commit));
            }
        }

        Ok(commits)
    }

    /// Returns the unified diff of a path between two commits.
    ///
    /// # Errors
    ///
    /// Returns an error if either commit cannot be resolved or the diff
    /// fails.
    pub fn diff(&self, path: &Path, from_commit: &str, to_commit: &str) -> Result<String> {
        let repo = self.open_repo()?;

        let from_tree = resolve_tree(&repo, from_commit)?;
        let to_tree = resolve_tree(&repo, to_commit)?;

        let mut opts = git2::DiffOptions::new();
        opts.pathspec(path);

        let diff = repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut opts))
            .map_err(|e| Error::OperationFailed {
                operation: "diff_trees".to_string(),
                cause: e.to_string(),
            })?;

        let mut text = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => text.push(line.origin()),
                _ => {},
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .map_err(|e| Error::OperationFailed {
            operation: "print_diff".to_string(),
            cause: e.to_string(),
        })?;

        Ok(text)
    }

    /// Returns true if the working tree has no uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns an error if status inspection fails.
    pub fn is_clean(&self) -> Result<bool> {
        let repo = self.open_repo()?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| Error::OperationFailed {
                operation: "repo_statuses".to_string(),
                cause: e.to_string(),
            })?;
        Ok(statuses.is_empty())
    }

    /// Returns the current branch name.
    ///
    /// # Errors
    ///
    /// Returns an error if HEAD cannot be resolved.
    pub fn current_branch(&self) -> Result<String> {
        let repo = self.open_repo()?;
        let head = repo.head().map_err(|e| Error::OperationFailed {
            operation: "get_head".to_string(),
            cause: e.to_string(),
        })?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Pushes a branch to a remote. Repository-level, used by deployment
    /// tooling, not per-entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote is missing or the push fails.
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let repo = self.open_repo()?;
        let mut remote = repo
            .find_remote(remote)
            .map_err(|e| Error::OperationFailed {
                operation: "find_remote".to_string(),
                cause: e.to_string(),
            })?;

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        remote
            .push(&[&refspec], None)
            .map_err(|e| Error::OperationFailed {
                operation: "push".to_string(),
                cause: e.to_string(),
            })
    }
}

/// Resolves a revision string to its tree.
fn resolve_tree<'r>(repo: &'r Repository, rev: &str) -> Result<git2::Tree<'r>> {
    let object = repo.revparse_single(rev).map_err(|e| Error::OperationFailed {
        operation: "resolve_commit".to_string(),
        cause: format!("{rev}: {e}"),
    })?;
    let commit = object.peel_to_commit().map_err(|e| Error::OperationFailed {
        operation: "resolve_commit".to_string(),
        cause: format!("{rev}: {e}"),
    })?;
    commit.tree().map_err(|e| Error::OperationFailed {
        operation: "resolve_tree".to_string(),
        cause: e.to_string(),
    })
}

/// Checks whether a commit changed the given path relative to its first
/// parent (or introduced it, for root commits).
fn commit_touches_path(commit: &git2::Commit<'_>, path: &Path) -> bool {
    let Ok(tree) = commit.tree() else {
        return false;
    };
    let entry = tree.get_path(path).ok().map(|e| e.id());

    match commit.parent(0) {
        Ok(parent) => {
            let parent_entry = parent
                .tree()
                .ok()
                .and_then(|t| t.get_path(path).ok())
                .map(|e| e.id());
            entry != parent_entry
        },
        // Root commit: the path changed if it exists here.
        Err(_) => entry.is_some(),
    }
}

fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();
    let date = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_default();

    CommitInfo {
        sha: commit.id().to_string(),
        author: author.name().unwrap_or("unknown").to_string(),
        email: author.email().unwrap_or("").to_string(),
        date,
        message: commit.summary().unwrap_or("").to_string(),
    }
}
