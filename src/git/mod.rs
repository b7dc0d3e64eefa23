//! Git operations against the local mirror repository.

mod workspace;

pub use workspace::{CommitAuthor, CommitInfo, GitWorkspace};
