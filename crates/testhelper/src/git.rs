//! Source control operations for upgrade runs.
//!
//! An upgrade run applies the module at the base ref, then plans the
//! current code against that state. Changes marked as breaking skip the
//! upgrade run, since destroys are expected for them.

use crate::error::CommandError;
use crate::process;
use std::path::Path;
use tokio::process::Command;
use tracing::instrument;

/// Commit message marker for breaking changes.
pub const BREAKING_CHANGE_MARKER: &str = "BREAKING CHANGE";

/// Commit message marker forcing the upgrade run despite a breaking change.
pub const UNSKIP_MARKER: &str = "UNSKIP UPGRADE TEST";

/// Why the upgrade run should be skipped, if it should.
pub fn upgrade_skip_reason(commit_messages: &str) -> Option<String> {
    if commit_messages.contains(BREAKING_CHANGE_MARKER) && !commit_messages.contains(UNSKIP_MARKER)
    {
        Some(format!(
            "commit messages contain '{BREAKING_CHANGE_MARKER}' (add '{UNSKIP_MARKER}' to run anyway)"
        ))
    } else {
        None
    }
}

/// Source control operations used by upgrade runs (enables mocking).
#[async_trait::async_trait]
pub trait SourceControl: Send + Sync + std::fmt::Debug {
    /// Concatenated messages of commits on HEAD that are not on `base_ref`.
    async fn commit_messages_since(&self, repo: &Path, base_ref: &str)
        -> Result<String, CommandError>;

    /// Check out `reference` into the empty directory `dest`.
    async fn checkout(&self, repo: &Path, reference: &str, dest: &Path) -> Result<(), CommandError>;

    /// Remove a checkout created by [`SourceControl::checkout`].
    async fn remove_checkout(&self, repo: &Path, dest: &Path) -> Result<(), CommandError>;
}

/// [`SourceControl`] backed by the `git` binary, using worktrees for checkouts.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    fn command(repo: &Path) -> Command {
        let mut command = Command::new("git");
        command.arg("-C").arg(repo);
        command
    }
}

#[async_trait::async_trait]
impl SourceControl for GitCli {
    #[instrument(skip(self))]
    async fn commit_messages_since(
        &self,
        repo: &Path,
        base_ref: &str,
    ) -> Result<String, CommandError> {
        let mut command = Self::command(repo);
        command
            .arg("log")
            .arg("--format=%B")
            .arg(format!("{base_ref}..HEAD"));
        process::run(command).await
    }

    #[instrument(skip(self))]
    async fn checkout(&self, repo: &Path, reference: &str, dest: &Path) -> Result<(), CommandError> {
        let mut command = Self::command(repo);
        command
            .args(["worktree", "add", "--detach"])
            .arg(dest)
            .arg(reference);
        process::run(command).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_checkout(&self, repo: &Path, dest: &Path) -> Result<(), CommandError> {
        let mut command = Self::command(repo);
        command.args(["worktree", "remove", "--force"]).arg(dest);
        process::run(command).await?;
        Ok(())
    }
}

/// Mock source control for unit testing.
pub mod mock {
    use super::*;
    use crate::workspace::copy_dir;
    use std::path::PathBuf;
    use std::sync::{Mutex, PoisonError};

    /// Mock source control.
    ///
    /// Returns fixed commit messages; `checkout` copies the repository as-is,
    /// or the tree set with [`MockSourceControl::with_base_tree`].
    #[derive(Debug, Default)]
    pub struct MockSourceControl {
        messages: String,
        base_tree: Option<PathBuf>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockSourceControl {
        pub fn with_messages(messages: impl Into<String>) -> Self {
            Self {
                messages: messages.into(),
                ..Self::default()
            }
        }

        /// Check out `tree` instead of the repository, as if the base ref
        /// had different contents.
        #[must_use]
        pub fn with_base_tree(mut self, tree: impl Into<PathBuf>) -> Self {
            self.base_tree = Some(tree.into());
            self
        }

        /// Names of the operations called, in order.
        pub fn operations(&self) -> Vec<&'static str> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, op: &'static str) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(op);
        }
    }

    #[async_trait::async_trait]
    impl SourceControl for MockSourceControl {
        async fn commit_messages_since(
            &self,
            _repo: &Path,
            _base_ref: &str,
        ) -> Result<String, CommandError> {
            self.record("log");
            Ok(self.messages.clone())
        }

        async fn checkout(
            &self,
            repo: &Path,
            _reference: &str,
            dest: &Path,
        ) -> Result<(), CommandError> {
            self.record("checkout");
            copy_dir(self.base_tree.as_deref().unwrap_or(repo), dest)?;
            Ok(())
        }

        async fn remove_checkout(&self, _repo: &Path, dest: &Path) -> Result<(), CommandError> {
            self.record("remove_checkout");
            std::fs::remove_dir_all(dest)?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_no_skip_for_regular_commits() {
        assert!(upgrade_skip_reason("fix: bump provider\n\nfeat: add input\n").is_none());
        assert!(upgrade_skip_reason("").is_none());
    }

    #[test]
    fn test_skip_for_breaking_change() {
        let reason =
            upgrade_skip_reason("feat: new cluster layout\n\nBREAKING CHANGE: subnets renamed\n")
                .unwrap();
        assert!(reason.contains(BREAKING_CHANGE_MARKER));
    }

    #[test]
    fn test_unskip_marker_overrides() {
        assert!(upgrade_skip_reason(
            "feat: layout\n\nBREAKING CHANGE: renamed\n\nUNSKIP UPGRADE TEST\n"
        )
        .is_none());
    }

    #[tokio::test]
    async fn test_git_log_against_real_repository() {
        let repo = tempfile::tempdir().unwrap();
        let git = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .arg("-C")
                .arg(repo.path())
                .args(args)
                .env("GIT_AUTHOR_NAME", "t")
                .env("GIT_AUTHOR_EMAIL", "t@example.com")
                .env("GIT_COMMITTER_NAME", "t")
                .env("GIT_COMMITTER_EMAIL", "t@example.com")
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };

        git(&["init", "-q"]);
        git(&["commit", "-q", "--allow-empty", "-m", "chore: base"]);
        git(&["tag", "base"]);
        git(&[
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            "feat: rename\n\nBREAKING CHANGE: renamed",
        ]);

        let messages = GitCli
            .commit_messages_since(repo.path(), "base")
            .await
            .unwrap();

        assert!(messages.contains("BREAKING CHANGE: renamed"));
        assert!(!messages.contains("chore: base"));
        assert!(upgrade_skip_reason(&messages).is_some());
    }
}
