//! Per-run working copies of the module.
//!
//! Scenarios that share an example directory run in parallel, so each run
//! gets its own copy of the module with its own local state. Copies are
//! removed on drop unless kept (teardown skipped, state left for debugging).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directories never copied into a working copy.
const SKIPPED_DIRS: &[&str] = &[".git", ".terraform", "target", "node_modules"];

/// File suffixes never copied into a working copy.
const SKIPPED_SUFFIXES: &[&str] = &[".tfstate", ".tfstate.backup", ".tfplan"];

/// Temporary directory owned by one run.
#[derive(Debug)]
pub struct WorkingCopy {
    root: PathBuf,
    keep: bool,
}

impl WorkingCopy {
    /// Create an empty working directory.
    pub fn empty(label: &str) -> io::Result<Self> {
        let root = std::env::temp_dir().join(format!(
            "iks-harness-{label}-{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&root)?;
        Ok(Self { root, keep: false })
    }

    /// Create a working directory holding a copy of `source`.
    pub fn copy_of(source: &Path, label: &str) -> io::Result<Self> {
        let copy = Self::empty(label)?;
        copy_dir(source, &copy.root)?;
        Ok(copy)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Leave the directory on disk when dropped.
    pub fn keep(&mut self) {
        if !self.keep {
            info!(
                target: "testhelper.workspace",
                path = %self.root.display(),
                "Keeping working copy"
            );
        }
        self.keep = true;
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            warn!(
                target: "testhelper.workspace",
                path = %self.root.display(),
                error = %e,
                "Failed to remove working copy"
            );
        }
    }
}

fn skipped(name: &str, is_dir: bool) -> bool {
    if is_dir {
        SKIPPED_DIRS.contains(&name)
    } else {
        SKIPPED_SUFFIXES.iter().any(|s| name.ends_with(s))
    }
}

/// Recursively copy `src` into `dst`, leaving out VCS data, provider caches,
/// build output and Terraform state.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let target = dst.join(&name);

        if skipped(&name_str, file_type.is_dir()) {
            continue;
        }

        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        copy_dir(src, dst)
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn module_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("examples/basic")).unwrap();
        fs::create_dir_all(root.join("examples/basic/.terraform/providers")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("tests/target/debug")).unwrap();
        fs::write(root.join("main.tf"), "variable \"prefix\" {}").unwrap();
        fs::write(root.join("examples/basic/main.tf"), "module \"iks\" { source = \"../..\" }").unwrap();
        fs::write(root.join("examples/basic/terraform.tfstate"), "{}").unwrap();
        fs::write(root.join("examples/basic/.terraform.lock.hcl"), "# lock").unwrap();
        dir
    }

    #[test]
    fn test_copy_skips_state_and_caches() {
        let module = module_fixture();
        let copy = WorkingCopy::copy_of(module.path(), "unit").unwrap();
        let root = copy.path();

        assert!(root.join("main.tf").is_file());
        assert!(root.join("examples/basic/main.tf").is_file());
        assert!(root.join("examples/basic/.terraform.lock.hcl").is_file());
        assert!(!root.join("examples/basic/terraform.tfstate").exists());
        assert!(!root.join("examples/basic/.terraform").exists());
        assert!(!root.join(".git").exists());
        assert!(!root.join("tests/target").exists());
        assert!(root.join("tests").is_dir());
    }

    #[test]
    fn test_drop_removes_copy() {
        let copy = WorkingCopy::empty("drop").unwrap();
        let path = copy.path().to_path_buf();
        assert!(path.is_dir());

        drop(copy);
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_retains_copy() {
        let mut copy = WorkingCopy::empty("keep").unwrap();
        copy.keep();
        let path = copy.path().to_path_buf();

        drop(copy);
        assert!(path.is_dir());
        fs::remove_dir_all(path).unwrap();
    }
}
