//! Workspace Manager: one exclusively-owned scratch directory per request
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ReflectError;

const WORKSPACE_PREFIX: &str = "hwreflect-";
const LOGS_DIR: &str = "logs";

/// Scoped scratch directory. Removed by [`Workspace::release`] or, on any
/// other exit path (early return, panic unwind), by `Drop`. Removal happens
/// exactly once.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    id: Uuid,
    released: bool,
}

impl Workspace {
    /// Creates `<parent>/hwreflect-<uuid>`. The leaf is created with
    /// `create_dir`, so an existing directory is an error rather than a
    /// shared workspace.
    pub fn acquire(parent: &Path) -> Result<Self, ReflectError> {
        fs::create_dir_all(parent).map_err(|e| {
            ReflectError::Workspace(format!("cannot prepare {}: {}", parent.display(), e))
        })?;

        let id = Uuid::new_v4();
        let path = parent.join(format!("{}{}", WORKSPACE_PREFIX, id.simple()));
        fs::create_dir(&path).map_err(|e| {
            ReflectError::Workspace(format!("cannot create {}: {}", path.display(), e))
        })?;

        let workspace = Self {
            path,
            id,
            released: false,
        };
        // from here on Drop cleans up if the logs dir cannot be made
        fs::create_dir(workspace.logs_dir()).map_err(|e| {
            ReflectError::Workspace(format!("cannot create logs dir: {}", e))
        })?;

        tracing::debug!(workspace = %workspace.path.display(), "workspace acquired");
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Short per-request token for qualifying generated identifiers.
    pub fn suffix(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Where the invoker drops captured tool output.
    pub fn logs_dir(&self) -> PathBuf {
        self.path.join(LOGS_DIR)
    }

    /// Recursively deletes the workspace, reporting failures.
    pub fn release(mut self) -> Result<(), ReflectError> {
        self.released = true;
        let result = fs::remove_dir_all(&self.path).map_err(|e| {
            ReflectError::Workspace(format!("cannot remove {}: {}", self.path.display(), e))
        });
        tracing::debug!(workspace = %self.path.display(), ok = result.is_ok(), "workspace released");
        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!(workspace = %self.path.display(), error = %e, "workspace cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_acquire_creates_unique_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::acquire(root.path()).unwrap();
        let b = Workspace::acquire(root.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(a.logs_dir().is_dir());
        assert_eq!(a.suffix().len(), 8);
    }

    #[test]
    fn test_release_removes_tree() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path()).unwrap();
        let path = ws.path().to_path_buf();
        fs::create_dir_all(ws.join("src/main/scala")).unwrap();
        fs::write(ws.join("src/main/scala/A.scala"), "class A").unwrap();

        ws.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_tree() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::acquire(root.path()).unwrap();
            fs::write(ws.join("scratch.txt"), "x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_runs_on_panic() {
        let root = tempfile::tempdir().unwrap();
        let parent = root.path().to_path_buf();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_in = seen.clone();

        let outcome = std::panic::catch_unwind(move || {
            let ws = Workspace::acquire(&parent).unwrap();
            *seen_in.lock().unwrap() = Some(ws.path().to_path_buf());
            panic!("injected fault");
        });

        assert!(outcome.is_err());
        let path = seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_concurrent_acquire_never_overlaps() {
        let root = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let parent = root.path().to_path_buf();
                std::thread::spawn(move || {
                    let ws = Workspace::acquire(&parent).unwrap();
                    let path = ws.path().to_path_buf();
                    std::mem::forget(ws);
                    path
                })
            })
            .collect();

        let paths: HashSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(paths.len(), 16);
    }
}
