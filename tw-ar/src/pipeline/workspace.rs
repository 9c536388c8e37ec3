//! Session-scoped scratch workspace
//!
//! Scoped acquisition: create the directory up front, hold it for the
//! pipeline's lifetime, and remove it in `Drop` so every exit path —
//! success, failure, panic unwinding — releases the scratch space. Removal
//! failures are swallowed; a leftover scratch directory must never fail a
//! render.

use std::path::{Path, PathBuf};

/// Ephemeral scratch directory holding one session's intermediate artifacts
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create `{scratch_root}/{session_id}` and claim it for this pipeline run
    pub fn create(scratch_root: &Path, session_id: &str) -> std::io::Result<Self> {
        let root = scratch_root.join(session_id);
        if root.exists() {
            // Concurrent renders of the same session are not serialized;
            // colliding on the workspace path is an accepted limitation.
            tracing::warn!(
                path = %root.display(),
                "Workspace directory already exists; another render for this session may be in flight"
            );
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file inside the workspace
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            tracing::debug!(
                path = %self.root.display(),
                error = %e,
                "Workspace cleanup failed"
            );
        }
    }
}
