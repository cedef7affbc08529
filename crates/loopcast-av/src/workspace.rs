//! Workspace for a packaged asset.
//!
//! A [`Workspace`] is a temporary directory that holds the output of one
//! packaging run. It is exclusively owned by one session and removed when
//! closed or dropped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::options::OutputTarget;

const ASSET_FILE: &str = "asset.ts";
const SEGMENT_DIR: &str = "segments";

/// Temporary directory holding one packaged asset.
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `parent`, creating `parent` if needed.
    pub fn create_in(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Workspace(format!(
                "failed to create work dir {}: {e}",
                parent.display()
            ))
        })?;

        let temp_dir = tempfile::Builder::new()
            .prefix("loopcast-")
            .tempdir_in(parent)
            .map_err(|e| Error::Workspace(format!("failed to create temp dir: {e}")))?;

        Ok(Self { temp_dir })
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Location of the single packaged file.
    pub fn asset_file(&self) -> PathBuf {
        self.temp_dir.path().join(ASSET_FILE)
    }

    /// Directory receiving pre-split segment files.
    pub fn segment_dir(&self) -> PathBuf {
        self.temp_dir.path().join(SEGMENT_DIR)
    }

    /// Output target for this workspace: pre-split when `split` is given,
    /// a single file otherwise.
    pub fn output_target(&self, split: Option<Duration>) -> OutputTarget {
        match split {
            Some(segment_duration) => OutputTarget::Segments {
                dir: self.segment_dir(),
                segment_duration,
            },
            None => OutputTarget::File(self.asset_file()),
        }
    }

    /// Delete the workspace and everything in it.
    pub fn close(self) -> Result<()> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir.close().map_err(|e| {
            Error::Workspace(format!("failed to remove {}: {e}", path.display()))
        })
    }
}
