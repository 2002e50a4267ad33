//! Configuration structure and constants for the accessa-core library.
//!
//! Jobs run as independent processes launched by an external scheduler, so
//! configuration is assembled once by the consumer (accessa-cli) and passed
//! into the pipeline by reference.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// How old a leftover intermediate output must be before another process
/// treats it as abandoned and deletes it. Advisory only; see the job guard.
pub const DEFAULT_STALE_LEASE_HOURS: u64 = 5;

/// Directory name, relative to the source file's parent's parent, that
/// finished sources are moved into.
pub const COMPLETED_DIR_NAME: &str = "completed";

/// Directory name sources with unrecognised extensions are moved into.
pub const ERROR_DIR_NAME: &str = "error";

/// Main configuration for a single pipeline run.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Root directory the access copies are written beneath. Destination
    /// subdirectories (supplier slug, year-month) are derived per job.
    pub transcode_root: PathBuf,

    /// MediaConch policy file the encoded output must pass.
    pub policy_path: PathBuf,

    /// Lease timeout for leftover intermediate outputs, in hours.
    pub stale_lease_hours: u64,
}

impl AccessConfig {
    pub fn new(transcode_root: PathBuf, policy_path: PathBuf) -> Self {
        AccessConfig {
            transcode_root,
            policy_path,
            stale_lease_hours: DEFAULT_STALE_LEASE_HOURS,
        }
    }

    /// Checks that the configured paths exist before any work starts.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.transcode_root.is_dir() {
            return Err(CoreError::Config(format!(
                "transcode root is not a directory: {}",
                self.transcode_root.display()
            )));
        }
        if !self.policy_path.is_file() {
            return Err(CoreError::Config(format!(
                "policy file not found: {}",
                self.policy_path.display()
            )));
        }
        if self.stale_lease_hours == 0 {
            return Err(CoreError::Config(
                "stale lease must be at least one hour".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads the scheduler control document and reports whether the named task
/// is currently permitted to run. The document is a flat JSON object mapping
/// task names to booleans; a missing key counts as permitted so new tasks do
/// not need a control entry before first use.
pub fn run_permitted(control_path: &Path, task: &str) -> CoreResult<bool> {
    let raw = std::fs::read_to_string(control_path)?;
    let doc: HashMap<String, bool> = serde_json::from_str(&raw)
        .map_err(|e| CoreError::JsonParse(format!("control document: {e}")))?;
    Ok(*doc.get(task).unwrap_or(&true))
}
