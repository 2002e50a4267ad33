// ============================================================================
// accessa-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// This module encapsulates interactions with the external command-line tools
// the pipeline drives: mediainfo and ffprobe for source inspection, ffmpeg
// for encoding and frame grabs, mediaconch for the conformance policy gate
// and GraphicsMagick for still derivatives.
//
// Each tool behind a decision point in the pipeline is fronted by a trait
// (declared next to the component that consumes it) so the pipeline driver
// can be exercised in tests without the tools installed; the concrete
// implementations here are the production defaults.

use std::io;
use std::process::{Command, Stdio};

use crate::error::{CoreError, CoreResult};

/// Contains ffmpeg argument building and the encode/frame-grab executors
pub mod ffmpeg;

/// Contains ffprobe audio-stream inspection
pub mod ffprobe;

/// Contains GraphicsMagick still-derivative execution
pub mod gm;

/// Contains the mediaconch policy gate
pub mod mediaconch;

/// Contains mediainfo field queries
pub mod mediainfo;

/// Checks if a required external command is available and executable.
///
/// Runs the command with a version argument and discards all output; only
/// the ability to start matters. Used at process startup so a missing tool
/// fails the run before any file is touched.
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let version_arg = if cmd_name == "gm" { "version" } else { "-version" };

    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                log::warn!("Dependency '{}' not found.", cmd_name);
                Err(CoreError::DependencyNotFound(cmd_name.to_string()))
            } else {
                log::error!("Failed to start dependency check for '{}': {}", cmd_name, e);
                Err(CoreError::CommandStart(cmd_name.to_string(), e))
            }
        }
    }
}
