//! MediaInfo field queries for source inspection.
//!
//! Each descriptor field is fetched with a fixed `--Output` template rather
//! than a single JSON dump: unit-suffixed and multi-track values come back as
//! raw text and the probe module owns the normalization rules.

use std::path::Path;
use std::process::Command;

use crate::error::{command_failed_error, command_start_error, CoreResult};

/// Runs a single mediainfo template query, e.g. `Video`/`Height`, returning
/// the raw text with the trailing newline removed.
pub fn query(section: &str, field: &str, path: &Path) -> CoreResult<String> {
    log::debug!(
        "Running mediainfo for {section};{field} on: {}",
        path.display()
    );

    let output = Command::new("mediainfo")
        .arg("--Full")
        .arg("--Language=raw")
        .arg(format!("--Output={section};%{field}%"))
        .arg(path)
        .output()
        .map_err(|e| command_start_error("mediainfo", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(command_failed_error(
            format!("mediainfo ({section};{field})"),
            output.status,
            stderr,
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}
