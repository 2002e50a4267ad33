//! MediaConch conformance policy gate.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{command_failed_error, command_start_error, CoreResult};

/// Outcome of a policy check. A failure carries the checker's report for
/// the job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Pass,
    Fail(String),
}

/// Something that can pass judgement on an encoded output file.
pub trait PolicyChecker {
    fn check(&self, path: &Path) -> CoreResult<PolicyVerdict>;
}

/// Production checker shelling out to mediaconch with a fixed policy file.
#[derive(Debug, Clone)]
pub struct MediaconchChecker {
    policy: PathBuf,
}

impl MediaconchChecker {
    pub fn new(policy: PathBuf) -> Self {
        MediaconchChecker { policy }
    }
}

impl PolicyChecker for MediaconchChecker {
    fn check(&self, path: &Path) -> CoreResult<PolicyVerdict> {
        log::debug!(
            "Running mediaconch policy {} on: {}",
            self.policy.display(),
            path.display()
        );

        let output = Command::new("mediaconch")
            .arg("--force")
            .arg("-p")
            .arg(&self.policy)
            .arg(path)
            .output()
            .map_err(|e| command_start_error("mediaconch", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(command_failed_error("mediaconch", output.status, stderr));
        }

        let report = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(verdict_from_report(&report, path))
    }
}

/// The checker prints one line per file; a conforming file's line starts
/// with `pass!` followed by the path it checked.
fn verdict_from_report(report: &str, path: &Path) -> PolicyVerdict {
    let expected = format!("pass! {}", path.display());
    if report.starts_with(&expected) {
        PolicyVerdict::Pass
    } else {
        PolicyVerdict::Fail(report.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_line_must_name_the_checked_file() {
        let path = Path::new("/transcode/bfi/202405/N_123.mp4");
        assert_eq!(
            verdict_from_report("pass! /transcode/bfi/202405/N_123.mp4\n", path),
            PolicyVerdict::Pass
        );
        assert!(matches!(
            verdict_from_report("pass! /transcode/bfi/202405/other.mp4\n", path),
            PolicyVerdict::Fail(_)
        ));
        assert!(matches!(
            verdict_from_report("fail! /transcode/bfi/202405/N_123.mp4 -- General#Format\n", path),
            PolicyVerdict::Fail(_)
        ));
    }
}
