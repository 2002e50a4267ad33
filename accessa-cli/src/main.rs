// accessa-cli/src/main.rs
//
// Per-file worker binary for the Accessa pipeline. An external scheduler
// (cron / parallel) launches one process per source file.
//
// Responsibilities:
// - Parsing command-line arguments and environment configuration.
// - Honouring the scheduler control document (paused tasks exit cleanly).
// - Checking the external tool dependencies before touching the source.
// - Invoking the core pipeline (`accessa_core::process_asset`).
// - Performing the archival move of the source on success/pass-through and
//   the error-directory move for unrecognised files.
// - Mapping outcomes and failures onto process exit codes for the
//   scheduler: 0 for done/skip, non-zero for failures left for a later
//   pass.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use accessa_core::config::{
    run_permitted, AccessConfig, COMPLETED_DIR_NAME, DEFAULT_STALE_LEASE_HOURS, ERROR_DIR_NAME,
};
use accessa_core::external::check_dependency;
use accessa_core::external::ffmpeg::SidecarEncoder;
use accessa_core::external::mediaconch::MediaconchChecker;
use accessa_core::joblog::JobLog;
use accessa_core::keyframe::BlackspaceAvoidance;
use accessa_core::pipeline::{process_asset, JobOutcome};
use accessa_core::probe::MediaInfoProber;
use accessa_core::records::JsonFileRecords;
use accessa_core::stills::SystemStillTools;
use accessa_core::{AssetKind, CoreResult};

mod logging;

/// Name this worker checks in the scheduler control document.
const CONTROL_TASK: &str = "access_copy_creation";

/// External tools the pipeline shells out to.
const DEPENDENCIES: &[&str] = &["ffmpeg", "ffprobe", "mediainfo", "mediaconch", "gm"];

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Accessa: archival access-copy creation",
    long_about = "Creates access renditions (MP4 proxy plus full-size and thumbnail JPEGs) \
for one preservation source file, validates them against a conformance policy and hands \
the result to the media record store. Launched once per file by an external scheduler."
)]
struct Cli {
    /// Source media file to process
    #[arg(required = true, value_name = "SOURCE_PATH")]
    source_path: PathBuf,

    /// Root directory the access copies are written beneath
    #[arg(long, env = "TRANSCODING", value_name = "DIR")]
    transcode_root: PathBuf,

    /// MediaConch policy file for the MP4 gate
    #[arg(long, env = "MP4_POLICY", value_name = "FILE")]
    policy: PathBuf,

    /// Directory of staged media record documents
    #[arg(long, env = "RECORDS_DIR", value_name = "DIR")]
    records_dir: PathBuf,

    /// Optional directory for log files
    #[arg(long, env = "LOG_PATH", value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Scheduler control document; the run exits cleanly when this task is
    /// paused in it
    #[arg(long, env = "CONTROL_JSON", value_name = "FILE")]
    control_file: Option<PathBuf>,

    /// Hours before a leftover intermediate output counts as abandoned
    #[arg(long, default_value_t = DEFAULT_STALE_LEASE_HOURS, value_name = "HOURS")]
    stale_lease_hours: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::setup(cli.log_dir.as_deref(), cli.verbose) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CoreResult<ExitCode> {
    // Scheduler kill switch: a paused task is a clean no-op, the scheduler
    // will offer the file again on a later pass.
    if let Some(control) = &cli.control_file {
        if !run_permitted(control, CONTROL_TASK)? {
            log::info!("Run prevented by control document. Exiting.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    for dependency in DEPENDENCIES {
        check_dependency(dependency)?;
    }

    let mut config = AccessConfig::new(cli.transcode_root, cli.policy);
    config.stale_lease_hours = cli.stale_lease_hours;
    config.validate()?;

    let source = &cli.source_path;
    if !source.is_file() {
        log::info!(
            "Supplied path is not a file, possibly claimed by another worker: {}",
            source.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());

    let records = JsonFileRecords::new(cli.records_dir);
    let mut joblog = JobLog::new(filename);

    let outcome = process_asset(
        &MediaInfoProber,
        &SidecarEncoder,
        &MediaconchChecker::new(config.policy_path.clone()),
        &SystemStillTools,
        &records,
        &BlackspaceAvoidance,
        &config,
        source,
        &mut joblog,
    );

    let code = match outcome {
        Ok(JobOutcome::Completed { .. }) => {
            joblog.info("All renditions created. Moving source to completed folder.");
            archive_move(source, COMPLETED_DIR_NAME, &mut joblog);
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::AlreadyCompleted) => {
            joblog.info("Source already processed. Moving source to completed folder.");
            archive_move(source, COMPLETED_DIR_NAME, &mut joblog);
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::PassThrough(kind)) => {
            let label = match kind {
                AssetKind::Audio => "audio",
                _ => "document",
            };
            joblog.info(format!(
                "Item is {label}; moving source to completed folder untouched."
            ));
            archive_move(source, COMPLETED_DIR_NAME, &mut joblog);
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::SkippedInProgress) => {
            joblog.info("Source owned by a concurrent worker. Nothing to do.");
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::Unrecognized) => {
            joblog.error("Unrecognised file type. Moving source to error folder.");
            archive_move(source, ERROR_DIR_NAME, &mut joblog);
            ExitCode::FAILURE
        }
        Err(e) => {
            joblog.error(format!(
                "Job failed, source left in place for the next pass: {e}"
            ));
            ExitCode::FAILURE
        }
    };

    joblog.flush();
    Ok(code)
}

/// Moves the source into a holding directory two levels up (sibling of the
/// ingest folder), creating it if needed. A failed move is logged but never
/// turns a finished job into a failure.
fn archive_move(source: &Path, dir_name: &str, joblog: &mut JobLog) {
    let Some(file_name) = source.file_name() else {
        joblog.error(format!("Cannot derive file name from {}", source.display()));
        return;
    };
    let base = source
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let holding = base.join(dir_name);
    let target = holding.join(file_name);

    let result = std::fs::create_dir_all(&holding).and_then(|_| move_file(source, &target));
    match result {
        Ok(()) => joblog.info(format!("Moved source to {}", target.display())),
        Err(e) => joblog.error(format!(
            "Move to {} failed, source left in place: {e}",
            target.display()
        )),
    }
}

/// Rename with a copy-and-delete fallback for cross-device destinations.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn move_file_falls_back_to_copy() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, "payload").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "payload");
    }
}
