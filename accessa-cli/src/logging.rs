// ============================================================================
// accessa-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: File and Console Logging for the Worker Binary
//
// Log lines go to stderr and, when a log directory is configured, to a
// shared append-only log file. Jobs buffer their own lines and flush them
// in one block (see accessa_core::joblog), so concurrent workers appending
// to the same file do not interleave mid-job.

use std::path::Path;

/// Name of the shared log file inside the configured log directory.
const LOG_FILE_NAME: &str = "access_copy_creation.log";

/// Returns the current local timestamp formatted for log lines.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Initialises the logging backend. Verbosity: 0 = info, 1 = debug,
/// 2+ = trace.
pub fn setup(log_dir: Option<&Path>, verbose: u8) -> Result<(), fern::InitError> {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}\t{}\t{}",
                timestamp(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        dispatch = dispatch.chain(fern::log_file(dir.join(LOG_FILE_NAME))?);
    }

    dispatch.apply()?;
    Ok(())
}
