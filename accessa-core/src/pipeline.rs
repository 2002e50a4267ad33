// ============================================================================
// accessa-core/src/pipeline.rs
// ============================================================================
//
// PIPELINE DRIVER: Access-Copy Creation Orchestration
//
// This module houses the per-source orchestration for the accessa-core
// library. It coordinates one job end to end: record lookup, probing, encode
// profile selection, the encode/validate/retry state machine, still-frame
// selection and derivation, artifact finalisation and the result hand-off.
//
// WORKFLOW (video sources):
// 1. Look up the media record and derive the destination directory
// 2. Probe the source into a descriptor
// 3. Guard against completed or concurrently running work
// 4. Select the encode profile from the descriptor
// 5. Encode; on failure or missing output retry once with the safe profile
// 6. Gate the output on the conformance policy
// 7. Choose a still offset avoiding detected black intervals, grab the
//    frame and derive full-size/thumbnail JPEGs
// 8. Finalise artifact names and hand the result to the record updater
//
// Image sources skip 2-7 and go straight to derivative generation; audio
// and document sources pass through untouched.
//
// The driver is generic over the tool traits so it can be exercised without
// the external tools installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::asset::{classify, AssetKind};
use crate::config::AccessConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::ffmpeg::VideoEncoder;
use crate::external::mediaconch::{PolicyChecker, PolicyVerdict};
use crate::guard::{self, GuardDecision};
use crate::joblog::JobLog;
use crate::keyframe::{scan_black_intervals, OffsetStrategy};
use crate::probe::{SourceDescriptor, SourceProber};
use crate::profile::{safe_profile, select_profile, EncodeProfile};
use crate::records::{destination_subdir, MediaRecord, MediaRecords, ResultRecord};
use crate::stills::{
    derive_stills, grab_raw_frame, remove_raw_frame, DerivativeSpec, StillTools,
};

/// Lifecycle of one transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Probed,
    Encoding,
    EncodeFailed,
    Validating,
    ValidationFailed,
    ExtractingStill,
    Completed,
    Failed,
}

/// Mutable state of one job, created at entry and discarded after the
/// result hand-off. Only the driver mutates it.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub final_output: PathBuf,
    pub state: JobState,
    pub encode_retried: bool,
    pub still_retried: bool,
    pub error_detail: Option<String>,
}

impl TranscodeJob {
    fn new(source: &Path, output: PathBuf, final_output: PathBuf) -> Self {
        TranscodeJob {
            source: source.to_path_buf(),
            output,
            final_output,
            state: JobState::Probed,
            encode_retried: false,
            still_retried: false,
            error_detail: None,
        }
    }
}

/// How a job ended, for the caller to act on (archival move, exit code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// All artifacts produced and the record updated.
    Completed { result: ResultRecord },
    /// Prior run already produced the artifacts; only the archival move is
    /// left to do.
    AlreadyCompleted,
    /// Another process appears to own this source right now. Not an error.
    SkippedInProgress,
    /// Audio/document source: nothing to create, move it along.
    PassThrough(AssetKind),
    /// Extension not in the classification table; route to the error dir.
    Unrecognized,
}

/// Processes one source file through the pipeline.
///
/// Failures are local to the job: the error is handed to the record updater
/// as a failure result (best effort) and returned to the caller, which
/// leaves the source in place for the next scheduler pass.
#[allow(clippy::too_many_arguments)]
pub fn process_asset<PR, EN, PC, ST, RE>(
    prober: &PR,
    encoder: &EN,
    policy: &PC,
    stills: &ST,
    records: &RE,
    strategy: &dyn OffsetStrategy,
    config: &AccessConfig,
    source: &Path,
    joblog: &mut JobLog,
) -> CoreResult<JobOutcome>
where
    PR: SourceProber,
    EN: VideoEncoder,
    PC: PolicyChecker,
    ST: StillTools,
    RE: MediaRecords,
{
    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CoreError::Path(format!("unusable source name: {}", source.display())))?
        .to_string();
    let stem = source
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(&filename)
        .to_string();
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let Some(kind) = classify(extension) else {
        joblog.error(format!("File extension type not recognised: {filename}"));
        return Ok(JobOutcome::Unrecognized);
    };

    let record = records.lookup(&filename)?.ok_or_else(|| {
        CoreError::Record(format!("no media record for original filename '{filename}'"))
    })?;

    match kind {
        AssetKind::Audio | AssetKind::Document => {
            joblog.info(format!(
                "Item is {}. No actions required at this time.",
                match kind {
                    AssetKind::Audio => "an audio file",
                    _ => "a document",
                }
            ));
            Ok(JobOutcome::PassThrough(kind))
        }
        AssetKind::Video => {
            video_job(
                prober, encoder, policy, stills, records, strategy, config, source, &record,
                &stem, joblog,
            )
        }
        AssetKind::Image => image_job(stills, records, config, source, &record, &stem, joblog),
    }
}

/// Resolves and creates the destination directory for a record.
fn destination_dir(config: &AccessConfig, record: &MediaRecord) -> CoreResult<PathBuf> {
    let dest = config.transcode_root.join(destination_subdir(record)?);
    if !dest.is_dir() {
        std::fs::create_dir_all(&dest)?;
    }
    Ok(dest)
}

/// Hands a failure result to the record updater before surfacing the error.
/// The update itself is best effort; a record store outage must not mask
/// the original failure.
fn fail_job<RE: MediaRecords>(
    records: &RE,
    record: &MediaRecord,
    joblog: &mut JobLog,
    err: CoreError,
) -> CoreError {
    let result = ResultRecord::failure(err.to_string());
    if let Err(update_err) = records.update(&record.id, &result) {
        joblog.error(format!(
            "Problem writing failure result to media record {}: {update_err}",
            record.id
        ));
    }
    err
}

#[allow(clippy::too_many_arguments)]
fn video_job<PR, EN, PC, ST, RE>(
    prober: &PR,
    encoder: &EN,
    policy: &PC,
    stills: &ST,
    records: &RE,
    strategy: &dyn OffsetStrategy,
    config: &AccessConfig,
    source: &Path,
    record: &MediaRecord,
    stem: &str,
    joblog: &mut JobLog,
) -> CoreResult<JobOutcome>
where
    PR: SourceProber,
    EN: VideoEncoder,
    PC: PolicyChecker,
    ST: StillTools,
    RE: MediaRecords,
{
    joblog.info("Item is video. Checking DAR, height and duration of source.");

    let descriptor = prober.probe(source)?;
    joblog.info(format!(
        "Data retrieved: audio {}, DAR '{}', PAR '{}', height {}, width {}, duration {} secs",
        descriptor.has_audio,
        descriptor.display_aspect_ratio,
        descriptor.pixel_aspect_ratio,
        descriptor.height,
        descriptor.width,
        descriptor.duration_seconds,
    ));

    let dest_dir = destination_dir(config, record)?;
    let final_output = dest_dir.join(stem);
    let intermediate = dest_dir.join(format!("{stem}.mp4"));
    joblog.info(format!("MP4 destination will be: {}", final_output.display()));

    if record.has_all_renditions(stem) {
        joblog.info("Media record already carries rendition markers. Checking for artifacts.");
    }
    let lease = Duration::from_secs(config.stale_lease_hours * 60 * 60);
    match guard::inspect(&final_output, &intermediate, lease)? {
        GuardDecision::AlreadyCompleted => {
            joblog.info("Transcode artifacts already exist. Nothing to create.");
            return Ok(JobOutcome::AlreadyCompleted);
        }
        GuardDecision::InProgressElsewhere => {
            joblog.info("File is being processed concurrently. Skipping.");
            return Ok(JobOutcome::SkippedInProgress);
        }
        GuardDecision::Proceed => {}
    }
    if record.has_all_renditions(stem) {
        joblog.warn("Rendition markers exist but no artifacts on disk. Allowing file to proceed.");
    }
    let lock_path = dest_dir.join(format!("{stem}.mp4.lock"));
    let Some(_claim) = guard::claim(&lock_path, lease)? else {
        joblog.info("Output path claimed by a concurrent worker. Skipping.");
        return Ok(JobOutcome::SkippedInProgress);
    };

    let mut job = TranscodeJob::new(source, intermediate.clone(), final_output.clone());

    let profile = match select_profile(&descriptor) {
        Ok(profile) => profile,
        Err(err) => {
            job.state = JobState::Failed;
            joblog.error(format!("Failed to choose encode recipe: {err}"));
            return Err(fail_job(records, record, joblog, err));
        }
    };
    joblog.info(format!("Encode recipe chosen: {profile}"));

    job.state = JobState::Encoding;
    let diagnostics = match run_with_retry(
        encoder,
        source,
        &intermediate,
        &profile,
        &descriptor,
        &mut job,
        joblog,
    ) {
        Ok(diagnostics) => diagnostics,
        Err(err) => {
            joblog.error(format!("Encode failed twice, giving up: {err}"));
            return Err(fail_job(records, record, joblog, err));
        }
    };

    job.state = JobState::Validating;
    match policy.check(&intermediate) {
        Ok(PolicyVerdict::Pass) => {
            joblog.info("Conformance policy pass. Beginning still image generation.");
        }
        Ok(PolicyVerdict::Fail(report)) => {
            job.state = JobState::ValidationFailed;
            job.error_detail = Some(report.clone());
            joblog.warn(format!("Output failed policy check: {report}"));
            joblog.info("Deleting encoded output and leaving source for a repeat attempt.");
            std::fs::remove_file(&intermediate)?;
            return Err(fail_job(
                records,
                record,
                joblog,
                CoreError::ValidationFailed(report),
            ));
        }
        Err(err) => {
            return Err(fail_job(records, record, joblog, err));
        }
    }

    job.state = JobState::ExtractingStill;
    let intervals = scan_black_intervals(&diagnostics);
    if !intervals.is_empty() {
        joblog.info(format!("Detected black intervals: {intervals:?}"));
    }
    let offset = strategy.choose(descriptor.duration_seconds, &intervals);
    joblog.info(format!("Still frame offset: {offset} secs"));

    let raw_frame = dest_dir.join(format!("{stem}.jpg"));
    let used_offset = match grab_raw_frame(stills, &intermediate, offset, &raw_frame) {
        Ok(used) => used,
        Err(err) => {
            joblog.error(format!("Failed to create still from encoded file: {err}"));
            return Err(fail_job(records, record, joblog, err));
        }
    };
    if used_offset != offset {
        job.still_retried = true;
        joblog.warn(format!("Still frame grabbed on retry at {used_offset} secs"));
    }

    let asset_set = match derive_stills(stills, &raw_frame, &dest_dir, stem, DerivativeSpec::FullSize)
    {
        Ok(set) => set,
        Err(err) => {
            // Encoded MP4 and raw frame stay on disk for inspection.
            joblog.error(format!("Still derivation incomplete: {err}"));
            return Err(fail_job(records, record, joblog, err));
        }
    };
    remove_raw_frame(&asset_set)?;
    joblog.info(format!(
        "New images created at {used_offset} secs into video:\n - {}\n - {}",
        asset_set.full_size.display(),
        asset_set.thumbnail.display(),
    ));

    // Finalise artifact names: strip extensions so the names double as
    // rendition identifiers.
    std::fs::rename(&intermediate, &final_output)?;
    let full_final = finalize_name(&asset_set.full_size)?;
    let thumb_final = finalize_name(&asset_set.thumbnail)?;

    let result = ResultRecord {
        access_mp4: file_name_string(&final_output),
        largeimage: file_name_string(&full_final),
        thumbnail: file_name_string(&thumb_final),
        success: true,
        error_detail: None,
    };
    joblog.info(format!("Writing rendition data to media record: {}", record.id));
    records.update(&record.id, &result)?;
    joblog.info("Rendition data updated on media record.");

    job.state = JobState::Completed;
    log::debug!("Job for {} finished in state {:?}", job.source.display(), job.state);
    Ok(JobOutcome::Completed { result })
}

/// Runs the encode with its one-shot safe-profile retry.
///
/// A first attempt counts as failed when the tool errors *or* when it
/// reports success without leaving an output file behind. Either way the
/// retry drops every geometric filter. A second miss is terminal.
fn run_with_retry<EN: VideoEncoder>(
    encoder: &EN,
    source: &Path,
    output: &Path,
    profile: &EncodeProfile,
    descriptor: &SourceDescriptor,
    job: &mut TranscodeJob,
    joblog: &mut JobLog,
) -> CoreResult<Vec<String>> {
    match encoder.encode(source, output, profile) {
        Ok(outcome) if output.is_file() => return Ok(outcome.diagnostics),
        Ok(_) => {
            joblog.warn("Encode reported success but produced no output. Retrying without video filters.");
        }
        Err(err) => {
            joblog.warn(format!(
                "Encode failed first pass. Retrying without video filters: {err}"
            ));
        }
    }

    job.encode_retried = true;
    let fallback = safe_profile(descriptor);
    let terminal = match encoder.encode(source, output, &fallback) {
        Ok(outcome) if output.is_file() => return Ok(outcome.diagnostics),
        Ok(_) => CoreError::EncodeFailed(format!(
            "retry produced no output at {}",
            output.display()
        )),
        Err(err) => CoreError::EncodeFailed(err.to_string()),
    };

    job.state = JobState::EncodeFailed;
    // Release the claimed output path so the next scheduler pass is not
    // held up behind the stale lease.
    if output.exists() {
        let _ = std::fs::remove_file(output);
    }
    Err(terminal)
}

fn image_job<ST, RE>(
    stills: &ST,
    records: &RE,
    config: &AccessConfig,
    source: &Path,
    record: &MediaRecord,
    stem: &str,
    joblog: &mut JobLog,
) -> CoreResult<JobOutcome>
where
    ST: StillTools,
    RE: MediaRecords,
{
    joblog.info("Item is image. Generating full size and thumbnail JPEG images.");

    let dest_dir = destination_dir(config, record)?;
    let size = std::fs::metadata(source)?.len();
    let full_spec = match crate::stills::oversize_percent(size) {
        Some(percent) => {
            joblog.info(format!(
                "Image is oversized ({size} bytes). Applying {percent}% resize to full-size image."
            ));
            DerivativeSpec::Oversize { percent }
        }
        None => DerivativeSpec::FullSize,
    };

    // The source itself is the frame here; it is never removed.
    let asset_set = match derive_stills(stills, source, &dest_dir, stem, full_spec) {
        Ok(set) => set,
        Err(err) => {
            joblog.error(format!("One or both JPEG creations failed: {err}"));
            return Err(fail_job(records, record, joblog, err));
        }
    };

    let full_final = finalize_name(&asset_set.full_size)?;
    let thumb_final = finalize_name(&asset_set.thumbnail)?;
    joblog.info(format!(
        "New images created:\n - {}\n - {}",
        full_final.display(),
        thumb_final.display(),
    ));

    let result = ResultRecord {
        access_mp4: None,
        largeimage: file_name_string(&full_final),
        thumbnail: file_name_string(&thumb_final),
        success: true,
        error_detail: None,
    };
    joblog.info(format!("Writing rendition data to media record: {}", record.id));
    records.update(&record.id, &result)?;

    Ok(JobOutcome::Completed { result })
}

/// Strips the extension from a finished artifact and renames it on disk.
fn finalize_name(path: &Path) -> CoreResult<PathBuf> {
    let finalized = path.with_extension("");
    std::fs::rename(path, &finalized)?;
    Ok(finalized)
}

fn file_name_string(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
