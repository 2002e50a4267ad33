//! End-to-end pipeline tests with the external tools mocked out.
//!
//! The mocks write real files into a temporary destination so the driver's
//! existence checks, renames and cleanup invariants are exercised against
//! an actual filesystem.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use accessa_core::config::AccessConfig;
use accessa_core::error::{CoreError, CoreResult};
use accessa_core::external::ffmpeg::{EncodeOutcome, VideoEncoder};
use accessa_core::external::mediaconch::{PolicyChecker, PolicyVerdict};
use accessa_core::joblog::JobLog;
use accessa_core::keyframe::BlackspaceAvoidance;
use accessa_core::pipeline::{process_asset, JobOutcome};
use accessa_core::probe::{SourceDescriptor, SourceProber};
use accessa_core::profile::EncodeProfile;
use accessa_core::records::{MediaRecord, MediaRecords, ResultRecord};
use accessa_core::stills::{DerivativeSpec, StillTools};

// ---- Mock tooling --------------------------------------------------------

struct MockProber {
    descriptor: SourceDescriptor,
}

impl SourceProber for MockProber {
    fn probe(&self, _path: &Path) -> CoreResult<SourceDescriptor> {
        Ok(self.descriptor.clone())
    }
}

/// Scripted behaviour for one encode attempt.
#[derive(Debug, Clone)]
enum EncodeStep {
    /// Write the output file and return the given diagnostics.
    Succeed(Vec<String>),
    /// Return Ok without writing any output file.
    SucceedWithoutOutput,
    /// Return a tool error.
    FailTool,
}

struct MockEncoder {
    script: RefCell<VecDeque<EncodeStep>>,
    /// Filter chains of the attempts actually made.
    chains: RefCell<Vec<String>>,
}

impl MockEncoder {
    fn scripted(steps: Vec<EncodeStep>) -> Self {
        MockEncoder {
            script: RefCell::new(steps.into()),
            chains: RefCell::new(Vec::new()),
        }
    }
}

impl VideoEncoder for MockEncoder {
    fn encode(
        &self,
        _source: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> CoreResult<EncodeOutcome> {
        self.chains.borrow_mut().push(profile.filter_chain());
        let step = self
            .script
            .borrow_mut()
            .pop_front()
            .expect("encoder called more often than scripted");
        match step {
            EncodeStep::Succeed(diagnostics) => {
                std::fs::write(output, "mp4 payload")?;
                Ok(EncodeOutcome { diagnostics })
            }
            EncodeStep::SucceedWithoutOutput => Ok(EncodeOutcome::default()),
            EncodeStep::FailTool => Err(CoreError::EncodeFailed("scripted tool error".into())),
        }
    }
}

struct MockPolicy {
    verdict: PolicyVerdict,
}

impl PolicyChecker for MockPolicy {
    fn check(&self, _path: &Path) -> CoreResult<PolicyVerdict> {
        Ok(self.verdict.clone())
    }
}

#[derive(Default)]
struct MockStills {
    grab_offsets: RefCell<Vec<u64>>,
    derive_specs: RefCell<Vec<(PathBuf, DerivativeSpec)>>,
    skip_thumbnail: bool,
}

impl StillTools for MockStills {
    fn grab_frame(&self, _video: &Path, seconds: u64, out: &Path) -> CoreResult<()> {
        self.grab_offsets.borrow_mut().push(seconds);
        std::fs::write(out, "jpeg frame")?;
        Ok(())
    }

    fn derive(&self, _source: &Path, dest: &Path, spec: &DerivativeSpec) -> CoreResult<()> {
        self.derive_specs
            .borrow_mut()
            .push((dest.to_path_buf(), *spec));
        if self.skip_thumbnail
            && dest
                .to_string_lossy()
                .contains("_thumbnail")
        {
            // Simulate a derivation that ran but produced nothing.
            return Ok(());
        }
        std::fs::write(dest, "jpeg derivative")?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryRecords {
    records: RefCell<HashMap<String, MediaRecord>>,
    updates: RefCell<Vec<(String, ResultRecord)>>,
}

impl MemoryRecords {
    fn with_record(filename: &str, record: MediaRecord) -> Self {
        let store = MemoryRecords::default();
        store
            .records
            .borrow_mut()
            .insert(filename.to_string(), record);
        store
    }
}

impl MediaRecords for MemoryRecords {
    fn lookup(&self, original_filename: &str) -> CoreResult<Option<MediaRecord>> {
        Ok(self.records.borrow().get(original_filename).cloned())
    }

    fn update(&self, record_id: &str, result: &ResultRecord) -> CoreResult<()> {
        self.updates
            .borrow_mut()
            .push((record_id.to_string(), result.clone()));
        Ok(())
    }
}

// ---- Fixtures ------------------------------------------------------------

struct Fixture {
    _root: tempfile::TempDir,
    config: AccessConfig,
    source: PathBuf,
    dest_dir: PathBuf,
}

fn fixture(filename: &str) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let transcode_root = root.path().join("transcode");
    std::fs::create_dir_all(&transcode_root).unwrap();
    let policy = root.path().join("mp4_policy.xml");
    std::fs::write(&policy, "<policy/>").unwrap();

    let ingest = root.path().join("autoingest");
    std::fs::create_dir_all(&ingest).unwrap();
    let source = ingest.join(filename);
    std::fs::write(&source, "preservation payload").unwrap();

    let dest_dir = transcode_root.join("bfi").join("202405");

    Fixture {
        config: AccessConfig::new(transcode_root, policy),
        source,
        dest_dir,
        _root: root,
    }
}

fn record() -> MediaRecord {
    MediaRecord {
        id: "118010".to_string(),
        input_date: "2024-05-14".to_string(),
        ..Default::default()
    }
}

fn pal_descriptor(source: &Path) -> SourceDescriptor {
    SourceDescriptor {
        path: source.to_path_buf(),
        extension: "mkv".to_string(),
        display_aspect_ratio: "16:9".to_string(),
        pixel_aspect_ratio: "1.422".to_string(),
        height: 576,
        width: 720,
        duration_seconds: 300,
        has_audio: true,
        audio_default_stream: None,
        video_stream_index: "0".to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    fx: &Fixture,
    prober: &MockProber,
    encoder: &MockEncoder,
    policy: &MockPolicy,
    stills: &MockStills,
    records: &MemoryRecords,
) -> CoreResult<JobOutcome> {
    let mut joblog = JobLog::new(fx.source.display().to_string());
    process_asset(
        prober,
        encoder,
        policy,
        stills,
        records,
        &BlackspaceAvoidance,
        &fx.config,
        &fx.source,
        &mut joblog,
    )
}

// ---- Tests ---------------------------------------------------------------

#[test]
fn successful_job_produces_finalised_artifacts() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let diagnostics = vec![
        "[blackdetect @ 0x1] black_start:69.9 black_end:79.5 black_duration:9.6".to_string(),
        "[blackdetect @ 0x1] black_start:139.2 black_end:149.0 black_duration:9.8".to_string(),
    ];
    let encoder = MockEncoder::scripted(vec![EncodeStep::Succeed(diagnostics)]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();

    let JobOutcome::Completed { result } = outcome else {
        panic!("expected completion");
    };
    assert!(result.success);
    assert_eq!(result.access_mp4.as_deref(), Some("N_123_01of01"));
    assert_eq!(
        result.largeimage.as_deref(),
        Some("N_123_01of01_largeimage")
    );
    assert_eq!(result.thumbnail.as_deref(), Some("N_123_01of01_thumbnail"));

    // Finalised names on disk, extension-less; intermediates gone.
    assert!(fx.dest_dir.join("N_123_01of01").is_file());
    assert!(fx.dest_dir.join("N_123_01of01_largeimage").is_file());
    assert!(fx.dest_dir.join("N_123_01of01_thumbnail").is_file());
    assert!(!fx.dest_dir.join("N_123_01of01.mp4").exists());
    assert!(!fx.dest_dir.join("N_123_01of01.jpg").exists());

    // Black intervals at [69,80] and [139,150] push the grab to 300/3.
    assert_eq!(*stills.grab_offsets.borrow(), vec![100]);

    let updates = stills.derive_specs.borrow();
    assert_eq!(updates.len(), 2);
    assert!(matches!(updates[0].1, DerivativeSpec::FullSize));
    assert!(matches!(updates[1].1, DerivativeSpec::Thumbnail));

    let recorded = records.updates.borrow();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, "118010");
    assert!(recorded[0].1.success);
}

#[test]
fn tool_failure_retries_once_with_the_safe_recipe() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![
        EncodeStep::FailTool,
        EncodeStep::Succeed(Vec::new()),
    ]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));

    let chains = encoder.chains.borrow();
    assert_eq!(chains.len(), 2);
    // First attempt carries the full recipe, the retry only deinterlaces.
    assert_eq!(chains[0], "yadif,crop=704:572:8:2,scale=1024:576:flags=lanczos");
    assert_eq!(chains[1], "yadif");
}

#[test]
fn missing_output_counts_as_a_failed_attempt() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![
        EncodeStep::SucceedWithoutOutput,
        EncodeStep::Succeed(Vec::new()),
    ]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));
    assert_eq!(encoder.chains.borrow().len(), 2);
}

#[test]
fn second_encode_failure_is_terminal_and_recorded() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder =
        MockEncoder::scripted(vec![EncodeStep::FailTool, EncodeStep::SucceedWithoutOutput]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let err = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap_err();
    assert!(matches!(err, CoreError::EncodeFailed(_)));
    assert_eq!(encoder.chains.borrow().len(), 2);
    // No third attempt, no stills work.
    assert!(stills.grab_offsets.borrow().is_empty());

    // The failure was handed to the record updater.
    let recorded = records.updates.borrow();
    assert_eq!(recorded.len(), 1);
    assert!(!recorded[0].1.success);
    assert!(recorded[0].1.error_detail.is_some());
}

#[test]
fn policy_failure_deletes_the_output_and_keeps_the_source() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![EncodeStep::Succeed(Vec::new())]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Fail("General#Format mismatch".to_string()),
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let err = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed(_)));

    // Output removed so the next scheduler pass starts clean; the source
    // stays where it was.
    assert!(!fx.dest_dir.join("N_123_01of01.mp4").exists());
    assert!(fx.source.is_file());
    assert!(stills.grab_offsets.borrow().is_empty());
}

#[test]
fn partial_still_derivation_keeps_frame_and_encode() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![EncodeStep::Succeed(Vec::new())]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills {
        skip_thumbnail: true,
        ..Default::default()
    };
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let err = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap_err();
    assert!(matches!(err, CoreError::StillExtractionFailed(_)));

    // The raw frame stays for inspection, the encode is retained (still
    // under its intermediate name) and nothing was finalised.
    assert!(fx.dest_dir.join("N_123_01of01.jpg").is_file());
    assert!(fx.dest_dir.join("N_123_01of01.mp4").is_file());
    assert!(!fx.dest_dir.join("N_123_01of01").exists());
    assert!(!fx.dest_dir.join("N_123_01of01_thumbnail").exists());
}

#[test]
fn fresh_intermediate_skips_without_error() {
    let fx = fixture("N_123_01of01.mkv");
    std::fs::create_dir_all(&fx.dest_dir).unwrap();
    std::fs::write(fx.dest_dir.join("N_123_01of01.mp4"), "other worker").unwrap();

    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert_eq!(outcome, JobOutcome::SkippedInProgress);
    assert!(encoder.chains.borrow().is_empty());
}

#[test]
fn finalised_output_reports_already_completed() {
    let fx = fixture("N_123_01of01.mkv");
    std::fs::create_dir_all(&fx.dest_dir).unwrap();
    std::fs::write(fx.dest_dir.join("N_123_01of01"), "previous run").unwrap();

    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.mkv", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert_eq!(outcome, JobOutcome::AlreadyCompleted);
}

#[test]
fn audio_sources_pass_through() {
    let fx = fixture("N_123_01of01.wav");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_123_01of01.wav", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert!(matches!(outcome, JobOutcome::PassThrough(_)));
    assert!(encoder.chains.borrow().is_empty());
    assert!(records.updates.borrow().is_empty());
}

#[test]
fn unknown_extension_is_flagged_for_the_error_dir() {
    let fx = fixture("N_123_01of01.exe");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::default();

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    assert_eq!(outcome, JobOutcome::Unrecognized);
}

#[test]
fn missing_media_record_aborts_the_job() {
    let fx = fixture("N_123_01of01.mkv");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::default();

    let err = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap_err();
    assert!(matches!(err, CoreError::Record(_)));
}

#[test]
fn image_sources_skip_the_encode_entirely() {
    let fx = fixture("N_456_01of01.tif");
    let prober = MockProber {
        descriptor: pal_descriptor(&fx.source),
    };
    let encoder = MockEncoder::scripted(vec![]);
    let policy = MockPolicy {
        verdict: PolicyVerdict::Pass,
    };
    let stills = MockStills::default();
    let records = MemoryRecords::with_record("N_456_01of01.tif", record());

    let outcome = run(&fx, &prober, &encoder, &policy, &stills, &records).unwrap();
    let JobOutcome::Completed { result } = outcome else {
        panic!("expected completion");
    };
    assert!(result.access_mp4.is_none());
    assert_eq!(
        result.largeimage.as_deref(),
        Some("N_456_01of01_largeimage")
    );

    assert!(encoder.chains.borrow().is_empty());
    // The image source itself must never be consumed as a raw frame.
    assert!(fx.source.is_file());
    assert!(fx.dest_dir.join("N_456_01of01_largeimage").is_file());
    assert!(fx.dest_dir.join("N_456_01of01_thumbnail").is_file());

    // Small source: full-size derivative, no oversize resize.
    let specs = stills.derive_specs.borrow();
    assert!(matches!(specs[0].1, DerivativeSpec::FullSize));
}
