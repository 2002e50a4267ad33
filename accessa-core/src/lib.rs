//! Core library for archival access-copy creation using ffmpeg, mediainfo,
//! mediaconch and GraphicsMagick.
//!
//! This crate turns one preservation source file into its access renditions:
//! a conformance-checked MP4 proxy plus full-size and thumbnail JPEG stills,
//! with the result handed to an external media record store. One process
//! handles one source; concurrency happens between processes, coordinated
//! only through deterministic output paths.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use accessa_core::config::AccessConfig;
//! use accessa_core::external::ffmpeg::SidecarEncoder;
//! use accessa_core::external::mediaconch::MediaconchChecker;
//! use accessa_core::joblog::JobLog;
//! use accessa_core::keyframe::BlackspaceAvoidance;
//! use accessa_core::pipeline::process_asset;
//! use accessa_core::probe::MediaInfoProber;
//! use accessa_core::records::JsonFileRecords;
//! use accessa_core::stills::SystemStillTools;
//! use std::path::{Path, PathBuf};
//!
//! let config = AccessConfig::new(
//!     PathBuf::from("/mnt/transcode"),
//!     PathBuf::from("/etc/accessa/mp4_policy.xml"),
//! );
//! config.validate().unwrap();
//!
//! let records = JsonFileRecords::new(PathBuf::from("/mnt/records"));
//! let mut joblog = JobLog::new("N_123_01of01.mkv");
//! let outcome = process_asset(
//!     &MediaInfoProber,
//!     &SidecarEncoder,
//!     &MediaconchChecker::new(config.policy_path.clone()),
//!     &SystemStillTools,
//!     &records,
//!     &BlackspaceAvoidance,
//!     &config,
//!     Path::new("/mnt/autoingest/N_123_01of01.mkv"),
//!     &mut joblog,
//! ).unwrap();
//! joblog.flush();
//! println!("{outcome:?}");
//! ```

pub mod asset;
pub mod config;
pub mod error;
pub mod external;
pub mod guard;
pub mod joblog;
pub mod keyframe;
pub mod pipeline;
pub mod probe;
pub mod profile;
pub mod records;
pub mod stills;

// Re-exports for public API
pub use asset::AssetKind;
pub use config::AccessConfig;
pub use error::{CoreError, CoreResult};
pub use joblog::JobLog;
pub use pipeline::{process_asset, JobOutcome, JobState, TranscodeJob};
pub use probe::{MediaInfoProber, SourceDescriptor};
pub use profile::{safe_profile, select_profile, EncodeProfile};
pub use records::{JsonFileRecords, MediaRecord, MediaRecords, ResultRecord};
