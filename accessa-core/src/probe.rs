//! Source metadata probing and normalization.
//!
//! Inspection-tool output for archival tape captures is inconsistent:
//! dimensions may be unit-suffixed ("576 pixel") or thousands-spaced
//! ("1 080"), sample-based containers store a sampled height above the
//! coded height, and multi-track sources report more than one duration.
//! This module owns the rules that flatten all of that into one immutable
//! [`SourceDescriptor`] per job.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::external::ffprobe::inspect_audio;
use crate::external::mediainfo;

/// Canonical coded-height rungs matched before numeric cleanup.
const HEIGHT_LADDER: &[&str] = &["480", "486", "576", "608", "720", "1080", "1 080"];

/// Canonical width rungs matched before numeric cleanup.
const WIDTH_LADDER: &[&str] = &["720", "768", "1024", "1 024", "1280", "1 280", "1920", "1 920"];

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").expect("static pattern"));

static MS_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(?:\.\d+)?").expect("static pattern"));

/// Normalized scalar description of one source file. Derived once per job
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub extension: String,
    /// Canonical ratio token ("4:3", "16:9", "1.85:1", "2.2:1") or the raw
    /// inspection value verbatim when nothing matched.
    pub display_aspect_ratio: String,
    /// Decimal pixel aspect ratio, truncated to five characters.
    pub pixel_aspect_ratio: String,
    pub height: u32,
    pub width: u32,
    /// Floor-truncated seconds of the longest video track.
    pub duration_seconds: u64,
    pub has_audio: bool,
    /// Output audio track to mark default, when narration tagging chose one.
    pub audio_default_stream: Option<u8>,
    /// Source video stream index for stream mapping ("0" or "1").
    pub video_stream_index: String,
}

/// Something that can turn a file path into a [`SourceDescriptor`].
pub trait SourceProber {
    fn probe(&self, path: &Path) -> CoreResult<SourceDescriptor>;
}

/// Production prober backed by mediainfo field queries plus ffprobe for the
/// audio layout.
#[derive(Debug, Clone, Default)]
pub struct MediaInfoProber;

impl SourceProber for MediaInfoProber {
    fn probe(&self, path: &Path) -> CoreResult<SourceDescriptor> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let dar_raw = mediainfo::query("Video", "DisplayAspectRatio/String", path)?;
        let par_raw = mediainfo::query("Video", "PixelAspectRatio", path)?;
        let sampled_height = mediainfo::query("Video", "Sampled_Height", path)?;
        let stored_height = mediainfo::query("Video", "Height", path)?;
        let width_raw = mediainfo::query("Video", "Width/String", path)?;
        let duration_raw = mediainfo::query("Video", "Duration", path)?;

        let height = normalize_height(&sampled_height, &stored_height);
        let width = normalize_dimension(&width_raw, WIDTH_LADDER);
        if height == 0 || width == 0 {
            return Err(CoreError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!(
                    "no parseable video stream (height '{stored_height}', width '{width_raw}')"
                ),
            });
        }

        let (duration_seconds, video_stream_index) =
            parse_duration(&duration_raw).ok_or_else(|| CoreError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("no parseable duration ('{duration_raw}')"),
            })?;

        let audio = inspect_audio(path)?;

        Ok(SourceDescriptor {
            path: path.to_path_buf(),
            extension,
            display_aspect_ratio: normalize_dar(&dar_raw),
            pixel_aspect_ratio: normalize_par(&par_raw),
            height,
            width,
            duration_seconds,
            has_audio: audio.has_audio,
            audio_default_stream: audio.default_stream,
            video_stream_index,
        })
    }
}

/// Picks the working height: the sampled value wins over the stored value
/// when it is numerically larger (sample-based storage formats), otherwise
/// the stored value stands.
pub fn normalize_height(sampled: &str, stored: &str) -> u32 {
    let sampled_px = normalize_dimension(sampled, HEIGHT_LADDER);
    let stored_px = normalize_dimension(stored, HEIGHT_LADDER);
    if sampled_px > stored_px {
        sampled_px
    } else {
        stored_px
    }
}

/// Canonicalizes one dimension string: exact ladder match first, then unit
/// suffix removal and digit stripping. Returns 0 when nothing numeric is
/// left.
pub fn normalize_dimension(raw: &str, ladder: &[&str]) -> u32 {
    let trimmed = raw.trim();
    if ladder.contains(&trimmed) {
        return NON_DIGIT
            .replace_all(trimmed, "")
            .parse()
            .unwrap_or_default();
    }
    let cleaned = trimmed.split(" pixel").next().unwrap_or_default();
    NON_DIGIT
        .replace_all(cleaned, "")
        .parse()
        .unwrap_or_default()
}

/// Coerces the display aspect ratio onto the known token set; unmatched
/// values pass through verbatim for the profile rules to reject.
pub fn normalize_dar(raw: &str) -> String {
    if raw.contains("4:3") {
        return "4:3".to_string();
    }
    if raw.contains("16:9") {
        return "16:9".to_string();
    }
    // Near-4:3 academy ratio; treated as 4:3 downstream.
    if raw.contains("15:11") {
        return "4:3".to_string();
    }
    if raw.contains("1.85:1") {
        return "1.85:1".to_string();
    }
    if raw.contains("2.2:1") {
        return "2.2:1".to_string();
    }
    raw.trim().to_string()
}

/// Truncates the pixel aspect ratio to its leading five characters, which
/// also discards repeated values from multi-track sources.
pub fn normalize_par(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('\n');
    if trimmed.len() <= 5 {
        trimmed.to_string()
    } else {
        trimmed[..5].to_string()
    }
}

/// Parses the millisecond duration report. Multi-track sources report two
/// values; the larger wins and its position decides which video stream the
/// encode maps. Returns floor-truncated seconds plus the stream index.
pub fn parse_duration(raw: &str) -> Option<(u64, String)> {
    let tokens: Vec<u64> = MS_TOKEN
        .captures_iter(raw)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .take(2)
        .collect();

    match tokens.as_slice() {
        [] => None,
        [single] => Some((single / 1000, "0".to_string())),
        [first, second] => {
            if second > first {
                Some((second / 1000, "1".to_string()))
            } else {
                Some((first / 1000, "0".to_string()))
            }
        }
        _ => unreachable!("token list capped at two entries"),
    }
}
