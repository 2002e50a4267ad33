//! Still asset derivation.
//!
//! Every completed job carries two JPEG derivatives: a full-size copy and a
//! thumbnail, both derived from a single raw frame (grabbed from the encoded
//! video, or the source itself for still-image jobs). The raw frame is an
//! intermediate: it is removed once both derivatives exist and kept for
//! manual inspection when either is missing.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::external::{ffmpeg, gm};

/// Suffix of the full-size derivative, before finalisation strips the
/// extension.
pub const LARGEIMAGE_SUFFIX: &str = "_largeimage.jpg";

/// Suffix of the thumbnail derivative.
pub const THUMBNAIL_SUFFIX: &str = "_thumbnail.jpg";

/// How one derivative is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeSpec {
    /// Full density, no resize.
    FullSize,
    /// Reduced density, fixed 180-pixel height.
    Thumbnail,
    /// Full density with a percentage resize, for oversized image sources.
    Oversize { percent: u32 },
}

/// Paths of the still assets for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillAssetSet {
    pub raw_frame: PathBuf,
    pub full_size: PathBuf,
    pub thumbnail: PathBuf,
}

/// External tooling needed for still work: a frame grabber and an image
/// deriver. Split out as a trait so the pipeline tests run without ffmpeg
/// or GraphicsMagick installed.
pub trait StillTools {
    fn grab_frame(&self, video: &Path, seconds: u64, out: &Path) -> CoreResult<()>;
    fn derive(&self, source: &Path, dest: &Path, spec: &DerivativeSpec) -> CoreResult<()>;
}

/// Production implementation shelling out to ffmpeg and gm.
#[derive(Debug, Clone, Default)]
pub struct SystemStillTools;

impl StillTools for SystemStillTools {
    fn grab_frame(&self, video: &Path, seconds: u64, out: &Path) -> CoreResult<()> {
        ffmpeg::extract_frame(video, seconds, out)
    }

    fn derive(&self, source: &Path, dest: &Path, spec: &DerivativeSpec) -> CoreResult<()> {
        gm::derive(source, dest, spec)
    }
}

/// Percentage resize for oversized still-image sources, by size band.
/// Sources under 100MB keep full size.
pub fn oversize_percent(bytes: u64) -> Option<u32> {
    const MB: u64 = 1024 * 1024;
    match bytes {
        b if b > 400 * MB => Some(30),
        b if b > 300 * MB => Some(45),
        b if b > 200 * MB => Some(60),
        b if b >= 100 * MB => Some(75),
        _ => None,
    }
}

/// Derivative output paths for a given stem inside the destination dir.
pub fn derivative_paths(dest_dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        dest_dir.join(format!("{stem}{LARGEIMAGE_SUFFIX}")),
        dest_dir.join(format!("{stem}{THUMBNAIL_SUFFIX}")),
    )
}

/// Grabs the raw frame for a video job, retrying once at half the offset
/// when the encoded file has gone missing under us (an encode that appeared
/// to succeed but did not produce a durable output).
///
/// Returns the offset actually used.
pub fn grab_raw_frame<T: StillTools>(
    tools: &T,
    video: &Path,
    offset: u64,
    raw: &Path,
) -> CoreResult<u64> {
    let mut used = offset;
    let mut result = tools.grab_frame(video, used, raw);

    if !video.is_file() {
        used = offset / 2;
        log::warn!(
            "Encoded file missing after frame grab; retrying at {}s",
            used
        );
        result = tools.grab_frame(video, used, raw);
    }

    match result {
        Ok(()) if raw.is_file() => Ok(used),
        Ok(()) => Err(CoreError::StillExtractionFailed(format!(
            "frame grab produced no file at {}",
            raw.display()
        ))),
        Err(e) => Err(CoreError::StillExtractionFailed(format!(
            "frame grab at {}s failed: {e}",
            used
        ))),
    }
}

/// Derives the full-size and thumbnail JPEGs from one source frame.
///
/// Both derivation attempts always run; the error reports whichever outputs
/// are missing afterwards so a partial failure leaves the other derivative
/// (and the source frame) in place for inspection.
pub fn derive_stills<T: StillTools>(
    tools: &T,
    source_frame: &Path,
    dest_dir: &Path,
    stem: &str,
    full_spec: DerivativeSpec,
) -> CoreResult<StillAssetSet> {
    let (full_size, thumbnail) = derivative_paths(dest_dir, stem);

    if let Err(e) = tools.derive(source_frame, &full_size, &full_spec) {
        log::warn!("Full-size derivation failed: {e}");
    }
    if let Err(e) = tools.derive(source_frame, &thumbnail, &DerivativeSpec::Thumbnail) {
        log::warn!("Thumbnail derivation failed: {e}");
    }

    let full_ok = full_size.is_file();
    let thumb_ok = thumbnail.is_file();
    if full_ok && thumb_ok {
        Ok(StillAssetSet {
            raw_frame: source_frame.to_path_buf(),
            full_size,
            thumbnail,
        })
    } else {
        let mut missing = Vec::new();
        if !full_ok {
            missing.push(full_size.display().to_string());
        }
        if !thumb_ok {
            missing.push(thumbnail.display().to_string());
        }
        Err(CoreError::StillExtractionFailed(format!(
            "derivative(s) missing: {}",
            missing.join(", ")
        )))
    }
}

/// Removes the raw frame of a complete asset set. Only called once both
/// derivatives are known to exist; refuses otherwise so the frame stays
/// available for inspection.
pub fn remove_raw_frame(set: &StillAssetSet) -> CoreResult<()> {
    if !(set.full_size.is_file() && set.thumbnail.is_file()) {
        return Err(CoreError::StillExtractionFailed(format!(
            "refusing to remove raw frame {}: derivatives incomplete",
            set.raw_frame.display()
        )));
    }
    std::fs::remove_file(&set.raw_frame)?;
    Ok(())
}
