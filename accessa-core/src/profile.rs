//! Encode profile selection.
//!
//! Maps a probed source onto the filter recipe and audio mapping used for
//! the access copy. Selection is a pure function over the descriptor,
//! evaluated as an ordered rule list: rules overlap (a height+width rule
//! must beat the generic height+aspect-ratio rule for the same band), so
//! first match wins and the order below is load-bearing. A descriptor no
//! rule matches is an explicit error, never a silent fallthrough.
//!
//! Codec parameters are fixed for every profile; only the filter chain and
//! the audio default disposition vary per source.

use std::fmt;

use crate::probe::SourceDescriptor;
use crate::error::{CoreError, CoreResult};

/// Video codec used for all access copies.
pub const VIDEO_CODEC: &str = "libx264";

/// Constant rate factor for all access copies.
pub const VIDEO_CRF: u32 = 28;

/// Pixel format for all access copies.
pub const PIXEL_FORMAT: &str = "yuv420p";

/// Audio codec for all mapped audio streams.
pub const AUDIO_CODEC: &str = "aac";

/// Muxing queue headroom for sources with badly interleaved streams.
pub const MAX_MUXING_QUEUE_SIZE: &str = "9999";

/// Black-frame detection filter appended to recipes that keep the full
/// picture width; its report feeds the still-frame selection.
const BLACKDETECT: &str = "blackdetect=d=0.05:pix_th=0.10";

/// One step of a video filter chain, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStep {
    /// Field-based sources are always deinterlaced first (yadif).
    Deinterlace,
    /// Crop to `w`x`h`, optionally offset from the top-left.
    Crop {
        w: u32,
        h: u32,
        offset: Option<(u32, u32)>,
    },
    /// Lanczos scale; `-1` preserves the aspect ratio on that axis.
    Scale { w: i32, h: i32 },
    /// Centred pad out to `w`x`h`.
    Pad { w: u32, h: u32 },
    /// Black-interval detection report on stderr.
    BlackDetect,
}

impl FilterStep {
    fn render(&self) -> String {
        match self {
            FilterStep::Deinterlace => "yadif".to_string(),
            FilterStep::Crop { w, h, offset: None } => format!("crop={w}:{h}"),
            FilterStep::Crop {
                w,
                h,
                offset: Some((x, y)),
            } => format!("crop={w}:{h}:{x}:{y}"),
            FilterStep::Scale { w, h } => format!("scale={w}:{h}:flags=lanczos"),
            FilterStep::Pad { w, h } => format!("pad={w}:{h}:-1:-1"),
            FilterStep::BlackDetect => BLACKDETECT.to_string(),
        }
    }
}

/// Audio mapping for the encode: which streams come across and which output
/// track, if any, is flagged as the default disposition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioMapSpec {
    pub has_audio: bool,
    pub default_stream: Option<u8>,
}

/// Selected encode recipe for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    /// Recipe name, for logs.
    pub name: &'static str,
    /// Ordered filter chain; deinterlace always leads.
    pub filters: Vec<FilterStep>,
    /// Audio stream mapping.
    pub audio: AudioMapSpec,
    /// Source video stream index for `-map`.
    pub video_stream_index: String,
}

impl EncodeProfile {
    /// Renders the `-vf` argument value.
    pub fn filter_chain(&self) -> String {
        let parts: Vec<String> = self.filters.iter().map(FilterStep::render).collect();
        parts.join(",")
    }
}

impl fmt::Display for EncodeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.filter_chain())
    }
}

// Filter recipes. Names follow the broadcast standards they serve.

fn crop_ntsc_486_16x9() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 672, h: 480, offset: None },
        FilterStep::Scale { w: 1024, h: 486 },
    ]
}

fn crop_ntsc_486() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 672, h: 480, offset: None },
        FilterStep::Scale { w: 734, h: 486 },
        FilterStep::Pad { w: 768, h: 486 },
    ]
}

fn pad_ntsc_640x480() -> Vec<FilterStep> {
    vec![FilterStep::Deinterlace, FilterStep::Pad { w: 768, h: 480 }]
}

fn crop_sd_16x9() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 704, h: 572, offset: Some((8, 2)) },
        FilterStep::Scale { w: 1024, h: 576 },
    ]
}

fn no_stretch_4x3() -> Vec<FilterStep> {
    vec![FilterStep::Deinterlace, FilterStep::Pad { w: 768, h: 576 }]
}

fn scale_sd_16x9() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Scale { w: 1024, h: 576 },
        FilterStep::BlackDetect,
    ]
}

fn crop_sd_4x3() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 672, h: 572, offset: Some((24, 2)) },
        FilterStep::Scale { w: 734, h: 576 },
        FilterStep::Pad { w: 768, h: 576 },
    ]
}

fn crop_sd_15x11() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 704, h: 572, offset: None },
        FilterStep::Scale { w: 768, h: 576 },
        FilterStep::Pad { w: 768, h: 576 },
    ]
}

fn crop_sd_608() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Crop { w: 672, h: 572, offset: Some((24, 32)) },
        FilterStep::Scale { w: 734, h: 576 },
        FilterStep::Pad { w: 768, h: 576 },
    ]
}

fn hd_16x9() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Scale { w: -1, h: 720 },
        FilterStep::Pad { w: 1280, h: 720 },
    ]
}

fn fhd_all() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Scale { w: -1, h: 1080 },
        FilterStep::Pad { w: 1920, h: 1080 },
    ]
}

fn fhd_letters() -> Vec<FilterStep> {
    vec![
        FilterStep::Deinterlace,
        FilterStep::Scale { w: 1920, h: -1 },
        FilterStep::Pad { w: 1920, h: 1080 },
        FilterStep::BlackDetect,
    ]
}

/// One selection rule: predicate over the descriptor plus the recipe it
/// selects. Kept as plain function pointers so each rule can be unit-tested
/// in isolation and the table stays a const.
struct Rule {
    name: &'static str,
    matches: fn(&SourceDescriptor) -> bool,
    recipe: fn() -> Vec<FilterStep>,
}

/// Width-to-height ratio rounded to three decimals, as used by the
/// full-HD rules. 16:9 rounds to 1.778.
fn aspect(desc: &SourceDescriptor) -> f64 {
    if desc.height == 0 {
        return 0.0;
    }
    let raw = desc.width as f64 / desc.height as f64;
    (raw * 1000.0).round() / 1000.0
}

/// Ordered rule table. Evaluated top to bottom; first match wins.
const RULES: &[Rule] = &[
    Rule {
        name: "crop_ntsc_486_16x9",
        matches: |d| d.height <= 486 && d.display_aspect_ratio == "16:9",
        recipe: crop_ntsc_486_16x9,
    },
    Rule {
        name: "crop_ntsc_486",
        matches: |d| d.height <= 486 && d.display_aspect_ratio == "4:3",
        recipe: crop_ntsc_486,
    },
    Rule {
        name: "pad_ntsc_640x480",
        matches: |d| d.height <= 486 && d.width == 640,
        recipe: pad_ntsc_640x480,
    },
    Rule {
        name: "crop_sd_16x9",
        matches: |d| d.height <= 576 && d.display_aspect_ratio == "16:9",
        recipe: crop_sd_16x9,
    },
    Rule {
        name: "no_stretch_768",
        matches: |d| d.height <= 576 && d.width == 768,
        recipe: no_stretch_4x3,
    },
    Rule {
        name: "scale_sd_16x9",
        matches: |d| d.height <= 576 && d.width == 1024,
        recipe: scale_sd_16x9,
    },
    Rule {
        name: "no_stretch_square_pixel",
        matches: |d| d.height <= 576 && d.pixel_aspect_ratio == "1.000",
        recipe: no_stretch_4x3,
    },
    Rule {
        name: "crop_sd_4x3",
        matches: |d| d.height <= 576 && d.display_aspect_ratio == "4:3",
        recipe: crop_sd_4x3,
    },
    Rule {
        name: "crop_sd_15x11",
        matches: |d| d.height <= 576 && d.display_aspect_ratio == "15:11",
        recipe: crop_sd_15x11,
    },
    Rule {
        name: "crop_sd_608",
        matches: |d| d.height == 608,
        recipe: crop_sd_608,
    },
    Rule {
        name: "crop_sd_wide_185",
        matches: |d| d.height == 576 && d.display_aspect_ratio == "1.85:1",
        recipe: crop_sd_16x9,
    },
    Rule {
        name: "hd_16x9",
        matches: |d| d.height <= 720 && d.display_aspect_ratio == "16:9",
        recipe: hd_16x9,
    },
    Rule {
        name: "fhd_letters",
        matches: |d| d.width == 1920 && aspect(d) >= 1.778,
        recipe: fhd_letters,
    },
    Rule {
        name: "fhd_all",
        matches: |d| d.height > 720 && d.width <= 1920,
        recipe: fhd_all,
    },
    Rule {
        name: "fhd_all_narrow",
        matches: |d| d.width >= 1920 && aspect(d) < 1.778,
        recipe: fhd_all,
    },
    Rule {
        name: "fhd_letters_tall",
        matches: |d| d.height >= 1080 && aspect(d) >= 1.778,
        recipe: fhd_letters,
    },
];

/// Selects the encode profile for a probed source.
///
/// Total over all descriptors: either a rule matches or the descriptor is
/// reported as unresolved, which indicates a gap in the rule table and
/// aborts the job.
pub fn select_profile(desc: &SourceDescriptor) -> CoreResult<EncodeProfile> {
    for rule in RULES {
        if (rule.matches)(desc) {
            log::debug!("Profile rule matched: {}", rule.name);
            return Ok(EncodeProfile {
                name: rule.name,
                filters: (rule.recipe)(),
                audio: AudioMapSpec {
                    has_audio: desc.has_audio,
                    default_stream: desc.audio_default_stream,
                },
                video_stream_index: desc.video_stream_index.clone(),
            });
        }
    }
    Err(CoreError::ProfileUnresolved(format!(
        "height {} width {} DAR '{}' PAR '{}'",
        desc.height, desc.width, desc.display_aspect_ratio, desc.pixel_aspect_ratio
    )))
}

/// Reduced recipe for the one-shot encode retry: deinterlace only, no
/// crop/scale/pad. Trades geometric correctness for completing sources the
/// full recipe chokes on.
pub fn safe_profile(desc: &SourceDescriptor) -> EncodeProfile {
    EncodeProfile {
        name: "safe_deinterlace_only",
        filters: vec![FilterStep::Deinterlace],
        audio: AudioMapSpec {
            has_audio: desc.has_audio,
            default_stream: desc.audio_default_stream,
        },
        video_stream_index: desc.video_stream_index.clone(),
    }
}
