//! FFprobe audio-stream inspection.
//!
//! Determines whether a source carries audio and, for dual-track sources,
//! whether one of the first two streams is tagged as narration. A narration
//! tag on one stream promotes the *other* stream to the default disposition
//! in the encoded output.

use std::path::Path;

use ffprobe::{ffprobe, FfProbeError};

use crate::error::{command_failed_error, command_start_error, CoreError, CoreResult};

/// Audio layout of a source as far as the encode mapping cares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioLayout {
    /// Whether any audio stream is present.
    pub has_audio: bool,
    /// Output stream index to mark as the default disposition, when a
    /// narration tag determined one.
    pub default_stream: Option<u8>,
}

/// Inspects the audio streams of a source file.
pub fn inspect_audio(path: &Path) -> CoreResult<AudioLayout> {
    log::debug!("Running ffprobe for audio streams on: {}", path.display());

    let metadata = match ffprobe(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            log::error!("ffprobe failed for audio streams on {}: {:?}", path.display(), err);
            return Err(map_ffprobe_error(err, "audio streams"));
        }
    };

    let languages: Vec<String> = metadata
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .take(2)
        .map(|s| {
            s.tags
                .as_ref()
                .and_then(|t| t.language.clone())
                .unwrap_or_default()
        })
        .collect();

    if languages.is_empty() {
        log::debug!("No audio streams found for {}", path.display());
        return Ok(AudioLayout::default());
    }

    Ok(AudioLayout {
        has_audio: true,
        default_stream: default_from_languages(&languages),
    })
}

/// Picks the default-disposition stream from the first two audio language
/// tags: narration on stream 0 promotes stream 1 and vice versa.
fn default_from_languages(languages: &[String]) -> Option<u8> {
    if languages
        .first()
        .is_some_and(|l| l.to_lowercase().contains("nar"))
    {
        return Some(1);
    }
    if languages
        .get(1)
        .is_some_and(|l| l.to_lowercase().contains("nar"))
    {
        return Some(0);
    }
    None
}

fn map_ffprobe_error(err: FfProbeError, context: &str) -> CoreError {
    match err {
        FfProbeError::Io(io_err) => command_start_error(format!("ffprobe ({context})"), io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            command_failed_error(format!("ffprobe ({context})"), output.status, stderr)
        }
        FfProbeError::Deserialize(err) => CoreError::JsonParse(format!(
            "ffprobe {context} output deserialization: {err}"
        )),
        _ => CoreError::JsonParse(format!("Unknown ffprobe error during {context}: {err:?}")),
    }
}
