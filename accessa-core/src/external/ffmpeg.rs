//! FFmpeg command building and execution.
//!
//! Handles the access-copy encode (libx264 MP4 with the selected filter
//! recipe) and single-frame grabs for stills. Encoder stderr is captured in
//! full: the black-frame detection report rides on it and feeds the
//! still-frame offset selection.

use std::path::Path;
use std::process::Command;

use ffmpeg_sidecar::command::FfmpegCommand;

use crate::error::{command_failed_error, command_start_error, CoreResult};
use crate::profile::{
    EncodeProfile, AUDIO_CODEC, MAX_MUXING_QUEUE_SIZE, PIXEL_FORMAT, VIDEO_CODEC, VIDEO_CRF,
};

/// Captured diagnostics from a completed encode attempt.
#[derive(Debug, Clone, Default)]
pub struct EncodeOutcome {
    /// Encoder stderr lines, in emission order.
    pub diagnostics: Vec<String>,
}

/// Something that can run one encode attempt. The production implementation
/// shells out to ffmpeg; tests substitute their own.
pub trait VideoEncoder {
    fn encode(
        &self,
        source: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> CoreResult<EncodeOutcome>;
}

/// Production encoder backed by ffmpeg-sidecar.
#[derive(Debug, Clone, Default)]
pub struct SidecarEncoder;

impl VideoEncoder for SidecarEncoder {
    fn encode(
        &self,
        source: &Path,
        output: &Path,
        profile: &EncodeProfile,
    ) -> CoreResult<EncodeOutcome> {
        run_encode(source, output, profile)
    }
}

/// Builds the ffmpeg invocation for one encode attempt.
fn build_encode_command(source: &Path, output: &Path, profile: &EncodeProfile) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.hide_banner();
    cmd.arg("-nostdin");
    cmd.input(source.to_string_lossy().as_ref());

    cmd.args(["-map", &format!("0:v:{}", profile.video_stream_index)]);

    // The trailing '?' keeps sources without audio from failing the map.
    cmd.args(["-map", "0:a?", "-c:a", AUDIO_CODEC]);
    if profile.audio.has_audio {
        if let Some(default) = profile.audio.default_stream {
            cmd.args([&format!("-disposition:a:{default}"), "default"]);
        }
    }
    cmd.arg("-dn");

    cmd.args(["-c:v", VIDEO_CODEC]);
    cmd.args(["-crf", &VIDEO_CRF.to_string()]);
    cmd.args(["-pix_fmt", PIXEL_FORMAT]);
    cmd.args(["-vf", &profile.filter_chain()]);
    cmd.args(["-max_muxing_queue_size", MAX_MUXING_QUEUE_SIZE]);
    cmd.args(["-movflags", "faststart"]);

    cmd.arg("-y");
    cmd.output(output.to_string_lossy().as_ref());
    cmd
}

/// Executes one encode attempt, collecting stderr diagnostics.
///
/// A zero exit only means ffmpeg did not report failure; the caller still
/// has to confirm the output file exists before trusting the attempt.
pub fn run_encode(
    source: &Path,
    output: &Path,
    profile: &EncodeProfile,
) -> CoreResult<EncodeOutcome> {
    log::info!(
        "Starting encode ({}): {} -> {}",
        profile.name,
        source.display(),
        output.display()
    );

    let mut cmd = build_encode_command(source, output, profile);
    log::debug!("FFmpeg command: {cmd:?}");

    let mut child = cmd.spawn().map_err(|e| {
        command_failed_error(
            "ffmpeg",
            std::process::ExitStatus::default(),
            format!("Failed to start: {e}"),
        )
    })?;

    let mut diagnostics = Vec::new();

    for event in child.iter().map_err(|e| {
        command_failed_error(
            "ffmpeg",
            std::process::ExitStatus::default(),
            format!("Failed to get event iterator: {e}"),
        )
    })? {
        match event {
            ffmpeg_sidecar::event::FfmpegEvent::Log(_level, message) => {
                diagnostics.push(message);
            }
            ffmpeg_sidecar::event::FfmpegEvent::Error(error) => {
                diagnostics.push(format!("ERROR: {error}"));
            }
            _ => {}
        }
    }

    let status = child.wait().map_err(|e| {
        command_failed_error(
            "ffmpeg",
            std::process::ExitStatus::default(),
            format!("Failed to wait for FFmpeg process: {e}"),
        )
    })?;

    if status.success() {
        log::info!("Encode finished for {}", source.display());
        Ok(EncodeOutcome { diagnostics })
    } else {
        let tail: Vec<&str> = diagnostics
            .iter()
            .rev()
            .take(10)
            .map(String::as_str)
            .collect();
        Err(command_failed_error(
            "ffmpeg",
            status,
            tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
        ))
    }
}

/// Grabs a single frame from an encoded file at the given second offset.
pub fn extract_frame(video: &Path, seconds: u64, out: &Path) -> CoreResult<()> {
    log::debug!(
        "Extracting frame at {}s from {} to {}",
        seconds,
        video.display(),
        out.display()
    );

    let output = Command::new("ffmpeg")
        .arg("-nostdin")
        .arg("-ss")
        .arg(seconds.to_string())
        .arg("-i")
        .arg(video)
        .args(["-frames:v", "1", "-q:v", "2", "-y"])
        .arg(out)
        .output()
        .map_err(|e| command_start_error("ffmpeg (frame grab)", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(command_failed_error(
            "ffmpeg (frame grab)",
            output.status,
            stderr,
        ));
    }
    Ok(())
}
