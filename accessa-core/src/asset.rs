//! Source file classification by extension.
//!
//! Only video and still-image sources get pipeline work; audio and document
//! sources pass straight through to the archival move.

/// Broad media kind of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Video,
    Image,
    Audio,
    Document,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mxf", "mkv", "mov", "wmv", "mp4", "mpg", "avi", "ts", "mpeg", "m2ts",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "gif", "jpeg", "jpg", "tif", "pct", "tiff"];

const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3"];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "docx", "pdf", "vtt", "doc", "tar", "srt", "scc", "itt", "stl", "cap", "dxfp", "xml",
    "dfxp", "txt", "ttf", "rtf", "csv",
];

/// Classifies a file extension (without leading dot, any case) into an
/// [`AssetKind`]. Returns `None` for unrecognised extensions; the caller
/// routes those to the error holding directory.
pub fn classify(extension: &str) -> Option<AssetKind> {
    let ext = extension.to_ascii_lowercase();
    let ext = ext.as_str();
    if VIDEO_EXTENSIONS.contains(&ext) {
        Some(AssetKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(AssetKind::Image)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(AssetKind::Audio)
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(AssetKind::Document)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_extensions() {
        assert_eq!(classify("mkv"), Some(AssetKind::Video));
        assert_eq!(classify("MOV"), Some(AssetKind::Video));
        assert_eq!(classify("tiff"), Some(AssetKind::Image));
        assert_eq!(classify("wav"), Some(AssetKind::Audio));
        assert_eq!(classify("srt"), Some(AssetKind::Document));
    }

    #[test]
    fn unknown_extension_is_none() {
        assert_eq!(classify("exe"), None);
        assert_eq!(classify(""), None);
    }
}
