use serde::{Deserialize, Serialize};

/// Filename used for capsules created from a description alone, with no
/// uploaded file.
pub const DESCRIPTION_FILENAME: &str = "description.txt";

/// Extensions accepted for capsule payloads, grouped by kind.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "pdf"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "flac"];

/// Broad classification of a capsule payload, derived from the filename
/// extension at create/update time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    /// Not producible through validation; kept so stored rows with an
    /// unrecognized kind still load.
    Other,
}

impl ContentKind {
    /// Classify a filename by its extension, case-insensitively.
    ///
    /// Returns `None` when the extension is missing or not in the allowed
    /// set; callers turn that into a validation error.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();
        let extension = extension.as_str();

        if TEXT_EXTENSIONS.contains(&extension) {
            Some(ContentKind::Text)
        } else if IMAGE_EXTENSIONS.contains(&extension) {
            Some(ContentKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension) {
            Some(ContentKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&extension) {
            Some(ContentKind::Audio)
        } else {
            None
        }
    }

    /// Every allowed extension, for validation error messages.
    pub fn allowed_extensions() -> Vec<&'static str> {
        let mut all = Vec::new();
        all.extend_from_slice(TEXT_EXTENSIONS);
        all.extend_from_slice(IMAGE_EXTENSIONS);
        all.extend_from_slice(VIDEO_EXTENSIONS);
        all.extend_from_slice(AUDIO_EXTENSIONS);
        all
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "text" => ContentKind::Text,
            "image" => ContentKind::Image,
            "video" => ContentKind::Video,
            "audio" => ContentKind::Audio,
            _ => ContentKind::Other,
        }
    }
}
