//! Uploaded project media (the optional image or audio attached to a campaign).

use std::fmt;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Only image and audio files are supported (got {file_name}, {mime_type})")]
    Unsupported { file_name: String, mime_type: String },

    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProjectMedia {
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl fmt::Debug for ProjectMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectMedia")
            .field("kind", &self.kind)
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ProjectMedia {
    pub fn load(path: &Path) -> Result<Self, MediaError> {
        let bytes = std::fs::read(path).map_err(|source| MediaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(file_name, bytes)
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, MediaError> {
        let file_name = file_name.into();
        let mime_type = mime_from_file_name(&file_name).to_string();
        let kind = kind_for_mime(&mime_type).ok_or_else(|| MediaError::Unsupported {
            file_name: file_name.clone(),
            mime_type: mime_type.clone(),
        })?;
        tracing::debug!(%file_name, %mime_type, bytes = bytes.len(), "media loaded");
        Ok(Self {
            kind,
            bytes,
            mime_type,
            file_name,
        })
    }

    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }
}

/// MIME type guessed from a file extension; `application/octet-stream` if unknown.
pub fn mime_from_file_name(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "aif" | "aiff" => "audio/aiff",
        _ => "application/octet-stream",
    }
}

pub fn kind_for_mime(mime: &str) -> Option<MediaKind> {
    if mime.starts_with("image/") {
        Some(MediaKind::Image)
    } else if mime.starts_with("audio/") {
        Some(MediaKind::Audio)
    } else {
        None
    }
}
