//! Image attachments for vision prompts.
//!
//! The generation endpoint takes images as bare base64 strings (no
//! `data:` prefix). An attachment can come from raw bytes, a file on disk
//! or a data URL as produced by browser file readers.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Accepted MIME types with their file extensions
const SUPPORTED_TYPES: &[(&str, &[&str])] = &[
    ("image/png", &["png"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/webp", &["webp"]),
    ("image/gif", &["gif"]),
    ("image/dicom", &["dcm", "dicom"]),
];

/// Errors building an attachment
#[derive(Debug, Error)]
pub enum ImageError {
    /// Failed to read the image file
    #[error("Failed to read file: {}", path.display())]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Not one of the accepted image types
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// The data URL is not `data:<mime>;base64,<payload>`
    #[error("malformed data URL")]
    MalformedDataUrl,

    /// The base64 payload does not decode
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Zero-length image
    #[error("image is empty")]
    Empty,
}

/// An image ready to be sent with a prompt
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    name: String,
    mime: &'static str,
    base64: String,
    size_bytes: usize,
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The payload can be megabytes long
        f.debug_struct("ImageAttachment")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

impl ImageAttachment {
    /// Build from raw bytes; the type is sniffed, then taken from `name`'s extension
    ///
    /// # Errors
    ///
    /// [`ImageError::Empty`] or [`ImageError::UnsupportedType`].
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ImageError> {
        let name = name.into();
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let mime = sniff_mime(bytes)
            .or_else(|| mime_for_extension(&name))
            .ok_or_else(|| ImageError::UnsupportedType(name.clone()))?;

        Ok(Self {
            name,
            mime,
            base64: STANDARD.encode(bytes),
            size_bytes: bytes.len(),
        })
    }

    /// Read an image file
    ///
    /// # Errors
    ///
    /// [`ImageError::Read`] if the file cannot be read, otherwise as
    /// [`ImageAttachment::from_bytes`].
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| ImageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let image = Self::from_bytes(name, &bytes)?;
        tracing::info!(
            name = %image.name,
            size_kb = image.size_kb(),
            mime = image.mime,
            "Image loaded"
        );
        Ok(image)
    }

    /// Parse a `data:<mime>;base64,<payload>` URL
    ///
    /// # Errors
    ///
    /// [`ImageError::MalformedDataUrl`], [`ImageError::UnsupportedType`],
    /// [`ImageError::InvalidBase64`] or [`ImageError::Empty`].
    pub fn from_data_url(name: impl Into<String>, data_url: &str) -> Result<Self, ImageError> {
        let (header, payload) = data_url
            .trim()
            .split_once(',')
            .ok_or(ImageError::MalformedDataUrl)?;
        let declared = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .ok_or(ImageError::MalformedDataUrl)?;

        let mime = canonical_mime(declared)
            .ok_or_else(|| ImageError::UnsupportedType(declared.to_string()))?;

        let decoded = STANDARD.decode(payload)?;
        if decoded.is_empty() {
            return Err(ImageError::Empty);
        }

        Ok(Self {
            name: name.into(),
            mime,
            base64: payload.to_string(),
            size_bytes: decoded.len(),
        })
    }

    /// Display name (usually the file name)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type
    #[must_use]
    pub fn mime(&self) -> &str {
        self.mime
    }

    /// Base64 payload, as sent in the request's `images` array
    #[must_use]
    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// Decoded size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Decoded size in kilobytes, rounded
    #[must_use]
    pub fn size_kb(&self) -> usize {
        (self.size_bytes + 512) / 1024
    }
}

fn canonical_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.trim().to_ascii_lowercase();
    let mime = match mime.as_str() {
        "image/jpg" => "image/jpeg",
        "application/dicom" => "image/dicom",
        other => other,
    };
    SUPPORTED_TYPES
        .iter()
        .map(|(m, _)| *m)
        .find(|m| *m == mime)
}

fn mime_for_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_TYPES
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(m, _)| *m)
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.len() >= 132 && &bytes[128..132] == b"DICM" {
        Some("image/dicom")
    } else {
        None
    }
}
