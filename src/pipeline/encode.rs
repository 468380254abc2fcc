//! Image encoding: raw archive bytes → base64 payload + MIME tag.
//!
//! The bytes are sent exactly as they were stored in the archive; no
//! decoding, resizing or re-compression happens here. The MIME tag is taken
//! from the image's magic bytes when they are recognisable, otherwise from the
//! entry's extension, and defaults to `image/png`.

use crate::pipeline::archive::ArchiveEntry;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// MIME type used when neither the bytes nor the name identify the format.
pub const FALLBACK_MIME: &str = "image/png";

/// A page image ready to embed in an inference request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Standard (padded) base64 of the raw image bytes.
    pub data: String,
}

/// Encode an archive entry for transport.
pub fn encode_entry(entry: &ArchiveEntry) -> InlineImage {
    let mime_type = detect_mime(&entry.name, &entry.bytes);
    let data = STANDARD.encode(&entry.bytes);
    debug!(
        "Encoded {} ({}) → {} bytes base64",
        entry.name,
        mime_type,
        data.len()
    );
    InlineImage {
        mime_type: mime_type.to_string(),
        data,
    }
}

/// Best-effort MIME type for an image: magic bytes first, then extension.
pub fn detect_mime(name: &str, bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    ImageFormat::from_path(Path::new(name))
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[test]
    fn mime_from_magic_bytes() {
        assert_eq!(detect_mime("whatever.bin", PNG_MAGIC), "image/png");
        assert_eq!(detect_mime("whatever.bin", JPEG_MAGIC), "image/jpeg");
    }

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(detect_mime("mislabelled.png", JPEG_MAGIC), "image/jpeg");
    }

    #[test]
    fn mime_from_extension_when_bytes_unknown() {
        assert_eq!(detect_mime("Page_02.JPG", b"not an image"), "image/jpeg");
        assert_eq!(detect_mime("scan.jpeg", b"???"), "image/jpeg");
    }

    #[test]
    fn mime_falls_back_to_png() {
        assert_eq!(detect_mime("noext", b"???"), FALLBACK_MIME);
    }

    #[test]
    fn encode_entry_is_valid_base64_of_raw_bytes() {
        let entry = ArchiveEntry {
            name: "p.png".into(),
            bytes: PNG_MAGIC.to_vec(),
        };
        let img = encode_entry(&entry);
        assert_eq!(img.mime_type, "image/png");
        let decoded = STANDARD.decode(&img.data).expect("valid base64");
        assert_eq!(decoded, PNG_MAGIC);
    }
}
