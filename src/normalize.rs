//! Downsampling and re-encoding of uploaded evidence photos.
//!
//! Phone photos routinely run to several megabytes, which makes the OCR
//! provider slow and occasionally makes it reject the upload outright. We
//! bound the payload by scaling wide images down and re-encoding everything
//! as moderate-quality JPEG before it goes anywhere near the network.

use std::{error, fmt};

use image::{DynamicImage, codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::prelude::*;

/// Options controlling photo normalization.
#[derive(Clone, Debug)]
pub struct NormalizeOpts {
    /// Images wider than this are scaled down proportionally.
    pub max_width: u32,

    /// JPEG quality of the re-encoded image, 1-100.
    pub jpeg_quality: u8,
}

impl Default for NormalizeOpts {
    fn default() -> Self {
        Self {
            max_width: 1500,
            jpeg_quality: 75,
        }
    }
}

/// A photo re-encoded for transmission to the OCR provider.
#[derive(Clone)]
pub struct NormalizedImage {
    /// Filename to present to the provider. Always ends in `.jpg`.
    pub filename: String,

    /// The JPEG bytes.
    pub bytes: Vec<u8>,

    /// MIME type of `bytes`.
    pub content_type: &'static str,
}

impl fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't dump megabytes of image data into logs.
        f.debug_struct("NormalizedImage")
            .field("filename", &self.filename)
            .field("bytes", &format!("<{} bytes>", self.bytes.len()))
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// An error normalizing an upload.
#[derive(Debug)]
pub enum NormalizeError {
    /// The bytes could not be decoded as a raster image.
    Unsupported {
        /// The original filename, for the user-facing message.
        filename: String,
        /// What the decoder said.
        detail: String,
    },

    /// Re-encoding the decoded image failed.
    Encode {
        /// The original filename.
        filename: String,
        /// The underlying encoder error.
        source: image::ImageError,
    },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::Unsupported { filename, detail } => write!(
                f,
                "{filename:?} is not a readable image file ({detail})"
            ),
            NormalizeError::Encode { filename, source } => {
                write!(f, "could not re-encode {filename:?}: {source}")
            }
        }
    }
}

impl error::Error for NormalizeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            NormalizeError::Unsupported { .. } => None,
            NormalizeError::Encode { source, .. } => Some(source),
        }
    }
}

/// Normalize an uploaded photo: decode, flatten to RGB, scale down to at
/// most `opts.max_width` wide, and re-encode as JPEG.
///
/// Pure function of the input bytes and options. Fails only when the bytes
/// cannot be decoded as a raster image (or, rarely, when re-encoding fails).
pub fn normalize(
    filename: &str,
    bytes: &[u8],
    opts: &NormalizeOpts,
) -> Result<NormalizedImage, NormalizeError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|err| NormalizeError::Unsupported {
            filename: filename.to_owned(),
            detail: err.to_string(),
        })?;
    debug!(
        filename,
        width = decoded.width(),
        height = decoded.height(),
        "decoded upload"
    );

    // JPEG has no transparency, so alpha and palette modes are flattened to
    // plain RGB before encoding.
    let decoded = match decoded {
        DynamicImage::ImageRgb8(_) => decoded,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let resized = if decoded.width() > opts.max_width {
        // Integer division truncates the new height. A one-pixel error is
        // irrelevant to OCR legibility.
        let new_height = (u64::from(decoded.height()) * u64::from(opts.max_width)
            / u64::from(decoded.width())) as u32;
        decoded.resize_exact(opts.max_width, new_height.max(1), FilterType::Triangle)
    } else {
        decoded
    };

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, opts.jpeg_quality);
    resized
        .write_with_encoder(encoder)
        .map_err(|err| NormalizeError::Encode {
            filename: filename.to_owned(),
            source: err,
        })?;

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("evidence");
    Ok(NormalizedImage {
        filename: format!("{stem}.jpg"),
        bytes: encoded,
        content_type: "image/jpeg",
    })
}
