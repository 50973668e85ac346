//! The evidence card: the final caller-facing record.

use base64::{Engine as _, prelude::BASE64_STANDARD};
use schemars::JsonSchema;

use crate::{
    fields::{EvidenceFields, RubricMatch},
    prelude::*,
    synthesize::SynthesisTier,
};

/// One uploaded photo, as received from the caller.
#[derive(Clone)]
pub struct ImageUpload {
    /// The original filename.
    pub filename: String,

    /// The raw bytes.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("filename", &self.filename)
            .field("bytes", &format!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A request to build an evidence card.
#[derive(Clone, Debug, Default)]
pub struct CardRequest {
    /// Teacher name.
    pub teacher: String,

    /// Subject taught.
    pub subject: String,

    /// School name.
    pub school: String,

    /// School principal name.
    pub principal: String,

    /// Program name override for the card header.
    pub program_name: Option<String>,

    /// Program description hint passed to the synthesizer.
    pub program_description: Option<String>,

    /// The evidence photos. One or two; the pipeline rejects anything else.
    pub images: Vec<ImageUpload>,
}

/// Per-image slot on the finished card.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct ImageSlot {
    /// Original filename of the upload.
    pub filename: String,

    /// `data:` URL preview of the normalized photo, when it decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,

    /// Why this image produced no text, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The finished evidence card.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct EvidenceCard {
    /// Teacher name.
    pub teacher: String,

    /// Subject taught.
    pub subject: String,

    /// School name.
    pub school: String,

    /// School principal name.
    pub principal: String,

    /// Program name shown on the card header.
    pub program_name: String,

    /// Card date, `YYYY-MM-DD`.
    pub date: String,

    /// The synthesized description fields. Never empty.
    pub fields: EvidenceFields,

    /// Official rubric categories this evidence supports. At most two.
    pub rubric: Vec<RubricMatch>,

    /// The image slots, in upload order.
    pub images: Vec<ImageSlot>,

    /// Which strategy produced the fields.
    pub tier: SynthesisTier,

    /// Operator-facing diagnostics: OCR failures, LLM fallbacks, and the
    /// like. Useful when troubleshooting why a card used fallback text.
    pub diagnostics: Vec<String>,
}

/// Render binary image data as a `data:` URL for inline display.
pub fn preview_data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(data))
}
