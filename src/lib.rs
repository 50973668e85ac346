//! Build printable "evidence cards" from classroom activity photos.
//!
//! A card starts as one or two photographs of physical evidence (worksheets,
//! activity logs). Each photo is downsampled and re-encoded ([`normalize`]),
//! sent to an OCR provider ([`ocr`]), and the extracted text is cleaned
//! ([`clean`]) and handed to a structured-field synthesizer ([`synthesize`])
//! which asks an LLM for formal Arabic descriptions and rubric matches,
//! falling back to template text whenever a provider is unavailable or
//! misbehaves. The finished [`card::EvidenceCard`] is a plain serializable
//! record; rendering it to HTML or print is the caller's business.
//!
//! Both providers are optional: with no credentials configured, the pipeline
//! still produces a fully populated card from fallback text, and makes no
//! network calls at all.

pub mod card;
pub mod clean;
pub mod cmd;
pub mod fields;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod prelude;
pub mod prompt;
pub mod recover;
pub mod retry;
pub mod stash;
pub mod synthesize;
