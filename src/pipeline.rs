//! End-to-end orchestration: normalize, OCR, clean, synthesize.

use chrono::Local;
use futures::future;
use tokio::task;

use crate::{
    card::{CardRequest, EvidenceCard, ImageSlot, ImageUpload, preview_data_url},
    clean,
    llm::{LlmBackend, LlmOpts},
    normalize::{self, NormalizeOpts},
    ocr::{ExtractionResult, OcrClient, OcrOpts},
    prelude::*,
    synthesize::{SynthesisHints, Synthesizer},
};

/// Largest upload we accept, per image.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default program name when the caller supplies none.
const DEFAULT_PROGRAM_NAME: &str = "برنامج دعم التعلم الصفي";

/// The full evidence pipeline.
#[derive(Debug)]
pub struct Pipeline {
    normalize_opts: NormalizeOpts,
    ocr: OcrClient,
    synthesizer: Synthesizer,
}

/// What one image slot produced: its card entry plus any text.
struct SlotOutcome {
    slot: ImageSlot,
    text: String,
}

impl Pipeline {
    /// Create a pipeline from explicit parts.
    pub fn new(
        normalize_opts: NormalizeOpts,
        ocr: OcrClient,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            normalize_opts,
            ocr,
            synthesizer,
        }
    }

    /// Create a pipeline using environment credentials for both providers.
    pub fn from_env(ocr_opts: OcrOpts, llm_opts: LlmOpts) -> Self {
        Self::new(
            NormalizeOpts::default(),
            OcrClient::from_env(ocr_opts),
            Synthesizer::new(LlmBackend::from_env(llm_opts)),
        )
    }

    /// Build an evidence card from a request.
    ///
    /// Only zero or too many images fail the request as a whole. Anything
    /// wrong with a single image (unreadable bytes, oversized payload, OCR
    /// failure) is reported on that image's slot while the other slot is
    /// still processed.
    #[instrument(level = "debug", skip_all, fields(teacher = %request.teacher))]
    pub async fn process(&self, request: CardRequest) -> Result<EvidenceCard> {
        let CardRequest {
            teacher,
            subject,
            school,
            principal,
            program_name,
            program_description,
            images,
        } = request;

        if images.is_empty() {
            return Err(anyhow!("at least one evidence photo is required"));
        }
        if images.len() > 2 {
            return Err(anyhow!(
                "at most two evidence photos are supported, got {}",
                images.len()
            ));
        }

        // The slots share no state, so they run concurrently.
        let outcomes =
            future::join_all(images.into_iter().map(|upload| self.process_slot(upload)))
                .await;

        let mut slots = Vec::new();
        let mut texts = Vec::new();
        let mut diagnostics = Vec::new();
        for outcome in outcomes {
            let outcome = outcome?;
            if let Some(error) = &outcome.slot.error {
                diagnostics.push(format!("{}: {}", outcome.slot.filename, error));
            }
            if !outcome.text.is_empty() {
                texts.push(outcome.text);
            }
            slots.push(outcome.slot);
        }

        let cleaned = clean::clean(&texts.join("\n"));
        let hints = SynthesisHints {
            teacher: teacher.clone(),
            subject: subject.clone(),
            school: school.clone(),
            program_name: program_name.clone(),
            program_description,
        };
        let synthesis = self.synthesizer.synthesize(&cleaned, &hints).await;
        diagnostics.extend(synthesis.diagnostics);

        Ok(EvidenceCard {
            teacher,
            subject,
            school,
            principal,
            program_name: program_name
                .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_owned()),
            date: Local::now().format("%Y-%m-%d").to_string(),
            fields: synthesis.fields,
            rubric: synthesis.rubric,
            images: slots,
            tier: synthesis.tier,
            diagnostics,
        })
    }

    /// Normalize and OCR one upload. Failures stay on the slot.
    #[instrument(level = "debug", skip_all, fields(filename = %upload.filename))]
    async fn process_slot(&self, upload: ImageUpload) -> Result<SlotOutcome> {
        let ImageUpload { filename, bytes } = upload;

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Ok(SlotOutcome {
                slot: ImageSlot {
                    filename,
                    preview: None,
                    error: Some(format!(
                        "image is too large ({} bytes; the limit is {MAX_UPLOAD_BYTES})",
                        bytes.len()
                    )),
                },
                text: String::new(),
            });
        }

        // Decoding and re-encoding is CPU-bound; keep it off the async
        // executor.
        let opts = self.normalize_opts.clone();
        let task_filename = filename.clone();
        let normalized =
            task::spawn_blocking(move || normalize::normalize(&task_filename, &bytes, &opts))
                .await
                .context("image normalization task panicked")?;
        let normalized = match normalized {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, "could not normalize upload");
                return Ok(SlotOutcome {
                    slot: ImageSlot {
                        filename,
                        preview: None,
                        error: Some(err.to_string()),
                    },
                    text: String::new(),
                });
            }
        };

        let preview = preview_data_url(normalized.content_type, &normalized.bytes);
        let ExtractionResult { text, error } = self.ocr.extract_text(&normalized).await;
        Ok(SlotOutcome {
            slot: ImageSlot {
                filename,
                preview: Some(preview),
                error,
            },
            text,
        })
    }
}
