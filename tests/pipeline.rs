//! End-to-end pipeline tests against scripted providers.
//!
//! No network: the OCR transport and the chat driver are both replaced with
//! in-memory fakes, so these tests pin down the orchestration layer (slot
//! isolation, fallback tiers, field merging) without any credentials.

use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};

use evidence_card::{
    card::{CardRequest, ImageUpload},
    llm::{ChatDriver, ChatJsonRequest, LlmBackend, LlmOpts},
    normalize::{NormalizeOpts, NormalizedImage},
    ocr::{
        OcrClient, OcrCredential, OcrOpts, OcrResponse, OcrTransport, ParsedResult,
        TransportError,
    },
    pipeline::Pipeline,
    synthesize::{SynthesisTier, Synthesizer},
};

/// An OCR transport that always reports the same parsed text.
#[derive(Debug)]
struct FixedTextTransport {
    text: String,
    calls: AtomicUsize,
}

impl FixedTextTransport {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OcrTransport for FixedTextTransport {
    async fn submit(
        &self,
        _api_key: &str,
        _image: &NormalizedImage,
    ) -> Result<OcrResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OcrResponse {
            is_errored_on_processing: false,
            error_message: None,
            parsed_results: vec![ParsedResult {
                parsed_text: self.text.clone(),
            }],
        })
    }
}

/// A chat driver that always answers with the same message content.
#[derive(Debug)]
struct FixedReplyDriver {
    reply: String,
    calls: AtomicUsize,
}

impl FixedReplyDriver {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatDriver for FixedReplyDriver {
    async fn chat_json(
        &self,
        _req: &ChatJsonRequest,
        _timeout: Duration,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Encode a small in-memory PNG.
fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 24, image::Rgb([200, 200, 200]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn pipeline_with(transport: Arc<dyn OcrTransport>, backend: LlmBackend) -> Pipeline {
    Pipeline::new(
        NormalizeOpts::default(),
        OcrClient::new(
            OcrCredential::Key("test-key".to_owned()),
            transport,
            OcrOpts::default(),
        ),
        Synthesizer::new(backend),
    )
}

fn request_with(images: Vec<ImageUpload>) -> CardRequest {
    CardRequest {
        teacher: "أ. سارة".to_owned(),
        subject: "رياضيات".to_owned(),
        school: "مدرسة النور".to_owned(),
        principal: "أ. منى".to_owned(),
        program_name: None,
        program_description: None,
        images,
    }
}

#[tokio::test]
async fn zero_images_is_an_error() {
    let pipeline = pipeline_with(
        Arc::new(FixedTextTransport::new("ignored")),
        LlmBackend::Disabled,
    );
    assert!(pipeline.process(request_with(vec![])).await.is_err());
}

#[tokio::test]
async fn three_images_is_an_error() {
    let pipeline = pipeline_with(
        Arc::new(FixedTextTransport::new("ignored")),
        LlmBackend::Disabled,
    );
    let images = (0..3)
        .map(|i| ImageUpload {
            filename: format!("photo{i}.png"),
            bytes: png_bytes(),
        })
        .collect();
    assert!(pipeline.process(request_with(images)).await.is_err());
}

#[tokio::test]
async fn unreadable_image_fails_only_its_slot() {
    let transport = Arc::new(FixedTextTransport::new("ورقة عمل جمع الكسور"));
    let pipeline = pipeline_with(transport.clone(), LlmBackend::Disabled);

    let images = vec![
        ImageUpload {
            filename: "broken.png".to_owned(),
            bytes: b"not an image at all".to_vec(),
        },
        ImageUpload {
            filename: "worksheet.png".to_owned(),
            bytes: png_bytes(),
        },
    ];
    let card = pipeline.process(request_with(images)).await.unwrap();

    assert_eq!(card.images.len(), 2);
    let broken = &card.images[0];
    assert_eq!(broken.filename, "broken.png");
    assert!(broken.preview.is_none());
    assert!(broken.error.as_deref().unwrap().contains("broken.png"));

    let good = &card.images[1];
    assert_eq!(good.filename, "worksheet.png");
    assert!(good.error.is_none());
    assert!(
        good.preview
            .as_deref()
            .unwrap()
            .starts_with("data:image/jpeg;base64,")
    );

    // Only the readable image reached the provider.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    // The slot failure shows up in the card diagnostics.
    assert!(card.diagnostics.iter().any(|d| d.contains("broken.png")));
}

#[tokio::test]
async fn disabled_llm_uses_heuristic_fields_built_from_ocr_text() {
    let pipeline = pipeline_with(
        Arc::new(FixedTextTransport::new("ورقة عمل جمع الكسور")),
        LlmBackend::Disabled,
    );
    let card = pipeline
        .process(request_with(vec![ImageUpload {
            filename: "worksheet.png".to_owned(),
            bytes: png_bytes(),
        }]))
        .await
        .unwrap();

    assert_eq!(card.tier, SynthesisTier::Heuristic);
    assert!(card.fields.implementation.contains("ورقة عمل جمع الكسور"));
    assert!(card.rubric.is_empty());
    // The default header is filled in when no program name is given.
    assert!(!card.program_name.is_empty());
}

#[tokio::test]
async fn llm_reply_populates_fields_and_rubric() {
    let reply = serde_json::json!({
        "goal": "تنمية مهارة جمع الكسور لدى الطالبات",
        "implementation": "نفذت المعلمة ورشة تدريبية باستخدام أوراق عمل",
        "tools": "أوراق عمل، سبورة تفاعلية",
        "assessment": "تقويم تكويني بملاحظة الأداء",
        "impact": "تحسن ملحوظ في دقة الحل",
        "rubric": [
            {"label": "تنويع استراتيجيات التدريس",
             "justification": "استخدام ورشة عمل تطبيقية"},
            {"label": "ليست فئة رسمية", "justification": "يجب إسقاطها"}
        ]
    })
    .to_string();
    let driver = Arc::new(FixedReplyDriver::new(&reply));
    let backend = LlmBackend::Enabled {
        driver: driver.clone(),
        opts: LlmOpts::default(),
    };
    let pipeline =
        pipeline_with(Arc::new(FixedTextTransport::new("ورقة عمل جمع الكسور")), backend);

    let card = pipeline
        .process(request_with(vec![ImageUpload {
            filename: "worksheet.png".to_owned(),
            bytes: png_bytes(),
        }]))
        .await
        .unwrap();

    assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(card.tier, SynthesisTier::Llm);
    assert_eq!(card.fields.goal, "تنمية مهارة جمع الكسور لدى الطالبات");
    // Unofficial rubric labels are dropped silently.
    assert_eq!(card.rubric.len(), 1);
    assert_eq!(card.rubric[0].label, "تنويع استراتيجيات التدريس");
}

#[tokio::test]
async fn oversized_upload_fails_its_slot_without_reaching_ocr() {
    let transport = Arc::new(FixedTextTransport::new("ignored"));
    let pipeline = pipeline_with(transport.clone(), LlmBackend::Disabled);

    let card = pipeline
        .process(request_with(vec![ImageUpload {
            filename: "huge.png".to_owned(),
            bytes: vec![0u8; evidence_card::pipeline::MAX_UPLOAD_BYTES + 1],
        }]))
        .await
        .unwrap();

    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert!(
        card.images[0]
            .error
            .as_deref()
            .unwrap()
            .contains("too large")
    );
    assert_eq!(card.tier, SynthesisTier::Canonical);
}
