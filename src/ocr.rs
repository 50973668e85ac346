//! Client for the OCR provider.
//!
//! The provider is reliable about *answering* but unreliable about
//! *succeeding*, so the policy here is careful about which failures get a
//! second chance: transport-level trouble (timeouts, gateway errors) is
//! retried with linear backoff, while a provider that affirmatively rejects
//! the image content is taken at its word and not retried.

use std::{error, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use clap::Args;
use reqwest::multipart::{Form, Part};
use schemars::JsonSchema;
use tokio::time;

use crate::{
    normalize::NormalizedImage,
    prelude::*,
    retry::{IsKnownTransient, backoff_delay},
};

/// Default OCR provider endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.ocr.space/parse/image";

/// Base delay for linear retry backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(900);

/// Our OCR-related options.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// How many extra attempts to make after a failed OCR transport call.
    #[clap(long = "ocr-retries", default_value = "2")]
    pub max_retries: u32,

    /// Timeout, in seconds, for a single OCR request.
    #[clap(id = "ocr_timeout", long = "ocr-timeout", default_value = "30")]
    pub timeout: u64,
}

impl Default for OcrOpts {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: 30,
        }
    }
}

/// OCR provider credential.
///
/// An explicit state rather than an `Option`, so "not configured" shows up
/// by name at every use site.
#[derive(Clone, Debug)]
pub enum OcrCredential {
    /// No credential configured. The client will not touch the network.
    Missing,

    /// An API key for the provider.
    Key(String),
}

impl OcrCredential {
    /// Read the credential from `OCR_SPACE_API_KEY`.
    pub fn from_env() -> Self {
        match std::env::var("OCR_SPACE_API_KEY") {
            Ok(key) if !key.trim().is_empty() => OcrCredential::Key(key),
            _ => OcrCredential::Missing,
        }
    }
}

/// Outcome of OCRing one image.
///
/// Exactly one of `text` and `error` is populated on terminal failure. Both
/// empty means the provider affirmatively parsed nothing, which is a valid
/// outcome distinct from failure, and callers must not treat it as an error.
#[derive(Clone, Debug, Default, JsonSchema, Serialize)]
pub struct ExtractionResult {
    /// The extracted text. Empty on failure or on empty success.
    pub text: String,

    /// A human-readable failure message. Set exclusively on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// A terminal failure with no usable text.
    fn failed(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(message.into()),
        }
    }
}

/// Wire format of the provider's response. Only the fields we rely on.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrResponse {
    /// Did the provider fail to process the image?
    #[serde(default)]
    pub is_errored_on_processing: bool,

    /// Error details. See [`ErrorMessages`] for the shape.
    #[serde(default)]
    pub error_message: Option<ErrorMessages>,

    /// Per-region parse results. May be empty on success.
    #[serde(default)]
    pub parsed_results: Vec<ParsedResult>,
}

/// The provider reports `ErrorMessage` as either a bare string or an array
/// of strings, depending on the failure.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessages {
    /// A single message.
    One(String),

    /// Several messages.
    Many(Vec<String>),
}

impl ErrorMessages {
    /// All messages joined into a single line.
    pub fn joined(&self) -> String {
        match self {
            ErrorMessages::One(message) => message.clone(),
            ErrorMessages::Many(messages) => messages.join("; "),
        }
    }
}

/// One parsed region of the image.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParsedResult {
    /// The text the provider read out of this region.
    #[serde(default)]
    pub parsed_text: String,
}

/// A transport-level failure talking to the provider.
#[derive(Debug)]
pub enum TransportError {
    /// The request did not complete within the deadline.
    Timeout,

    /// The provider answered with a non-success HTTP status.
    Status(reqwest::StatusCode),

    /// The provider answered with success, but the body did not parse as a
    /// response. A provider that does this once tends to keep doing it, so
    /// this is not retried.
    Decode(anyhow::Error),

    /// Any other transport failure (connection refused, TLS).
    Other(anyhow::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "OCR request timed out"),
            TransportError::Status(status) => {
                write!(f, "OCR provider returned HTTP {status}")
            }
            TransportError::Decode(err) => {
                write!(f, "OCR provider returned an unreadable response: {err}")
            }
            TransportError::Other(err) => write!(f, "OCR request failed: {err}"),
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            TransportError::Decode(err) | TransportError::Other(err) => {
                Some(err.as_ref())
            }
            _ => None,
        }
    }
}

impl IsKnownTransient for TransportError {
    fn is_known_transient(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Status(status) => status.is_known_transient(),
            // A 200 with a garbage body will not get better on retry.
            TransportError::Decode(_) => false,
            // `reqwest` doesn't expose enough detail to classify most of
            // these, so assume transient.
            TransportError::Other(_) => true,
        }
    }
}

/// One round trip to the provider.
///
/// Separated from [`OcrClient`] so the retry policy can be exercised against
/// a scripted transport in tests.
#[async_trait]
pub trait OcrTransport: fmt::Debug + Send + Sync + 'static {
    /// Submit one image and return the provider's parsed response.
    async fn submit(
        &self,
        api_key: &str,
        image: &NormalizedImage,
    ) -> Result<OcrResponse, TransportError>;
}

/// The production transport: multipart POST over HTTPS.
#[derive(Debug)]
pub struct HttpOcrTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpOcrTransport {
    /// Create a transport for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl OcrTransport for HttpOcrTransport {
    async fn submit(
        &self,
        api_key: &str,
        image: &NormalizedImage,
    ) -> Result<OcrResponse, TransportError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(image.content_type)
            .map_err(|err| TransportError::Other(err.into()))?;

        // No `language` field, ever: engine 2 auto-detects, and the provider
        // rejects some hint values outright.
        let form = Form::new()
            .text("apikey", api_key.to_owned())
            .text("isOverlayRequired", "false")
            .text("OCREngine", "2")
            .text("scale", "true")
            .part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Other(err.into())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        response.json::<OcrResponse>().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Decode(anyhow::Error::new(err))
            }
        })
    }
}

/// The OCR client: one transport plus the retry policy wrapped around it.
#[derive(Debug)]
pub struct OcrClient {
    credential: OcrCredential,
    transport: Arc<dyn OcrTransport>,
    opts: OcrOpts,
}

impl OcrClient {
    /// Create a client from explicit parts.
    pub fn new(
        credential: OcrCredential,
        transport: Arc<dyn OcrTransport>,
        opts: OcrOpts,
    ) -> Self {
        Self {
            credential,
            transport,
            opts,
        }
    }

    /// Create a client using the environment credential and the production
    /// HTTP transport.
    pub fn from_env(opts: OcrOpts) -> Self {
        let timeout = Duration::from_secs(opts.timeout);
        Self::new(
            OcrCredential::from_env(),
            Arc::new(HttpOcrTransport::new(DEFAULT_ENDPOINT, timeout)),
            opts,
        )
    }

    /// Extract text from one normalized image.
    ///
    /// Never returns `Err`: terminal failures land in the `error` slot of
    /// the result, since one bad image must not abort the whole card.
    #[instrument(level = "debug", skip_all, fields(filename = %image.filename))]
    pub async fn extract_text(&self, image: &NormalizedImage) -> ExtractionResult {
        let api_key = match &self.credential {
            OcrCredential::Key(key) => key.clone(),
            OcrCredential::Missing => {
                debug!("no OCR credential; skipping text extraction");
                return ExtractionResult::failed(
                    "OCR is not configured: set OCR_SPACE_API_KEY to enable text extraction",
                );
            }
        };

        let mut last_error = String::new();
        for attempt in 0..=self.opts.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(BACKOFF_BASE, attempt);
                debug!(attempt, ?delay, "retrying OCR request");
                time::sleep(delay).await;
            }
            match self.transport.submit(&api_key, image).await {
                Ok(response) => return interpret(response),
                Err(err) if err.is_known_transient() => {
                    warn!(attempt, error = %err, "transient OCR transport failure");
                    last_error = err.to_string();
                }
                Err(err) => {
                    error!(error = %err, "fatal OCR transport failure");
                    return ExtractionResult::failed(err.to_string());
                }
            }
        }
        ExtractionResult::failed(last_error)
    }
}

/// Map a provider response onto our result type.
fn interpret(response: OcrResponse) -> ExtractionResult {
    if response.is_errored_on_processing {
        // A content-level rejection. Retrying would return the same answer.
        let message = response
            .error_message
            .map(|messages| messages.joined())
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                "OCR provider reported an unspecified processing error".to_owned()
            });
        return ExtractionResult::failed(message);
    }

    let text = response
        .parsed_results
        .iter()
        .map(|result| result.parsed_text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned();
    // An empty `ParsedResults` list (or all-blank text) is "empty success":
    // the provider found nothing, and that is not an error.
    ExtractionResult { text, error: None }
}
