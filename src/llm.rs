//! LLM provider access.
//!
//! The synthesizer never talks to `async_openai` directly: it goes through
//! the [`ChatDriver`] seam, so tests can script responses and count calls,
//! and so "no credential configured" is an explicit [`LlmBackend`] state
//! instead of a client that fails at request time.

use std::{fmt, sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use async_trait::async_trait;
use clap::Args;
use tokio::time;

use crate::prelude::*;

/// Our LLM-related options.
#[derive(Args, Clone, Debug)]
pub struct LlmOpts {
    /// The model used to synthesize card fields.
    #[clap(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Sampling temperature. Kept low so card wording stays stable between
    /// runs on the same evidence.
    #[clap(long, default_value = "0.25")]
    pub temperature: f32,

    /// Timeout, in seconds, for the synthesis request.
    #[clap(id = "llm_timeout", long = "llm-timeout", default_value = "45")]
    pub timeout: u64,
}

impl Default for LlmOpts {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            temperature: 0.25,
            timeout: 45,
        }
    }
}

/// A single JSON-producing chat request.
#[derive(Clone, Debug)]
pub struct ChatJsonRequest {
    /// The model to use.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// The system message.
    pub system: String,

    /// The user message.
    pub user: String,
}

/// Interface trait for LLM access.
///
/// Implementations run the request and return the raw message content,
/// which the caller parses as JSON (leniently; see [`crate::recover`]).
#[async_trait]
pub trait ChatDriver: fmt::Debug + Send + Sync + 'static {
    /// Run one chat request with a hard deadline.
    async fn chat_json(&self, req: &ChatJsonRequest, timeout: Duration) -> Result<String>;
}

/// Production driver for OpenAI-compatible endpoints.
#[derive(Debug)]
pub struct OpenAiDriver {
    /// The OpenAI client.
    client: Client<OpenAIConfig>,
}

impl OpenAiDriver {
    /// Create a driver configured from `OPENAI_API_KEY` and
    /// `OPENAI_API_BASE`.
    pub fn from_env() -> Self {
        let mut config = OpenAIConfig::new();
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config = config.with_api_key(api_key);
        }
        if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
            config = config.with_api_base(api_base);
        }
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl ChatDriver for OpenAiDriver {
    #[instrument(level = "debug", skip_all, fields(model = %req.model))]
    async fn chat_json(&self, req: &ChatJsonRequest, timeout: Duration) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(req.system.clone())
                .build()
                .context("error building system message")?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(req.user.clone())
                .build()
                .context("error building user message")?
                .into(),
        ];

        // Ask the endpoint for a bare JSON object, to cut down on prose
        // leaking around the payload.
        let request = CreateChatCompletionRequestArgs::default()
            .model(req.model.clone())
            .messages(messages)
            .temperature(req.temperature)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .context("error building chat request")?;
        trace!(?request, "chat request");

        let response = time::timeout(timeout, self.client.chat().create(request))
            .await
            .map_err(|_| anyhow!("LLM request timed out after {}s", timeout.as_secs()))?
            .context("LLM request failed")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no choices in LLM response"))?;
        let content = choice.message.content.unwrap_or_default();
        debug!(%content, "chat response content");
        Ok(content)
    }
}

/// The synthesizer's handle on the LLM provider: either a constructed
/// driver, or an explicit "not configured" state.
#[derive(Clone, Debug)]
pub enum LlmBackend {
    /// No credential. The synthesizer must not make network calls.
    Disabled,

    /// A live driver plus its options.
    Enabled {
        /// The driver to call.
        driver: Arc<dyn ChatDriver>,
        /// Model, temperature, and timeout.
        opts: LlmOpts,
    },
}

impl LlmBackend {
    /// Build from the environment: disabled unless `OPENAI_API_KEY` is set
    /// and non-empty.
    pub fn from_env(opts: LlmOpts) -> Self {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => LlmBackend::Enabled {
                driver: Arc::new(OpenAiDriver::from_env()),
                opts,
            },
            _ => {
                debug!("OPENAI_API_KEY not set; LLM synthesis disabled");
                LlmBackend::Disabled
            }
        }
    }
}
