//! Inference boundary: send the normalised photo to the VLM and race a timeout.
//!
//! The hosted model is treated as an opaque request/response service behind
//! the [`InferenceBackend`] trait. [`LlmBackend`] is the production
//! implementation over `edgequake_llm`; tests plug in their own.
//!
//! ## Timeout semantics
//!
//! Exactly one request is issued per attempt. It is raced against a timer
//! with `tokio::select!`; whichever settles first wins. When the timer wins
//! the request future is dropped on the spot, so a response that arrives
//! later can never be observed or written anywhere. Whether the transport
//! actually aborts the HTTP call is up to the provider.
//!
//! There are no retries: every failure ends the attempt.

use crate::analysis::AnalysisResult;
use crate::config::LensConfig;
use crate::error::LensError;
use crate::pipeline::encode::NormalizedImage;
use crate::pipeline::parse::parse_response;
use crate::prompts::ANALYSIS_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Model used when a provider is named without an explicit model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Something that turns a photo plus an instruction into reply text.
pub trait InferenceBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Issue one request. Transport failures map to [`LensError::Transport`].
    fn complete<'a>(
        &'a self,
        image: &'a NormalizedImage,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LensError>>;
}

/// [`InferenceBackend`] over an `edgequake_llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    label: String,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &LensConfig) -> Self {
        let label = format!(
            "{}/{}",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        Self {
            provider,
            options: build_options(config),
            label,
        }
    }

    /// Resolve the provider described by `config` and wrap it.
    pub fn from_config(config: &LensConfig) -> Result<Self, LensError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

impl InferenceBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete<'a>(
        &'a self,
        image: &'a NormalizedImage,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LensError>> {
        Box::pin(async move {
            // One user turn: the photo plus the instruction text.
            let messages = vec![ChatMessage::user_with_images(
                prompt,
                vec![image.to_image_data()],
            )];

            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| LensError::Transport {
                    message: e.to_string(),
                })?;

            debug!(
                "{} input tokens, {} output tokens",
                response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        })
    }
}

/// Build `CompletionOptions` from the config.
fn build_options(config: &LensConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Run one analysis request against `backend`, bounded by `timeout`.
pub async fn request_analysis(
    backend: &dyn InferenceBackend,
    image: &NormalizedImage,
    prompt: &str,
    timeout: Duration,
) -> Result<AnalysisResult, LensError> {
    let start = Instant::now();
    info!(
        "Sending {} byte photo to {} (timeout {:?})",
        image.bytes().len(),
        backend.name(),
        timeout
    );

    let request = backend.complete(image, prompt);
    let reply = tokio::select! {
        reply = request => reply,
        _ = sleep(timeout) => {
            warn!(
                "No reply from {} within {:?}; abandoning request",
                backend.name(),
                timeout
            );
            return Err(LensError::Timeout {
                secs: timeout.as_secs(),
            });
        }
    };

    let text = reply?;
    debug!("Reply after {:?}: {} chars", start.elapsed(), text.len());
    parse_response(&text)
}

/// The prompt to send: the config override or the built-in one.
pub fn prompt_for(config: &LensConfig) -> &str {
    config.system_prompt.as_deref().unwrap_or(ANALYSIS_PROMPT)
}

/// Resolve the LLM provider from config.
///
/// Resolution order:
/// 1. An explicit `provider` instance.
/// 2. `provider_name` plus `model` (default [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. `ProviderFactory::from_env`, which picks the first API key it finds.
pub fn resolve_provider(config: &LensConfig) -> Result<Arc<dyn LLMProvider>, LensError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| LensError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY: {e}"
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LensError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LensError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
