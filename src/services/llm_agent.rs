use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, Role, CreateChatCompletionRequest,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    },
    Client,
};
use futures::future::{BoxFuture, FutureExt};

use crate::config::Config;
use crate::error::AppError;

/// Substrings that identify a rejected credential in a service error message.
const CREDENTIAL_SIGNATURES: [&str; 5] = [
    "api key not valid",
    "incorrect api key",
    "invalid_api_key",
    "invalid api key",
    "unauthorized",
];

/// The remote text-generation model: one prompt in, one answer or one error out.
///
/// Failures are reported as `AppError::LlmError` carrying the raw service message; callers
/// turn them into user-facing errors with [`classify_failure`].
pub trait AnalysisService: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, AppError>>;
}

pub struct OpenAiAnalyst {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalyst {
    pub fn new(config: &Config) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(config.openai_key.as_str());
        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base.as_str());
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
                role: Role::User,
            },
        )];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.2),
            ..Default::default()
        };

        let start = std::time::Instant::now();
        tracing::info!("Sending analysis request to {} ({} chars)", self.model, prompt.len());

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| {
                tracing::error!("Analysis request failed: {}", e);
                AppError::LlmError(e.to_string())
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LlmError("model returned no content".to_string()))?;

        tracing::info!("Analysis response received in {:?}", start.elapsed());
        Ok(content)
    }
}

impl AnalysisService for OpenAiAnalyst {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, AppError>> {
        self.complete(prompt).boxed()
    }
}

/// Maps a raw service failure to the error shown to the user.
pub fn classify_failure(raw: &str) -> AppError {
    let lower = raw.to_lowercase();
    if CREDENTIAL_SIGNATURES.iter().any(|signature| lower.contains(signature)) {
        AppError::InvalidCredential
    } else {
        AppError::AnalysisRequestFailed
    }
}

/// Anything other than a raw service failure passes through unchanged.
pub fn user_facing(err: AppError) -> AppError {
    match err {
        AppError::LlmError(raw) => classify_failure(&raw),
        other => other,
    }
}
