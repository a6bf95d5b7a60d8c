//! OpenRouter 评分客户端
//!
//! 直接请求 OpenAI 兼容的 HTTP 网关，不依赖任何厂商 SDK。
//! 大型评分请求可能很慢，超时不低于 120 秒。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::clients::capability::{MaxTokensParam, ModelCapabilities};
use crate::clients::http::{build_http_client, send_json};
use crate::clients::{finish_grade, grading_prompt, ClientSettings, GradingClient, ProviderKind};
use crate::error::{GradingResult, ProviderError};
use crate::models::{Conversation, GradeResult, QuotingMode, Rubric};

const PROVIDER: &str = "openrouter";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter 网关客户端
pub struct OpenRouterClient {
    settings: ClientSettings,
    capabilities: ModelCapabilities,
    http: OnceCell<reqwest::Client>,
}

impl OpenRouterClient {
    pub fn new(settings: ClientSettings) -> Self {
        let capabilities = ModelCapabilities::detect(&settings.model);
        Self {
            settings,
            capabilities,
            http: OnceCell::new(),
        }
    }

    fn build_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let caps = self.capabilities;
        let tuning = self.settings.tuning;
        let sampling = |v: Option<f32>| v.filter(|_| caps.sampling_params);
        let (max_tokens, max_completion_tokens) = match caps.max_tokens_param {
            MaxTokensParam::MaxTokens => (tuning.max_tokens, None),
            MaxTokensParam::MaxCompletionTokens => (None, tuning.max_tokens),
        };

        ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: sampling(tuning.temperature),
            top_p: sampling(tuning.top_p),
            max_tokens,
            max_completion_tokens,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let http = self
            .http
            .get_or_try_init(|| async { build_http_client(PROVIDER, self.settings.timeout) })
            .await?;

        let request = http
            .post(format!("{}/chat/completions", self.settings.api_base))
            .bearer_auth(&self.settings.api_key);

        let response: ChatResponse =
            send_json(PROVIDER, request, &self.build_body(prompt)).await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl GradingClient for OpenRouterClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn grade(
        &self,
        conversation: &Conversation,
        rubric: &Rubric,
        mode: QuotingMode,
    ) -> GradingResult<GradeResult> {
        let prompt = grading_prompt(conversation, rubric, mode);
        debug!("调用 OpenRouter，模型: {}", self.settings.model);

        let text = self.complete(&prompt).await?;
        finish_grade(&text, rubric, &self.settings.model)
    }
}
