//! Anthropic 评分客户端（Messages API）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::clients::http::{build_http_client, send_json};
use crate::clients::{finish_grade, grading_prompt, ClientSettings, GradingClient, ProviderKind};
use crate::error::{GradingResult, ProviderError};
use crate::models::{Conversation, GradeResult, QuotingMode, Rubric};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
/// Messages API 要求必须给出 max_tokens
const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<UserMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// 拼接所有文本块；没有文本时为空字符串
    fn into_text(self) -> String {
        self.content.into_iter().filter_map(|b| b.text).collect()
    }
}

/// Anthropic 客户端
pub struct AnthropicClient {
    settings: ClientSettings,
    http: OnceCell<reqwest::Client>,
}

impl AnthropicClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            http: OnceCell::new(),
        }
    }

    fn build_body<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        let tuning = self.settings.tuning;
        MessagesRequest {
            model: &self.settings.model,
            max_tokens: tuning.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![UserMessage {
                role: "user",
                content: prompt,
            }],
            temperature: tuning.temperature,
            top_p: tuning.top_p,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let http = self
            .http
            .get_or_try_init(|| async { build_http_client(PROVIDER, self.settings.timeout) })
            .await?;

        let request = http
            .post(format!("{}/messages", self.settings.api_base))
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", API_VERSION);

        let response: MessagesResponse =
            send_json(PROVIDER, request, &self.build_body(prompt)).await?;

        Ok(response.into_text())
    }
}

#[async_trait]
impl GradingClient for AnthropicClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
        debug!("调用 Anthropic，模型: {}", self.settings.model);

        let text = self.complete(&prompt).await?;
        finish_grade(&text, rubric, &self.settings.model)
    }
}
