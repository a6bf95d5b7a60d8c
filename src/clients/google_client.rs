//! Google Gemini 评分客户端（generateContent）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::clients::http::{build_http_client, send_json};
use crate::clients::{finish_grade, grading_prompt, ClientSettings, GradingClient, ProviderKind};
use crate::error::{GradingResult, ProviderError};
use crate::models::{Conversation, GradeResult, QuotingMode, Rubric};

const PROVIDER: &str = "google";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// 第一个候选的全部文本；被拦截或没有候选时为空字符串
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

/// 拼出 `{api_base}/models/{model}:generateContent`
///
/// 模型 ID 可带 `models/` 前缀，作为单个路径段编码
fn generate_content_url(api_base: &str, model: &str) -> Result<reqwest::Url, ProviderError> {
    let invalid = || ProviderError::InvalidEndpoint {
        provider: PROVIDER,
        url: format!("{}/models/{}:generateContent", api_base, model),
    };

    let mut url = reqwest::Url::parse(api_base).map_err(|_| invalid())?;
    let model = model.trim_start_matches("models/");
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push("models")
        .push(&format!("{}:generateContent", model));
    Ok(url)
}

/// Google Gemini 客户端
pub struct GoogleClient {
    settings: ClientSettings,
    http: OnceCell<reqwest::Client>,
}

impl GoogleClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            http: OnceCell::new(),
        }
    }

    fn build_body<'a>(&self, prompt: &'a str) -> GenerateContentRequest<'a> {
        let tuning = self.settings.tuning;
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: tuning.temperature,
                max_output_tokens: tuning.max_tokens,
                top_p: tuning.top_p,
            },
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let http = self
            .http
            .get_or_try_init(|| async { build_http_client(PROVIDER, self.settings.timeout) })
            .await?;

        let url = generate_content_url(&self.settings.api_base, &self.settings.model)?;
        let request = http
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key);

        let response: GenerateContentResponse =
            send_json(PROVIDER, request, &self.build_body(prompt)).await?;

        Ok(response.into_text())
    }
}

#[async_trait]
impl GradingClient for GoogleClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
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
        debug!("调用 Gemini，模型: {}", self.settings.model);

        let text = self.complete(&prompt).await?;
        finish_grade(&text, rubric, &self.settings.model)
    }
}
