//! 服务商适配层
//!
//! 每个服务商一个实现，统一到 `GradingClient` 契约之后。
//! 各实现只在鉴权头、请求结构、生成参数的位置和回复文本的提取方式上不同；
//! 提示词构建与回复解析是各实现共同调用的 `services` 能力，而不是继承来的状态。

pub mod anthropic_client;
pub mod capability;
pub mod google_client;
pub mod http;
pub mod openai_client;
pub mod openrouter_client;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{GradingError, GradingResult};
use crate::models::{Conversation, GradeResult, QuotingMode, Rubric, TuningParams};
use crate::services::{build_grading_prompt, parse_verdict};

pub use anthropic_client::AnthropicClient;
pub use google_client::GoogleClient;
pub use openai_client::OpenAiClient;
pub use openrouter_client::OpenRouterClient;

/// 评分服务商契约
#[async_trait]
pub trait GradingClient: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// 对一段对话评分
    ///
    /// 网络 / 鉴权 / 限流失败返回 `GradingError::Provider`，回复无法解析返回 `GradingError::Parse`
    async fn grade(
        &self,
        conversation: &Conversation,
        rubric: &Rubric,
        mode: QuotingMode,
    ) -> GradingResult<GradeResult>;
}

/// 支持的服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    /// OpenAI 兼容的通用网关
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::OpenRouter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    /// 该服务商在配置中的 API 端点
    pub fn api_base(self, config: &Config) -> &str {
        match self {
            ProviderKind::OpenAi => &config.openai_api_base,
            ProviderKind::Anthropic => &config.anthropic_api_base,
            ProviderKind::Google => &config.google_api_base,
            ProviderKind::OpenRouter => &config.openrouter_api_base,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| GradingError::UnknownProvider {
                name: s.to_string(),
                supported: ProviderKind::ALL.map(|k| k.as_str()).join(", "),
            })
    }
}

/// 创建客户端所需的参数
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_key: String,
    pub model: String,
    pub tuning: TuningParams,
    pub api_base: String,
    pub timeout: Duration,
}

impl ClientSettings {
    pub fn new(
        kind: ProviderKind,
        config: &Config,
        api_key: impl Into<String>,
        model: impl Into<String>,
        tuning: TuningParams,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            tuning,
            api_base: kind.api_base(config).trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// 按服务商创建客户端
pub fn create_client(kind: ProviderKind, settings: ClientSettings) -> Arc<dyn GradingClient> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(settings)),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(settings)),
        ProviderKind::Google => Arc::new(GoogleClient::new(settings)),
        ProviderKind::OpenRouter => Arc::new(OpenRouterClient::new(settings)),
    }
}

/// 构建评分提示词（各客户端共用）
pub(crate) fn grading_prompt(
    conversation: &Conversation,
    rubric: &Rubric,
    mode: QuotingMode,
) -> String {
    build_grading_prompt(conversation, rubric, mode)
}

/// 把模型回复文本解析为评分结果（各客户端共用）
pub(crate) fn finish_grade(raw: &str, rubric: &Rubric, model: &str) -> GradingResult<GradeResult> {
    let verdict = parse_verdict(raw, rubric.grade_type)?;
    Ok(verdict.into_result(model))
}
