//! 模型能力判断
//!
//! 推理模型（o1 / o3 / o4-mini 系列）不接受结构化输出提示、temperature 和 top_p，
//! 发送这些参数会被服务商直接拒绝；输出长度上限使用 `max_completion_tokens`。

/// 推理模型前缀
pub const REASONING_MODEL_PREFIXES: &[&str] = &["o1", "o3", "o4-mini"];

/// 输出长度参数名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxTokensParam {
    MaxTokens,
    MaxCompletionTokens,
}

impl MaxTokensParam {
    pub fn as_str(self) -> &'static str {
        match self {
            MaxTokensParam::MaxTokens => "max_tokens",
            MaxTokensParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

/// 按模型 ID 推断的请求能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// 是否可以发送 JSON 输出提示
    pub structured_output: bool,
    /// 是否可以发送 temperature / top_p
    pub sampling_params: bool,
    pub max_tokens_param: MaxTokensParam,
}

impl ModelCapabilities {
    pub fn detect(model: &str) -> Self {
        if is_reasoning_model(model) {
            Self {
                structured_output: false,
                sampling_params: false,
                max_tokens_param: MaxTokensParam::MaxCompletionTokens,
            }
        } else {
            Self {
                structured_output: true,
                sampling_params: true,
                max_tokens_param: MaxTokensParam::MaxTokens,
            }
        }
    }
}

/// 是否为推理模型（网关 ID 可带 `openai/` 前缀）
pub fn is_reasoning_model(model: &str) -> bool {
    let bare = model.strip_prefix("openai/").unwrap_or(model);
    REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| bare.starts_with(prefix))
}
