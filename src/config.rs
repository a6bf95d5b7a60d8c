use std::collections::BTreeMap;

/// 各服务商对应的密钥环境变量
pub const API_KEY_ENV_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
];

/// 通用网关的最小超时（秒）
pub const MIN_GATEWAY_TIMEOUT_SECS: u64 = 120;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时评分的样本数量
    pub max_concurrency: usize,
    /// 是否要求模型给出引用
    pub quote_required: bool,
    /// 缺少引用时的最大重试次数
    pub max_quote_retries: u32,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 命令行读取的评分请求文件
    pub request_file: String,
    /// 评分结果输出目录名（位于样本文件同级）
    pub output_dir: String,
    // --- 服务商端点 ---
    pub openai_api_base: String,
    pub anthropic_api_base: String,
    pub google_api_base: String,
    pub openrouter_api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            quote_required: true,
            max_quote_retries: 2,
            request_timeout_secs: MIN_GATEWAY_TIMEOUT_SECS,
            verbose_logging: false,
            request_file: "grade_request.toml".to_string(),
            output_dir: "viz".to_string(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            anthropic_api_base: "https://api.anthropic.com/v1".to_string(),
            google_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            openrouter_api_base: "https://openrouter.ai/api/v1".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrency: std::env::var("MAX_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrency),
            quote_required: std::env::var("QUOTE_REQUIRED").ok().and_then(|v| v.parse().ok()).unwrap_or(default.quote_required),
            max_quote_retries: std::env::var("MAX_QUOTE_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_quote_retries),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            request_file: std::env::var("REQUEST_FILE").unwrap_or(default.request_file),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            openai_api_base: std::env::var("OPENAI_API_BASE").unwrap_or(default.openai_api_base),
            anthropic_api_base: std::env::var("ANTHROPIC_API_BASE").unwrap_or(default.anthropic_api_base),
            google_api_base: std::env::var("GOOGLE_API_BASE").unwrap_or(default.google_api_base),
            openrouter_api_base: std::env::var("OPENROUTER_API_BASE").unwrap_or(default.openrouter_api_base),
        }
    }

    /// 服务商对应的密钥环境变量名
    pub fn api_key_env_var(provider: &str) -> Option<&'static str> {
        API_KEY_ENV_VARS
            .iter()
            .find(|(name, _)| *name == provider)
            .map(|(_, var)| *var)
    }

    /// 从环境变量读取服务商密钥（空字符串视为未设置）
    pub fn env_api_key(provider: &str) -> Option<String> {
        Self::api_key_env_var(provider)
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// 各服务商是否已在环境中配置密钥
    pub fn available_credentials() -> BTreeMap<&'static str, bool> {
        API_KEY_ENV_VARS
            .iter()
            .map(|(provider, _)| (*provider, Self::env_api_key(provider).is_some()))
            .collect()
    }
}
