use thiserror::Error;

/// 评分错误类型
///
/// 分为两类：
/// - 批次级（`CredentialMissing` / `UnknownProvider` / `InvalidRequest`）：在派发前报告一次，整批终止
/// - 任务级（`UnknownSample` / `Provider` / `Parse`）：只影响单个样本，记入批次错误列表
#[derive(Debug, Error)]
pub enum GradingError {
    /// 找不到可用的 API 密钥
    #[error("未提供 {provider} 的 API 密钥，环境变量 {env_var} 也未设置")]
    CredentialMissing { provider: String, env_var: String },

    /// 未知的服务商
    #[error("未知的服务商: {name} (支持: {supported})")]
    UnknownProvider { name: String, supported: String },

    /// 样本不存在
    #[error("样本 {sample_id} 不存在")]
    UnknownSample { sample_id: u64 },

    /// 请求参数不合法
    #[error("请求参数不合法: {reason}")]
    InvalidRequest { reason: String },

    /// 服务商调用错误
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// 模型回复解析错误
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl GradingError {
    /// 是否为批次级错误（需要在派发前终止整批）
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            GradingError::CredentialMissing { .. }
                | GradingError::UnknownProvider { .. }
                | GradingError::InvalidRequest { .. }
        )
    }

    /// 创建参数错误
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        GradingError::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// 服务商调用错误（网络、鉴权、限流、非 2xx 响应）
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 网络请求失败
    #[error("{provider} 请求失败: {source}")]
    RequestFailed {
        provider: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 返回非 2xx 状态码
    #[error("{provider} 返回错误状态 {status}: {body}")]
    BadStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// 请求频率限制
    #[error("{provider} 请求频率限制, 建议等待: {retry_after:?}秒")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<u64>,
    },

    /// 无法拼出合法的请求地址
    #[error("{provider} 请求地址不合法: {url}")]
    InvalidEndpoint { provider: &'static str, url: String },

    /// 创建网络客户端失败
    #[error("{provider} 客户端创建失败: {source}")]
    ClientBuild {
        provider: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ProviderError {
    /// 创建网络请求失败错误
    pub fn request_failed(
        provider: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ProviderError::RequestFailed {
            provider,
            source: Box::new(source),
        }
    }
}

/// 模型回复解析错误
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// 回复中找不到 JSON 对象
    #[error("无法从回复中解析出 JSON 对象: {snippet}")]
    NoJsonObject { snippet: String },

    /// JSON 顶层不是对象
    #[error("回复 JSON 不是对象: {snippet}")]
    NotAnObject { snippet: String },

    /// grade 无法转换为声明的类型
    #[error("grade 值 {value} 无法转换为 {grade_type}")]
    GradeNotCoercible { grade_type: String, value: String },
}

/// 评分结果类型
pub type GradingResult<T> = Result<T, GradingError>;
