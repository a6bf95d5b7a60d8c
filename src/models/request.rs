use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GradingError, GradingResult};
use crate::models::grade::GradeResult;
use crate::models::rubric::Rubric;

/// 生成参数
///
/// 未设置的参数不会发送给服务商（部分模型会直接拒绝这些参数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

impl TuningParams {
    /// 检查参数范围
    pub fn validate(&self) -> GradingResult<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GradingError::invalid_request(format!(
                    "temperature {} 超出范围 [0, 2]",
                    t
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(GradingError::invalid_request(format!(
                    "top_p {} 超出范围 (0, 1]",
                    p
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(GradingError::invalid_request("max_tokens 必须大于 0"));
        }
        Ok(())
    }
}

/// 引用提示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotingMode {
    /// 引用可选
    Optional,
    /// 必须给出 1-5 条引用
    Required,
    /// 上一次因缺少引用被拒绝后的重试，措辞更强硬
    RequiredRetry,
}

/// 引用策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotingPolicy {
    pub required: bool,
    pub max_retries: u32,
}

impl Default for QuotingPolicy {
    fn default() -> Self {
        Self {
            required: true,
            max_retries: 2,
        }
    }
}

impl QuotingPolicy {
    pub fn optional() -> Self {
        Self {
            required: false,
            max_retries: 0,
        }
    }

    /// 第 `attempt` 次尝试（从 0 开始）使用的提示模式
    pub fn mode_for_attempt(&self, attempt: u32) -> QuotingMode {
        match (self.required, attempt) {
            (false, _) => QuotingMode::Optional,
            (true, 0) => QuotingMode::Required,
            (true, _) => QuotingMode::RequiredRetry,
        }
    }
}

/// 派发模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 按并发数分批，每批全部完成后再开始下一批
    #[default]
    FixedBatch,
    /// 所有任务共用一个准入闸门，边完成边汇报进度
    Streaming,
}

/// 批量评分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    /// 样本文件路径（仅命令行使用）
    #[serde(default)]
    pub file_path: Option<String>,
    pub sample_ids: Vec<u64>,
    /// 自定义评分标准，与 `preset` 二选一
    #[serde(default)]
    pub rubric: Option<Rubric>,
    /// 预置评分标准键名
    #[serde(default)]
    pub preset: Option<String>,
    pub provider: String,
    pub model: String,
    /// 显式指定的密钥，缺省时读取环境变量
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub quote_required: Option<bool>,
    #[serde(default)]
    pub max_quote_retries: Option<u32>,
    #[serde(default)]
    pub tuning: TuningParams,
    #[serde(default)]
    pub mode: DispatchMode,
}

impl GradeRequest {
    pub fn new(
        sample_ids: Vec<u64>,
        rubric: Rubric,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            file_path: None,
            sample_ids,
            rubric: Some(rubric),
            preset: None,
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            concurrency: None,
            quote_required: None,
            max_quote_retries: None,
            tuning: TuningParams::default(),
            mode: DispatchMode::default(),
        }
    }

    /// 解析评分标准（自定义优先于预置）
    pub fn resolve_rubric(&self) -> GradingResult<Rubric> {
        if let Some(rubric) = &self.rubric {
            return Ok(rubric.clone());
        }
        match &self.preset {
            Some(key) => Rubric::preset(key)
                .ok_or_else(|| GradingError::invalid_request(format!("未知的预置指标: {}", key))),
            None => Err(GradingError::invalid_request("未指定 rubric 或 preset")),
        }
    }
}

/// 单个样本的错误记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleError {
    pub sample_id: u64,
    pub error: String,
}

/// 同步评分响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub graded_count: usize,
    pub errors: Vec<SampleError>,
    pub grades: BTreeMap<u64, GradeResult>,
}

impl GradeResponse {
    /// 成功与失败的样本总数
    pub fn total(&self) -> usize {
        self.grades.len() + self.errors.len()
    }
}

/// 流式评分事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GradingEvent {
    Progress {
        completed: usize,
        total: usize,
        timestamp: String,
    },
    Complete(GradeResponse),
    Error {
        message: String,
    },
}

impl GradingEvent {
    pub fn progress(completed: usize, total: usize) -> Self {
        GradingEvent::Progress {
            completed,
            total,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
