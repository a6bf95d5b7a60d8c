use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::rubric::GradeType;

/// 评分提示词协议版本
pub const PROMPT_VERSION: &str = "v1";

/// 支撑评分的引用片段
///
/// `end` 不含；`text` 与消息内容 `[start, end)` 是否一致不在此校验
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub message_index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// 按评分类型区分的评分值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GradeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl GradeValue {
    pub fn grade_type(&self) -> GradeType {
        match self {
            GradeValue::Bool(_) => GradeType::Bool,
            GradeValue::Int(_) => GradeType::Int,
            GradeValue::Float(_) => GradeType::Float,
        }
    }
}

/// 一次评分尝试解析出的裁决（尚未经过引用策略判断）
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub grade: GradeValue,
    pub quotes: Vec<Quote>,
    pub explanation: String,
}

impl Verdict {
    /// 补充模型与时间信息，生成最终结果
    pub fn into_result(self, model: impl Into<String>) -> GradeResult {
        GradeResult {
            grade_type: self.grade.grade_type(),
            grade: self.grade,
            quotes: self.quotes,
            explanation: self.explanation,
            model: model.into(),
            prompt_version: PROMPT_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// 单次评分调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: GradeValue,
    pub grade_type: GradeType,
    /// 按模型返回顺序排列，可能为空
    pub quotes: Vec<Quote>,
    pub explanation: String,
    pub model: String,
    pub prompt_version: String,
    /// RFC 3339 完成时间
    pub timestamp: String,
}

impl GradeResult {
    pub fn has_quotes(&self) -> bool {
        !self.quotes.is_empty()
    }
}
