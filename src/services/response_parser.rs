//! 模型回复解析 - 业务能力层
//!
//! 模型经常不严格遵守要求的 JSON 结构（多余说明文字、代码块包裹、字符串形式的布尔值），
//! 因此回复先按无类型 JSON 树读取，再逐字段转换，而不是直接反序列化到结果结构。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::models::{GradeType, GradeValue, Quote, Verdict};
use crate::utils::truncate_text;

/// 错误信息中保留的回复前缀长度
const SNIPPET_LEN: usize = 200;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[^\n]*(?:\n|$)").expect("valid fence regex"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\n)[ \t]*```[ \t]*$").expect("valid fence regex"));

/// 解析模型回复为裁决
///
/// 顺序：去掉代码块包裹 → 直接解析 → 截取首个 `{` 到最后一个 `}` 再解析 → 失败
pub fn parse_verdict(raw: &str, grade_type: GradeType) -> Result<Verdict, ParseError> {
    let data = extract_json_object(raw)?;

    let grade = coerce_grade(data.get("grade"), grade_type)?;
    let quotes = coerce_quotes(data.get("quotes"));
    let explanation = match data.get("explanation") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok(Verdict {
        grade,
        quotes,
        explanation,
    })
}

/// 去掉开头的 ``` 行和结尾的 ``` 行
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let body = match FENCE_OPEN.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    };
    match FENCE_CLOSE.find(body) {
        Some(m) => &body[..m.start()],
        None => body,
    }
}

fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let text = strip_code_fence(raw);

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => embedded_object(text).ok_or_else(|| ParseError::NoJsonObject {
            snippet: truncate_text(text, SNIPPET_LEN),
        })?,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject {
            snippet: truncate_text(text, SNIPPET_LEN),
        }),
    }
}

fn embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// 按声明的评分类型转换 grade 值
pub fn coerce_grade(value: Option<&Value>, grade_type: GradeType) -> Result<GradeValue, ParseError> {
    let not_coercible = || ParseError::GradeNotCoercible {
        grade_type: grade_type.to_string(),
        value: value
            .map(|v| truncate_text(&v.to_string(), 50))
            .unwrap_or_else(|| "<missing>".to_string()),
    };

    match grade_type {
        GradeType::Bool => Ok(GradeValue::Bool(truthy(value))),
        GradeType::Int => {
            let n = match value {
                Some(Value::Number(n)) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).and_then(float_to_int)),
                Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
                Some(Value::Bool(b)) => Some(i64::from(*b)),
                _ => None,
            };
            n.map(GradeValue::Int).ok_or_else(not_coercible)
        }
        GradeType::Float => {
            let f = match value {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            f.filter(|f| f.is_finite())
                .map(GradeValue::Float)
                .ok_or_else(not_coercible)
        }
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    let t = f.trunc();
    if t >= i64::MIN as f64 && t <= i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

/// 逐条规整引用；单条引用字段缺失时取默认值，不影响整体解析
pub fn coerce_quotes(value: Option<&Value>) -> Vec<Quote> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.as_object())
        .map(|q| Quote {
            message_index: to_index(q.get("message_index")),
            start: to_index(q.get("start")),
            end: to_index(q.get("end")),
            text: match q.get("text") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            },
        })
        .collect()
}

// 负数和无法识别的值一律视为 0
fn to_index(value: Option<&Value>) -> usize {
    let n = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).and_then(float_to_int)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    n.and_then(|n| usize::try_from(n).ok()).unwrap_or(0)
}
