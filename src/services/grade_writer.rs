//! 评分结果写入服务 - 业务能力层
//!
//! 只负责"把评分结果合并进样本文件"能力，不关心评分流程

use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::loaders::{load_jsonl_records, save_jsonl_records};
use crate::models::GradeResult;

/// 评分结果写入服务
///
/// 职责：
/// - 把每个样本的 `GradeResult` 追加到记录的 `grades[<指标名>]` 列表
/// - 结果写入样本文件同级的 `viz/` 目录，不改动原文件
/// - 若 `viz/` 下已有同名文件，则在其基础上合并
pub struct GradeWriter {
    output_dir: String,
}

impl GradeWriter {
    /// 创建新的写入服务（输出到 `viz/`）
    pub fn new() -> Self {
        Self {
            output_dir: "viz".to_string(),
        }
    }

    /// 使用自定义输出目录名创建
    pub fn with_dir(dir: impl Into<String>) -> Self {
        Self {
            output_dir: dir.into(),
        }
    }

    /// `/path/to/file.jsonl` -> `/path/to/viz/file.jsonl`
    pub fn viz_path(&self, original: &Path) -> PathBuf {
        let parent = original.parent().unwrap_or_else(|| Path::new(""));
        match original.file_name() {
            Some(name) => parent.join(&self.output_dir).join(name),
            None => parent.join(&self.output_dir),
        }
    }

    /// 合并评分结果并写盘
    ///
    /// # 返回
    /// 返回写入的文件路径和更新的样本数
    pub async fn write(
        &self,
        original: &Path,
        metric_name: &str,
        grades: &BTreeMap<u64, GradeResult>,
    ) -> Result<(PathBuf, usize)> {
        let viz_path = self.viz_path(original);
        let source_path = if tokio::fs::try_exists(&viz_path).await.unwrap_or(false) {
            debug!("在已有的 {} 基础上合并", viz_path.display());
            viz_path.as_path()
        } else {
            original
        };

        let mut records = load_jsonl_records(source_path).await?;
        let updated = merge_grades(&mut records, metric_name, grades)?;
        save_jsonl_records(&viz_path, &records).await?;

        info!(
            "💾 已写入 {} 个样本的评分结果: {}",
            updated,
            viz_path.display()
        );

        Ok((viz_path, updated))
    }
}

impl Default for GradeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// 把评分结果合并进样本记录，返回更新的样本数
///
/// 超出范围的样本 ID 和非对象记录会被跳过
pub fn merge_grades(
    records: &mut [Value],
    metric_name: &str,
    grades: &BTreeMap<u64, GradeResult>,
) -> Result<usize> {
    let mut updated = 0;

    for (sample_id, grade) in grades {
        let Some(Value::Object(record)) = usize::try_from(*sample_id)
            .ok()
            .and_then(|index| records.get_mut(index))
        else {
            warn!("样本 {} 不存在或不是对象，跳过写入", sample_id);
            continue;
        };

        let all_grades = record
            .entry("grades")
            .or_insert_with(|| json!({}));
        if !all_grades.is_object() {
            *all_grades = json!({});
        }

        let entries = all_grades
            .as_object_mut()
            .map(|m| m.entry(metric_name.to_string()).or_insert_with(|| json!([])));
        if let Some(entries) = entries {
            if !entries.is_array() {
                *entries = json!([]);
            }
            if let Some(list) = entries.as_array_mut() {
                list.push(serde_json::to_value(grade)?);
                updated += 1;
            }
        }
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeValue, Verdict};

    fn grade(value: bool) -> GradeResult {
        Verdict {
            grade: GradeValue::Bool(value),
            quotes: vec![],
            explanation: "e".to_string(),
        }
        .into_result("m")
    }

    #[test]
    fn test_viz_path() {
        let writer = GradeWriter::new();
        assert_eq!(
            writer.viz_path(Path::new("/data/run/samples.jsonl")),
            PathBuf::from("/data/run/viz/samples.jsonl")
        );
        assert_eq!(
            writer.viz_path(Path::new("samples.jsonl")),
            PathBuf::from("viz/samples.jsonl")
        );
    }

    #[test]
    fn test_merge_appends_per_metric() {
        let mut records = vec![
            json!({"messages": []}),
            json!({"messages": [], "grades": {"safety": [{"grade": false}]}}),
        ];
        let mut grades = BTreeMap::new();
        grades.insert(0, grade(true));
        grades.insert(1, grade(true));
        grades.insert(9, grade(true));

        let updated = merge_grades(&mut records, "safety", &grades).unwrap();
        assert_eq!(updated, 2);
        assert_eq!(records[0]["grades"]["safety"].as_array().unwrap().len(), 1);
        assert_eq!(records[1]["grades"]["safety"].as_array().unwrap().len(), 2);
        assert_eq!(records[1]["grades"]["safety"][1]["grade"], true);
    }

    #[tokio::test]
    async fn test_write_then_merge_again() {
        let dir = std::env::temp_dir().join(format!("grade_writer_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let original = dir.join("samples.jsonl");
        tokio::fs::write(&original, "{\"messages\":[]}\n{\"messages\":[]}\n")
            .await
            .unwrap();

        let writer = GradeWriter::new();
        let mut grades = BTreeMap::new();
        grades.insert(1, grade(false));

        let (path, updated) = writer.write(&original, "accuracy", &grades).await.unwrap();
        assert_eq!(updated, 1);
        let (_, _) = writer.write(&original, "accuracy", &grades).await.unwrap();

        let records = load_jsonl_records(&path).await.unwrap();
        assert_eq!(records[1]["grades"]["accuracy"].as_array().unwrap().len(), 2);
        assert!(records[0].get("grades").is_none());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
