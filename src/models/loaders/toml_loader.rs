use crate::models::request::GradeRequest;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载评分请求
pub async fn load_grade_request(toml_file_path: &Path) -> Result<GradeRequest> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let request: GradeRequest = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "已加载评分请求: {} 个样本, 服务商 {}, 模型 {}",
        request.sample_ids.len(),
        request.provider,
        request.model
    );

    Ok(request)
}
