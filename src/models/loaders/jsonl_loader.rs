use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// 从 JSONL 文件加载全部样本记录（空行跳过）
///
/// 样本 ID 即记录在文件中的位置（从 0 开始）
pub async fn load_jsonl_records(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取JSONL文件: {}", path.display()))?;

    parse_jsonl(&content).with_context(|| format!("无法解析JSONL文件: {}", path.display()))
}

/// 解析 JSONL 文本
pub fn parse_jsonl(content: &str) -> Result<Vec<Value>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line).with_context(|| format!("第 {} 行不是合法的 JSON", line_no + 1))
        })
        .collect()
}

/// 将样本记录写回 JSONL 文件（必要时创建父目录）
pub async fn save_jsonl_records(path: &Path, records: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
    }

    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }

    fs::write(path, content)
        .await
        .with_context(|| format!("无法写入JSONL文件: {}", path.display()))
}
