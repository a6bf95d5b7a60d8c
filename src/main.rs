use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use rollout_grader::models::{load_grade_request, load_jsonl_records};
use rollout_grader::utils::logging;
use rollout_grader::{Config, GradeWriter, GradingEvent, GradingService, VecSampleSource};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);
    debug!("可用密钥: {:?}", Config::available_credentials());

    // 加载评分请求
    let request_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.request_file.clone());
    let request_path = Path::new(&request_path);
    let request = load_grade_request(request_path).await?;

    let samples_path = samples_path(request_path, request.file_path.as_deref())?;
    let rubric_name = request.resolve_rubric()?.name;

    // 加载样本
    let records = load_jsonl_records(&samples_path).await?;
    info!("✓ 已载入 {} 个样本: {}", records.len(), samples_path.display());
    let source = Arc::new(VecSampleSource::from_records(&records));

    // 流式评分
    let service = GradingService::new(config.clone());
    let mut events = service.grade_stream(request, source);

    let mut response = None;
    while let Some(event) = events.recv().await {
        match event {
            GradingEvent::Progress {
                completed, total, ..
            } => debug!("收到进度事件: {}/{}", completed, total),
            GradingEvent::Complete(r) => response = Some(r),
            GradingEvent::Error { message } => bail!("评分失败: {}", message),
        }
    }
    let response = response.context("评分流程意外中断，未收到完成事件")?;

    // 写入结果
    if response.grades.is_empty() {
        info!("⚠️ 没有成功的评分结果，跳过写入");
    } else {
        GradeWriter::with_dir(&config.output_dir)
            .write(&samples_path, &rubric_name, &response.grades)
            .await?;
    }

    logging::print_final_stats(
        response.graded_count,
        response.errors.len(),
        response.total(),
    );

    Ok(())
}

/// 样本文件路径，相对路径以请求文件所在目录为基准
fn samples_path(request_path: &Path, file_path: Option<&str>) -> Result<PathBuf> {
    let file_path = file_path.context("评分请求缺少 file_path")?;
    let path = Path::new(file_path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(request_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(path))
}
