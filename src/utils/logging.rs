/// 日志工具模块
///
/// 提供日志初始化和批次进度输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info。重复调用无副作用。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录评分启动信息
///
/// # 参数
/// - `provider`: 服务商
/// - `model`: 模型名称
/// - `total`: 样本总数
/// - `max_concurrent`: 最大并发数
pub fn log_startup(provider: &str, model: &str, total: usize, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始评分 - {} / {}", provider, model);
    info!("📊 样本数: {}, 最大并发数: {}", total, max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("📦 开始处理第 {}/{} 批 (样本 {}-{} / 共 {} 个)", batch_num, total_batches, start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, total: usize) {
    info!("✓ 第 {} 批完成: 成功 {}/{}", batch_num, success, total);
}

/// 记录流式进度
pub fn log_progress(completed: usize, total: usize) {
    info!("⏳ 进度: {}/{}", completed, total);
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
pub fn print_final_stats(success: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
