//! 评分任务上下文
//!
//! 封装"我正在给第几个样本评分"这一信息

use std::fmt::Display;

/// 评分任务上下文
#[derive(Debug, Clone, Copy)]
pub struct GradingCtx {
    /// 样本ID
    pub sample_id: u64,

    /// 在本次请求中的序号（从1开始，仅用于日志显示）
    pub position: usize,

    /// 本次请求的样本总数
    pub total: usize,
}

impl GradingCtx {
    pub fn new(sample_id: u64, position: usize, total: usize) -> Self {
        Self {
            sample_id,
            position,
            total,
        }
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[样本 #{} ({}/{})]",
            self.sample_id, self.position, self.total
        )
    }
}
