//! 样本来源 - 业务能力层
//!
//! 评分引擎只通过 `SampleSource` 按 ID 取对话，不关心样本存放在哪里

use serde_json::Value;

use crate::models::Conversation;

/// 按样本 ID 提供对话
pub trait SampleSource: Send + Sync {
    /// 获取对话，ID 不存在时返回 `None`
    fn conversation(&self, sample_id: u64) -> Option<Conversation>;

    /// 样本数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 内存中的样本列表，ID 即下标
#[derive(Debug, Clone, Default)]
pub struct VecSampleSource {
    conversations: Vec<Conversation>,
}

impl VecSampleSource {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self { conversations }
    }

    /// 从 JSONL 样本记录构建（读取每条记录的 `messages` 字段）
    ///
    /// `messages` 缺失或格式不对的记录视为空对话
    pub fn from_records(records: &[Value]) -> Self {
        let conversations = records
            .iter()
            .map(|record| {
                record
                    .get("messages")
                    .cloned()
                    .and_then(|messages| serde_json::from_value(messages).ok())
                    .unwrap_or_default()
            })
            .collect();
        Self { conversations }
    }
}

impl SampleSource for VecSampleSource {
    fn conversation(&self, sample_id: u64) -> Option<Conversation> {
        usize::try_from(sample_id)
            .ok()
            .and_then(|index| self.conversations.get(index))
            .cloned()
    }

    fn len(&self) -> usize {
        self.conversations.len()
    }
}
