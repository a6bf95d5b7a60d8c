use serde::{Deserialize, Serialize};

fn default_role() -> String {
    "unknown".to_string()
}

/// 对话中的单条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 角色标签（如 "user" / "assistant"），缺失时为 "unknown"
    #[serde(default = "default_role")]
    pub role: String,
    /// 原始文本内容
    #[serde(default)]
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// 待评分的对话
///
/// 消息顺序有意义：引用通过下标（从 0 开始）定位消息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 按下标获取消息
    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}
