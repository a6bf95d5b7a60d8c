//! 单个样本的评分流程 - 流程层
//!
//! 核心职责：在要求引用时，若模型未给出引用则用更强硬的提示重试
//!
//! 状态转换：
//! ```text
//! Pending → Attempting(0) → Satisfied
//!                         → Attempting(k+1)   (缺少引用且 k < max_retries)
//!                         → Exhausted         (缺少引用且 k == max_retries)
//! ```
//! 服务商错误和解析错误直接终止任务，不消耗重试次数。

use tracing::{debug, info, warn};

use crate::clients::GradingClient;
use crate::error::GradingResult;
use crate::models::{Conversation, GradeResult, QuotingPolicy, Rubric};
use crate::workflow::grading_ctx::GradingCtx;

/// 引用重试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    /// 第 k 次尝试（从 0 开始）
    Attempting(u32),
    /// 已满足引用策略
    Satisfied,
    /// 重试用尽仍无引用，保留最后一次结果
    Exhausted,
}

impl AttemptState {
    /// 派发：Pending → Attempting(0)
    pub fn dispatch(self) -> Self {
        match self {
            AttemptState::Pending => AttemptState::Attempting(0),
            other => other,
        }
    }

    /// 根据本次尝试是否带引用决定下一状态
    pub fn on_verdict(self, policy: &QuotingPolicy, has_quotes: bool) -> Self {
        match self {
            AttemptState::Attempting(k) => {
                if !policy.required || has_quotes {
                    AttemptState::Satisfied
                } else if k < policy.max_retries {
                    AttemptState::Attempting(k + 1)
                } else {
                    AttemptState::Exhausted
                }
            }
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Satisfied | AttemptState::Exhausted)
    }
}

/// 评分流程结果
#[derive(Debug, Clone)]
pub struct GradingOutcome {
    pub result: GradeResult,
    /// 实际调用服务商的次数
    pub attempts: u32,
    /// 终止状态（Satisfied / Exhausted）
    pub state: AttemptState,
}

/// 评分流程
///
/// - 同一任务内的尝试严格串行
/// - 不持有任何资源，只依赖 `GradingClient`
pub struct GradingFlow {
    policy: QuotingPolicy,
}

impl GradingFlow {
    pub fn new(policy: QuotingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> QuotingPolicy {
        self.policy
    }

    pub async fn run(
        &self,
        client: &dyn GradingClient,
        conversation: &Conversation,
        rubric: &Rubric,
        ctx: &GradingCtx,
    ) -> GradingResult<GradingOutcome> {
        let mut state = AttemptState::Pending.dispatch();
        let mut attempt = 0;

        loop {
            let mode = self.policy.mode_for_attempt(attempt);
            debug!("{} 第 {} 次评分 ({:?})", ctx, attempt + 1, mode);

            let mut result = client.grade(conversation, rubric, mode).await?;
            drop_dangling_quotes(&mut result, conversation, ctx);

            state = state.on_verdict(&self.policy, result.has_quotes());
            match state {
                AttemptState::Attempting(next) => {
                    info!(
                        "{} ⚠️ 回复缺少引用，使用强化提示重试 ({}/{})",
                        ctx, next, self.policy.max_retries
                    );
                    attempt = next;
                }
                _ => {
                    if state == AttemptState::Exhausted {
                        warn!(
                            "{} ⚠️ 已重试 {} 次仍无引用，保留无引用的结果",
                            ctx, self.policy.max_retries
                        );
                    } else {
                        debug!("{} ✓ 评分完成 (共 {} 次调用)", ctx, attempt + 1);
                    }
                    return Ok(GradingOutcome {
                        result,
                        attempts: attempt + 1,
                        state,
                    });
                }
            }
        }
    }
}

/// 去掉指向不存在消息的引用
fn drop_dangling_quotes(result: &mut GradeResult, conversation: &Conversation, ctx: &GradingCtx) {
    let before = result.quotes.len();
    result
        .quotes
        .retain(|q| q.message_index < conversation.len());
    let dropped = before - result.quotes.len();
    if dropped > 0 {
        warn!("{} 丢弃 {} 条消息下标越界的引用", ctx, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ProviderKind;
    use crate::error::{GradingError, ProviderError};
    use crate::models::{GradeType, GradeValue, Message, Quote, QuotingMode, Verdict};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 按脚本依次返回结果的客户端
    struct ScriptedClient {
        script: Mutex<Vec<Script>>,
        modes: Mutex<Vec<QuotingMode>>,
    }

    enum Script {
        Quotes(usize),
        Fail,
    }

    impl ScriptedClient {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script),
                modes: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.modes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GradingClient for ScriptedClient {
        fn provider(&self) -> ProviderKind {
            ProviderKind::OpenRouter
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn grade(
            &self,
            _conversation: &Conversation,
            _rubric: &Rubric,
            mode: QuotingMode,
        ) -> GradingResult<GradeResult> {
            self.modes.lock().unwrap().push(mode);
            let step = self.script.lock().unwrap().remove(0);
            match step {
                Script::Quotes(n) => Ok(Verdict {
                    grade: GradeValue::Bool(true),
                    quotes: (0..n)
                        .map(|i| Quote {
                            message_index: i % 2,
                            start: 0,
                            end: 2,
                            text: "hi".to_string(),
                        })
                        .collect(),
                    explanation: "e".to_string(),
                }
                .into_result("scripted")),
                Script::Fail => Err(ProviderError::BadStatus {
                    provider: "scripted",
                    status: 503,
                    body: "unavailable".to_string(),
                }
                .into()),
            }
        }
    }

    fn fixtures() -> (Conversation, Rubric, GradingCtx) {
        (
            Conversation::new(vec![Message::new("user", "hi"), Message::new("assistant", "hello")]),
            Rubric::new("r", "p", GradeType::Bool),
            GradingCtx::new(0, 1, 1),
        )
    }

    fn required(max_retries: u32) -> QuotingPolicy {
        QuotingPolicy {
            required: true,
            max_retries,
        }
    }

    #[test]
    fn test_transitions() {
        let policy = required(2);
        let s = AttemptState::Pending.dispatch();
        assert_eq!(s, AttemptState::Attempting(0));
        assert_eq!(s.on_verdict(&policy, true), AttemptState::Satisfied);
        assert_eq!(s.on_verdict(&policy, false), AttemptState::Attempting(1));
        assert_eq!(
            AttemptState::Attempting(2).on_verdict(&policy, false),
            AttemptState::Exhausted
        );
        assert_eq!(
            AttemptState::Attempting(0).on_verdict(&QuotingPolicy::optional(), false),
            AttemptState::Satisfied
        );
        assert_eq!(
            AttemptState::Attempting(0).on_verdict(&required(0), false),
            AttemptState::Exhausted
        );
        assert!(AttemptState::Satisfied.is_terminal());
        assert_eq!(
            AttemptState::Satisfied.on_verdict(&policy, false),
            AttemptState::Satisfied
        );
    }

    #[tokio::test]
    async fn test_satisfied_on_third_attempt() {
        let (conv, rubric, ctx) = fixtures();
        let client = ScriptedClient::new(vec![Script::Quotes(0), Script::Quotes(0), Script::Quotes(2)]);
        let outcome = GradingFlow::new(required(2))
            .run(&client, &conv, &rubric, &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.state, AttemptState::Satisfied);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(client.calls(), 3);
        assert_eq!(outcome.result.quotes.len(), 2);
        assert_eq!(
            *client.modes.lock().unwrap(),
            vec![
                QuotingMode::Required,
                QuotingMode::RequiredRetry,
                QuotingMode::RequiredRetry
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_keeps_last_result() {
        let (conv, rubric, ctx) = fixtures();
        let client = ScriptedClient::new(vec![Script::Quotes(0), Script::Quotes(0), Script::Quotes(0)]);
        let outcome = GradingFlow::new(required(2))
            .run(&client, &conv, &rubric, &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.state, AttemptState::Exhausted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(client.calls(), 3);
        assert!(outcome.result.quotes.is_empty());
    }

    #[tokio::test]
    async fn test_optional_policy_single_call() {
        let (conv, rubric, ctx) = fixtures();
        let client = ScriptedClient::new(vec![Script::Quotes(0)]);
        let outcome = GradingFlow::new(QuotingPolicy::optional())
            .run(&client, &conv, &rubric, &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.state, AttemptState::Satisfied);
        assert_eq!(client.calls(), 1);
        assert_eq!(*client.modes.lock().unwrap(), vec![QuotingMode::Optional]);
    }

    #[tokio::test]
    async fn test_error_bypasses_retry() {
        let (conv, rubric, ctx) = fixtures();
        let client = ScriptedClient::new(vec![Script::Fail, Script::Quotes(1)]);
        let err = GradingFlow::new(required(2))
            .run(&client, &conv, &rubric, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Provider(_)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_dangling_quotes_count_as_missing() {
        let (_, rubric, ctx) = fixtures();
        // 只有一条消息：message_index 为 1 的引用会被丢弃
        let conv = Conversation::new(vec![Message::new("user", "hi")]);
        let client = ScriptedClient::new(vec![Script::Quotes(2), Script::Quotes(1)]);
        let outcome = GradingFlow::new(required(1))
            .run(&client, &conv, &rubric, &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.state, AttemptState::Satisfied);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.quotes.len(), 1);
    }
}
