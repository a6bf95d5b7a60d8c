//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 把一组样本 ID 扇出为评分任务，限制并发，汇总成功与失败，并可选地汇报进度。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：使用 Semaphore 作为准入闸门，每个任务在整个生命周期内
//!    （包括所有引用重试）只占用一个名额
//! 2. **分批模式**：按并发数切分样本，每批全部完成后再开始下一批
//! 3. **流式模式**：所有任务共用闸门，每完成约 total/20 个汇报一次进度，
//!    最后一个完成时一定汇报
//! 4. **结果汇总**：只有一个收集者消费完成的任务，不需要共享计数器
//! 5. **中途放弃**：进度接收端被丢弃时终止剩余任务，已收集的结果保持有效
//!
//! ## 错误处理
//!
//! 单个任务的错误在任务边界转换为 `(sample_id, message)`，不会影响同批其他任务。

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{AbortHandle, JoinError};
use tracing::{error, info, warn};

use crate::clients::GradingClient;
use crate::error::{GradingError, GradingResult};
use crate::models::{
    DispatchMode, GradeResponse, GradeResult, GradingEvent, QuotingPolicy, Rubric, SampleError,
};
use crate::services::SampleSource;
use crate::utils::logging::{log_batch_complete, log_batch_start, log_progress};
use crate::workflow::{GradingCtx, GradingFlow};

/// 流式模式下进度事件的大致次数
const PROGRESS_UPDATES: usize = 20;

/// 批量评分处理器
pub struct BatchProcessor {
    client: Arc<dyn GradingClient>,
    source: Arc<dyn SampleSource>,
    rubric: Arc<Rubric>,
    flow: Arc<GradingFlow>,
    concurrency: usize,
}

impl BatchProcessor {
    /// 创建处理器，`concurrency` 至少为 1
    pub fn new(
        client: Arc<dyn GradingClient>,
        source: Arc<dyn SampleSource>,
        rubric: Rubric,
        policy: QuotingPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            source,
            rubric: Arc::new(rubric),
            flow: Arc::new(GradingFlow::new(policy)),
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// 按指定模式评分
    ///
    /// 提供 `events` 时汇报进度，并在结束时发送一次 `Complete` 事件
    pub async fn run(
        &self,
        sample_ids: &[u64],
        mode: DispatchMode,
        events: Option<&mpsc::Sender<GradingEvent>>,
    ) -> GradeResponse {
        let response = match mode {
            DispatchMode::FixedBatch => self.run_fixed_batches(sample_ids, events).await,
            DispatchMode::Streaming => self.run_streaming(sample_ids, events).await,
        };

        if let Some(tx) = events {
            if tx.send(GradingEvent::Complete(response.clone())).await.is_err() {
                warn!("进度接收端已关闭，完成事件未送达");
            }
        }

        response
    }

    /// 分批模式：每批最多 `concurrency` 个样本，上一批全部完成后才开始下一批
    pub async fn run_fixed_batches(
        &self,
        sample_ids: &[u64],
        events: Option<&mpsc::Sender<GradingEvent>>,
    ) -> GradeResponse {
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let total = sample_ids.len();
        let total_batches = total.div_ceil(self.concurrency);
        let mut collector = Collector::new();

        for (batch_idx, chunk) in sample_ids.chunks(self.concurrency).enumerate() {
            let batch_start = batch_idx * self.concurrency;
            let batch_num = batch_idx + 1;
            log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_start + chunk.len(),
                total,
            );

            let mut batch_handles = Vec::with_capacity(chunk.len());
            for (offset, &sample_id) in chunk.iter().enumerate() {
                let ctx = GradingCtx::new(sample_id, batch_start + offset + 1, total);
                batch_handles.push((sample_id, self.spawn_job(ctx, gate.clone())));
            }

            let before = collector.succeeded();
            for (sample_id, handle) in batch_handles {
                collector.record_joined(sample_id, handle.await);
            }
            log_batch_complete(batch_num, collector.succeeded() - before, chunk.len());

            if let Some(tx) = events {
                let event = GradingEvent::progress(collector.completed(), total);
                if tx.send(event).await.is_err() {
                    warn!("进度接收端已关闭，放弃剩余批次");
                    break;
                }
            }
        }

        collector.finish()
    }

    /// 流式模式：所有任务一次性提交，由准入闸门限制同时运行的数量
    pub async fn run_streaming(
        &self,
        sample_ids: &[u64],
        events: Option<&mpsc::Sender<GradingEvent>>,
    ) -> GradeResponse {
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let total = sample_ids.len();
        let step = (total / PROGRESS_UPDATES).max(1);
        let mut collector = Collector::new();

        let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        for (idx, &sample_id) in sample_ids.iter().enumerate() {
            let ctx = GradingCtx::new(sample_id, idx + 1, total);
            let handle = self.spawn_job(ctx, gate.clone());
            abort_handles.push(handle.abort_handle());
            pending.push(handle.map(move |joined| (sample_id, joined)));
        }

        info!("📋 已提交 {} 个评分任务，最大并发 {}", total, self.concurrency);

        while let Some((sample_id, joined)) = pending.next().await {
            collector.record_joined(sample_id, joined);

            let completed = collector.completed();
            if completed % step != 0 && completed != total {
                continue;
            }
            log_progress(completed, total);

            if let Some(tx) = events {
                if tx.send(GradingEvent::progress(completed, total)).await.is_err() {
                    warn!(
                        "进度接收端已关闭，终止剩余 {} 个任务",
                        total.saturating_sub(completed)
                    );
                    abort_handles.iter().for_each(AbortHandle::abort);
                    break;
                }
            }
        }

        collector.finish()
    }

    /// 提交单个评分任务
    ///
    /// 任务先在闸门处取得名额，持有到任务结束（包括所有重试）
    fn spawn_job(
        &self,
        ctx: GradingCtx,
        gate: Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<GradingResult<GradeResult>> {
        let client = self.client.clone();
        let source = self.source.clone();
        let rubric = self.rubric.clone();
        let flow = self.flow.clone();

        tokio::spawn(async move {
            let _permit = gate
                .acquire_owned()
                .await
                .map_err(|_| GradingError::invalid_request("并发闸门已关闭"))?;

            let conversation = source
                .conversation(ctx.sample_id)
                .ok_or(GradingError::UnknownSample {
                    sample_id: ctx.sample_id,
                })?;

            let outcome = flow
                .run(client.as_ref(), &conversation, &rubric, &ctx)
                .await?;
            Ok::<_, GradingError>(outcome.result)
        })
    }
}

/// 结果收集者
///
/// 只在编排任务内部使用，不跨任务共享
struct Collector {
    response: GradeResponse,
    completed: usize,
}

impl Collector {
    fn new() -> Self {
        Self {
            response: GradeResponse::default(),
            completed: 0,
        }
    }

    fn completed(&self) -> usize {
        self.completed
    }

    fn succeeded(&self) -> usize {
        self.response.grades.len()
    }

    fn record_joined(
        &mut self,
        sample_id: u64,
        joined: Result<GradingResult<GradeResult>, JoinError>,
    ) {
        self.completed += 1;
        match joined {
            Ok(result) => self.record(sample_id, result),
            Err(e) => {
                error!("[样本 #{}] 任务执行失败: {}", sample_id, e);
                self.push_error(sample_id, format!("任务执行失败: {}", e));
            }
        }
    }

    fn record(&mut self, sample_id: u64, result: GradingResult<GradeResult>) {
        match result {
            Ok(grade) => {
                self.response.grades.insert(sample_id, grade);
            }
            Err(e) => {
                error!("[样本 #{}] ❌ 评分失败: {}", sample_id, e);
                self.push_error(sample_id, e.to_string());
            }
        }
    }

    fn push_error(&mut self, sample_id: u64, error: String) {
        self.response.errors.push(SampleError { sample_id, error });
    }

    fn finish(mut self) -> GradeResponse {
        self.response.graded_count = self.response.grades.len();
        self.response
    }
}
