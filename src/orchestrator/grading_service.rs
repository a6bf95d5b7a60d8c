//! 评分请求入口 - 编排层
//!
//! 负责派发前的准备工作（参数校验、服务商解析、密钥解析），
//! 这些失败属于批次级错误，在任何任务开始之前报告一次。

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::clients::{create_client, ClientSettings, GradingClient, ProviderKind};
use crate::config::Config;
use crate::error::{GradingError, GradingResult};
use crate::models::{DispatchMode, GradeRequest, GradeResponse, GradingEvent, QuotingPolicy};
use crate::orchestrator::batch_processor::BatchProcessor;
use crate::services::SampleSource;
use crate::utils::logging::log_startup;

/// 流式事件通道容量
const EVENT_BUFFER: usize = 64;

/// 评分服务
#[derive(Debug, Clone, Default)]
pub struct GradingService {
    config: Config,
}

impl GradingService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 解析密钥：显式给出的优先，否则读取服务商对应的环境变量
    pub fn resolve_api_key(kind: ProviderKind, explicit: Option<&str>) -> GradingResult<String> {
        if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        Config::env_api_key(kind.as_str()).ok_or_else(|| GradingError::CredentialMissing {
            provider: kind.as_str().to_string(),
            env_var: Config::api_key_env_var(kind.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// 请求中的引用策略（未指定的字段使用配置默认值）
    pub fn quoting_policy(&self, request: &GradeRequest) -> QuotingPolicy {
        QuotingPolicy {
            required: request.quote_required.unwrap_or(self.config.quote_required),
            max_retries: request
                .max_quote_retries
                .unwrap_or(self.config.max_quote_retries),
        }
    }

    /// 校验请求并创建服务商客户端与处理器
    pub fn prepare(
        &self,
        request: &GradeRequest,
        source: Arc<dyn SampleSource>,
    ) -> GradingResult<BatchProcessor> {
        self.validate(request)?;

        let kind: ProviderKind = request.provider.parse()?;
        let api_key = Self::resolve_api_key(kind, request.api_key.as_deref())?;
        let settings = ClientSettings::new(
            kind,
            &self.config,
            api_key,
            request.model.clone(),
            request.tuning,
        );

        self.prepare_with_client(request, source, create_client(kind, settings))
    }

    /// 使用已有的客户端创建处理器（跳过服务商与密钥解析）
    pub fn prepare_with_client(
        &self,
        request: &GradeRequest,
        source: Arc<dyn SampleSource>,
        client: Arc<dyn GradingClient>,
    ) -> GradingResult<BatchProcessor> {
        self.validate(request)?;
        let rubric = request.resolve_rubric()?;

        Ok(BatchProcessor::new(
            client,
            source,
            rubric,
            self.quoting_policy(request),
            self.concurrency(request),
        ))
    }

    /// 同步评分：全部完成后返回一次结果
    pub async fn grade(
        &self,
        request: &GradeRequest,
        source: Arc<dyn SampleSource>,
    ) -> GradingResult<GradeResponse> {
        let processor = self.prepare(request, source)?;
        Ok(self.dispatch(&processor, request, request.mode, None).await)
    }

    /// 流式评分：返回事件接收端
    ///
    /// 准备失败时只发送一个 `Error` 事件；否则发送若干 `Progress` 事件，最后一个 `Complete` 事件
    pub fn grade_stream(
        &self,
        request: GradeRequest,
        source: Arc<dyn SampleSource>,
    ) -> mpsc::Receiver<GradingEvent> {
        let processor = self.prepare(&request, source);
        self.spawn_stream(request, processor)
    }

    /// 使用已有客户端的流式评分
    pub fn grade_stream_with_client(
        &self,
        request: GradeRequest,
        source: Arc<dyn SampleSource>,
        client: Arc<dyn GradingClient>,
    ) -> mpsc::Receiver<GradingEvent> {
        let processor = self.prepare_with_client(&request, source, client);
        self.spawn_stream(request, processor)
    }

    fn spawn_stream(
        &self,
        request: GradeRequest,
        processor: GradingResult<BatchProcessor>,
    ) -> mpsc::Receiver<GradingEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let service = self.clone();

        tokio::spawn(async move {
            match processor {
                Ok(processor) => {
                    service
                        .dispatch(&processor, &request, DispatchMode::Streaming, Some(&tx))
                        .await;
                }
                Err(e) => {
                    error!("❌ 评分请求准备失败: {}", e);
                    let _ = tx
                        .send(GradingEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        rx
    }

    async fn dispatch(
        &self,
        processor: &BatchProcessor,
        request: &GradeRequest,
        mode: DispatchMode,
        events: Option<&mpsc::Sender<GradingEvent>>,
    ) -> GradeResponse {
        log_startup(
            &request.provider,
            &request.model,
            request.sample_ids.len(),
            processor.concurrency(),
        );
        info!(
            "📝 指标: {} ({})",
            processor.rubric().name,
            processor.rubric().grade_type
        );

        processor.run(&request.sample_ids, mode, events).await
    }

    fn concurrency(&self, request: &GradeRequest) -> usize {
        request.concurrency.unwrap_or(self.config.max_concurrency)
    }

    /// 派发前的参数校验
    fn validate(&self, request: &GradeRequest) -> GradingResult<()> {
        if self.concurrency(request) == 0 {
            return Err(GradingError::invalid_request("concurrency 必须大于 0"));
        }
        request.tuning.validate()?;
        if request.model.trim().is_empty() {
            return Err(GradingError::invalid_request("未指定模型"));
        }
        Ok(())
    }
}
