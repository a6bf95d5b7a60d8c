//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评分和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `grading_service` - 评分请求入口
//! - 校验请求参数（并发数、生成参数、评分标准）
//! - 解析服务商和密钥，创建客户端
//! - 提供同步（`grade`）和流式（`grade_stream`）两种响应方式
//!
//! ### `batch_processor` - 批量评分处理器
//! - 控制并发数量（Semaphore）
//! - 分批模式 / 流式模式派发
//! - 汇总成功结果与单样本错误，汇报进度
//!
//! ## 层次关系
//!
//! ```text
//! grading_service (处理 GradeRequest)
//!     ↓
//! batch_processor (处理 Vec<sample_id>)
//!     ↓
//! workflow::GradingFlow (处理单个样本，含引用重试)
//!     ↓
//! clients (服务商适配：openai / anthropic / google / openrouter)
//!     ↓
//! services (能力层：prompt / parse / sample source / writer)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：grading_service 管准备，batch_processor 管并发
//! 2. **错误分级**：准备阶段的错误终止整批，任务错误只记入错误列表
//! 3. **无业务逻辑**：只做调度和统计，不做评分判断

pub mod batch_processor;
pub mod grading_service;

// 重新导出主要类型
pub use batch_processor::BatchProcessor;
pub use grading_service::GradingService;
