//! # Rollout Grader
//!
//! 用大模型对对话样本逐条评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 对话、评分标准、评分结果、请求与响应
//! - `loaders` - TOML 请求文件与 JSONL 样本文件的读写
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心并发与重试
//! - `prompt_builder` - 构建评分提示词
//! - `response_parser` - 从模型回复中解析评分 JSON
//! - `SampleSource` - 按 ID 提供对话
//! - `GradeWriter` - 把评分结果合并写入 `viz/` 文件
//!
//! ### ③ 服务商适配层（Clients）
//! - `clients/` - `GradingClient` 契约与 OpenAI / Anthropic / Google / OpenRouter 实现
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一个样本"的评分流程
//! - `GradingCtx` - 上下文封装（sample_id + 序号）
//! - `GradingFlow` - 引用重试状态机
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/grading_service` - 请求校验、密钥解析、同步与流式入口
//! - `orchestrator/batch_processor` - 并发派发与结果汇总
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{create_client, ClientSettings, GradingClient, ProviderKind};
pub use config::Config;
pub use error::{GradingError, GradingResult, ParseError, ProviderError};
pub use models::{
    Conversation, DispatchMode, GradeRequest, GradeResponse, GradeResult, GradeType,
    GradingEvent, Message, QuotingPolicy, Rubric,
};
pub use orchestrator::{BatchProcessor, GradingService};
pub use services::{GradeWriter, SampleSource, VecSampleSource};
pub use workflow::{AttemptState, GradingCtx, GradingFlow};
