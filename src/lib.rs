//! # Submission Scoring
//!
//! 一个用于课堂培训提交的 AI 自动评分队列服务
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 外部协作者的接口契约，只暴露能力
//! - `SubmissionStore` - 提交存储的窄 CRUD 接口
//! - `BroadcastChannel` - 实时广播的发布契约
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单次调用
//! - `LlmScorer` - 模型评分能力（提示词构造 + API 调用）
//! - `ResponseParser` - 响应解析能力（JSON 主路径 + 降级抢救）
//! - `ResultPublisher` - 结果落库 + 广播能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次评分尝试"的完整处理流程
//! - `ScoringFlow` - 流程编排（可用性 → 调用 → 解析 → 发布）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scoring_queue` - 评分队列，管理准入、限流和重试
//! - `orchestrator/retry` - 退避重试策略
//! - `orchestrator/batch_processor` - 批量评分处理器
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, QueueError, ScorerError, StoreError};
pub use infrastructure::{BroadcastChannel, EventBus, MemoryStore, ScoredEvent, SubmissionStore};
pub use models::{
    AssignmentContext, FailedSubmission, ParseOutcome, QueueStats, ScoringJob, ScoringResult,
    Submission,
};
pub use orchestrator::{App, RetryPolicy, ScoringQueue};
pub use services::{LlmScorer, ResponseParser, ResultPublisher, Scorer};
pub use workflow::ScoringFlow;
