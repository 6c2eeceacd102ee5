//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和重试协调，是整个评分流水线的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `scoring_queue` - 评分队列
//! - 非阻塞接收评分任务（enqueue）
//! - 控制并发数量（Semaphore）和准入速率（固定窗口）
//! - 重试优先、同级 FIFO 的派发顺序
//! - 按提交 ID 去重，保证同一提交不会并发评分
//! - 失败登记表、统计快照、手动重试
//!
//! ### `retry` - 重试策略
//! - 把"第 N 次失败"映射成退避延迟或永久失败
//!
//! ### `batch_processor` - 批量评分处理器
//! - 管理应用生命周期（初始化、运行、统计）
//! - 从 TOML 文件夹加载提交，全部入队后等待排空
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (批量入口) / HTTP 处理器 (在线入口)
//!     ↓
//! scoring_queue (准入、限流、重试协调)
//!     ↓
//! workflow::ScoringFlow (单次尝试)
//!     ↓
//! services (能力层：scorer / parser / publisher)
//!     ↓
//! infrastructure (协作者契约：store / broadcast)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：scoring_queue 管调度，retry 管策略，互不越界
//! 2. **状态独占**：队列状态只能通过 scoring_queue 的公开操作访问
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **失败不丢**：每次尝试都有确定的终点，要么成功要么进入重试协调

pub mod batch_processor;
pub mod retry;
pub mod scoring_queue;

// 重新导出主要类型
pub use batch_processor::App;
pub use retry::{RetryDecision, RetryPolicy};
pub use scoring_queue::ScoringQueue;
