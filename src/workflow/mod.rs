//! 流程层（Workflow）
//!
//! 定义"一次评分尝试"的完整处理流程：
//! 可用性检查 → 模型调用 → 响应解析 → 结果发布。
//!
//! 超时控制和失败后的重试决策不在这一层，由编排层负责。

pub mod scoring_flow;

pub use scoring_flow::ScoringFlow;
