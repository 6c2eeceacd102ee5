use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::submission::AssignmentContext;

/// 一个评分工作单元
///
/// 在提交被接收时创建；每次重试时 `attempt` 加一；
/// 评分成功或永久失败后从队列的跟踪集合中移除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringJob {
    pub submission_id: i64,
    pub content: String,
    pub assignment_id: i64,
    pub owner_id: i64,
    /// 作业上下文（入队时查出，重试直接复用）
    pub context: AssignmentContext,
    /// 重试计数，0 表示首次尝试
    pub attempt: u32,
}

/// 解析结果来源标记
///
/// 标记 `ScoringResult` 出自哪条解析路径，便于审计降级行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseOutcome {
    /// JSON 主路径解析成功
    Parsed,
    /// JSON 解析失败，从文本中抢救出分数
    Salvaged,
    /// 完全无法提取，使用区间中点兜底
    DefaultFallback,
}

/// 评分结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    /// 区间内的整数分（默认 1-10）
    pub score: u32,
    /// 评语
    pub feedback: String,
    /// 各项子分（仅供参考，不与总分校验）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<JsonValue>,
    /// 解析路径标记
    pub outcome: ParseOutcome,
}

/// 失败登记表条目
///
/// 非终态条目表示正在等待退避定时器；终态条目保留在登记表中
/// 供诊断查询和手动重试使用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSubmission {
    pub job: ScoringJob,
    /// 最近一次失败的错误描述
    pub error: String,
    /// 下次自动重试时间（epoch 毫秒），终态条目为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at_ms: Option<i64>,
    /// 重试次数已耗尽
    pub terminal: bool,
}

/// 队列统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// 累计进入队列的任务数（含重试）
    pub total: u64,
    /// 正在排队等待执行的任务数
    pub queued: usize,
    /// 正在执行的评分调用数
    pub in_flight: usize,
    /// 评分成功数
    pub completed: u64,
    /// 永久失败数
    pub failed: u64,
    /// 处于重试流程中的提交数（等待退避 + 排队中的重试）
    pub retrying: usize,
    /// 失败登记表条目数（含终态）
    pub failed_submissions: usize,
}

impl QueueStats {
    /// 队列是否已排空（没有排队、执行中或等待重试的任务）
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.in_flight == 0 && self.retrying == 0
    }
}
