//! 评分尝试流程 - 流程层
//!
//! 核心职责：定义"一次评分尝试"的完整处理流程
//!
//! 流程顺序：
//! 1. 可用性检查（模型不可用 → 立刻失败，走正常重试）
//! 2. 调用模型拿原始文本
//! 3. 解析成合法的 ScoringResult（解析永不失败）
//! 4. 落库并广播

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AppResult, ScorerError};
use crate::infrastructure::{BroadcastChannel, SubmissionStore};
use crate::models::{ParseOutcome, ScoringJob, ScoringResult};
use crate::services::{ResponseParser, ResultPublisher, Scorer};
use crate::utils::logging::truncate_text;

/// 评分尝试流程
///
/// - 编排一次尝试的完整流程
/// - 不持有队列状态，不做超时和重试决策
/// - 只依赖业务能力（scorer / parser / publisher）
pub struct ScoringFlow<C, S, B> {
    scorer: Arc<C>,
    parser: ResponseParser,
    publisher: ResultPublisher<S, B>,
}

impl<C, S, B> ScoringFlow<C, S, B>
where
    C: Scorer,
    S: SubmissionStore,
    B: BroadcastChannel,
{
    pub fn new(scorer: Arc<C>, parser: ResponseParser, publisher: ResultPublisher<S, B>) -> Self {
        Self {
            scorer,
            parser,
            publisher,
        }
    }

    /// 执行一次评分尝试
    ///
    /// 成功路径返回解析后的结果（已落库并广播）；
    /// 任何失败都返回 Err，由编排层交给重试协调器
    pub async fn execute(&self, job: &ScoringJob) -> AppResult<ScoringResult> {
        let submission_id = job.submission_id;

        // 模型不可用不会让进程崩溃，按普通失败进入重试
        if !self.scorer.is_available() {
            return Err(ScorerError::Unavailable.into());
        }

        info!(
            "[提交 {}] 📝 调用模型评分: {}",
            submission_id,
            truncate_text(&job.content, 60)
        );

        let raw_response = self.scorer.score(&job.content, &job.context).await?;

        let result = self.parser.parse(&raw_response);
        if result.outcome != ParseOutcome::Parsed {
            warn!(
                "[提交 {}] ⚠️ 模型输出非标准 JSON，降级提取得分 {} ({:?})",
                submission_id, result.score, result.outcome
            );
        }

        self.publisher.publish_scored(job, &result).await?;

        Ok(result)
    }
}
