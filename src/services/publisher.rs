//! 结果发布服务 - 业务能力层
//!
//! 只负责"把终态评分结果落库并广播"这一件事。
//!
//! 落库委托给 `SubmissionStore`（按提交 ID 原子且幂等）；
//! 广播是 fire-and-forget，失败不回滚落库，也不算作任务失败。

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{BroadcastChannel, SubmissionStore};
use crate::models::{ScoringJob, ScoringResult};

/// 评分事件名，成功和永久失败共用
pub const SCORED_EVENT: &str = "submission:scored";

/// 永久失败时写入的哨兵分数
pub const SENTINEL_SCORE: u32 = 0;

/// 结果发布服务
pub struct ResultPublisher<S, B> {
    store: Arc<S>,
    bus: Arc<B>,
}

// 手写 Clone：S / B 本身不要求 Clone，Arc 克隆即可
impl<S, B> Clone for ResultPublisher<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<S, B> ResultPublisher<S, B>
where
    S: SubmissionStore,
    B: BroadcastChannel,
{
    pub fn new(store: Arc<S>, bus: Arc<B>) -> Self {
        Self { store, bus }
    }

    /// 发布评分成功结果
    ///
    /// 落库失败会向上传播（本次尝试按失败处理，走正常重试）；
    /// 广播失败只记日志
    pub async fn publish_scored(&self, job: &ScoringJob, result: &ScoringResult) -> AppResult<()> {
        self.store
            .update_score(job.submission_id, result.score, &result.feedback)
            .await?;

        self.broadcast_updated_row(job.submission_id).await;
        Ok(())
    }

    /// 发布永久失败结果
    ///
    /// 写入哨兵分数和诊断评语；这里的落库失败只记日志，
    /// 不再进入重试流程（重试已经耗尽了）
    pub async fn publish_failure(&self, job: &ScoringJob, attempts: u32, last_error: &str) {
        let feedback = format!("Scoring failed after {} attempts: {}", attempts, last_error);

        if let Err(e) = self
            .store
            .update_score(job.submission_id, SENTINEL_SCORE, &feedback)
            .await
        {
            warn!(
                "[提交 {}] 写入失败评语时出错: {}",
                job.submission_id, e
            );
            return;
        }

        self.broadcast_updated_row(job.submission_id).await;
    }

    /// 查出更新后的整行提交并广播
    async fn broadcast_updated_row(&self, submission_id: i64) {
        match self.store.get_submission(submission_id).await {
            Ok(Some(submission)) => {
                self.bus.publish(SCORED_EVENT, json!(submission));
                debug!("[提交 {}] 已广播评分事件", submission_id);
            }
            Ok(None) => {
                info!("[提交 {}] 评分已落库但记录查询为空，跳过广播", submission_id);
            }
            Err(e) => {
                warn!("[提交 {}] 广播前查询记录失败: {}", submission_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{EventBus, MemoryStore};
    use crate::models::{AssignmentContext, ParseOutcome, Submission};

    fn test_job() -> ScoringJob {
        ScoringJob {
            submission_id: 42,
            content: "my essay".to_string(),
            assignment_id: 1,
            owner_id: 7,
            context: AssignmentContext {
                title: "Essay".to_string(),
                instructions: String::new(),
            },
            attempt: 0,
        }
    }

    fn seeded() -> (Arc<MemoryStore>, Arc<EventBus>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_submission(Submission::new(42, 1, 7, "my essay"));
        (store, Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn test_publish_scored_persists_and_broadcasts() {
        let (store, bus) = seeded();
        let mut rx = bus.subscribe();
        let publisher = ResultPublisher::new(Arc::clone(&store), Arc::clone(&bus));

        let result = ScoringResult {
            score: 9,
            feedback: "Good work".to_string(),
            breakdown: None,
            outcome: ParseOutcome::Parsed,
        };
        publisher
            .publish_scored(&test_job(), &result)
            .await
            .expect("发布失败");

        let row = store
            .get_submission(42)
            .await
            .expect("查询失败")
            .expect("记录不存在");
        assert_eq!(row.score, Some(9));
        assert!(row.is_graded);

        let event = rx.recv().await.expect("应收到事件");
        assert_eq!(event.event, SCORED_EVENT);
        assert_eq!(event.payload["score"], 9);
        assert_eq!(event.payload["ai_feedback"], "Good work");
    }

    #[tokio::test]
    async fn test_publish_failure_writes_sentinel() {
        let (store, bus) = seeded();
        let mut rx = bus.subscribe();
        let publisher = ResultPublisher::new(Arc::clone(&store), Arc::clone(&bus));

        publisher.publish_failure(&test_job(), 4, "评分超时").await;

        let row = store
            .get_submission(42)
            .await
            .expect("查询失败")
            .expect("记录不存在");
        assert_eq!(row.score, Some(SENTINEL_SCORE));
        let feedback = row.ai_feedback.expect("应有评语");
        assert!(feedback.contains("Scoring failed after 4 attempts"));

        let event = rx.recv().await.expect("失败也应广播");
        assert_eq!(event.payload["score"], 0);
    }

    #[tokio::test]
    async fn test_publish_failure_with_missing_row_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let publisher = ResultPublisher::new(store, bus);

        // 记录不存在：只记日志，不 panic
        publisher.publish_failure(&test_job(), 4, "x").await;
    }
}
