//! 提交存储接口 - 基础设施层
//!
//! 关系型存储本身不在本仓库范围内，这里只定义评分流水线
//! 依赖的窄接口，并提供一个内存实现（测试和批量评分模式使用）

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use crate::error::{AppResult, StoreError};
use crate::models::{AssignmentContext, Submission};

/// 提交存储的窄 CRUD 接口
///
/// 抽象出存储后端（SQLite、内存等），便于在测试中注入。
///
/// 实现约定：
/// - `update_score` 对同一提交是原子且幂等的：同样的结果写两次，
///   存储状态不变
/// - 所有方法并发安全
pub trait SubmissionStore: Send + Sync + 'static {
    /// 按作业 ID 查出构造提示词所需的上下文
    fn get_assignment_context(
        &self,
        assignment_id: i64,
    ) -> impl Future<Output = AppResult<Option<AssignmentContext>>> + Send;

    /// 按 ID 查出提交记录
    fn get_submission(
        &self,
        submission_id: i64,
    ) -> impl Future<Output = AppResult<Option<Submission>>> + Send;

    /// 写入评分结果（分数 + 评语），并把提交标记为已评分
    fn update_score(
        &self,
        submission_id: i64,
        score: u32,
        feedback: &str,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

/// 内存存储
///
/// 测试和批量评分模式使用；行为与生产存储的窄接口一致
#[derive(Debug, Default)]
pub struct MemoryStore {
    assignments: Mutex<HashMap<i64, AssignmentContext>>,
    submissions: Mutex<HashMap<i64, Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个作业（批量评分模式的种子数据）
    pub fn insert_assignment(&self, assignment_id: i64, context: AssignmentContext) {
        self.assignments
            .lock()
            .expect("assignments 锁中毒")
            .insert(assignment_id, context);
    }

    /// 写入一条提交记录
    pub fn insert_submission(&self, submission: Submission) {
        self.submissions
            .lock()
            .expect("submissions 锁中毒")
            .insert(submission.id, submission);
    }

    /// 列出所有未评分的提交（批量评分模式的输入）
    pub fn ungraded_submissions(&self) -> Vec<Submission> {
        let mut pending: Vec<Submission> = self
            .submissions
            .lock()
            .expect("submissions 锁中毒")
            .values()
            .filter(|s| !s.is_graded)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.id);
        pending
    }
}

impl SubmissionStore for MemoryStore {
    fn get_assignment_context(
        &self,
        assignment_id: i64,
    ) -> impl Future<Output = AppResult<Option<AssignmentContext>>> + Send {
        let context = self
            .assignments
            .lock()
            .expect("assignments 锁中毒")
            .get(&assignment_id)
            .cloned();
        async move { Ok(context) }
    }

    fn get_submission(
        &self,
        submission_id: i64,
    ) -> impl Future<Output = AppResult<Option<Submission>>> + Send {
        let submission = self
            .submissions
            .lock()
            .expect("submissions 锁中毒")
            .get(&submission_id)
            .cloned();
        async move { Ok(submission) }
    }

    fn update_score(
        &self,
        submission_id: i64,
        score: u32,
        feedback: &str,
    ) -> impl Future<Output = AppResult<()>> + Send {
        let result = {
            let mut submissions = self.submissions.lock().expect("submissions 锁中毒");
            match submissions.get_mut(&submission_id) {
                Some(submission) => {
                    submission.score = Some(score);
                    submission.ai_feedback = Some(feedback.to_string());
                    submission.is_graded = true;
                    Ok(())
                }
                None => Err(StoreError::SubmissionNotFound { submission_id }.into()),
            }
        };
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_assignment(
            1,
            AssignmentContext {
                title: "Essay".to_string(),
                instructions: "Write something".to_string(),
            },
        );
        store.insert_submission(Submission::new(42, 1, 7, "my essay"));
        store
    }

    #[tokio::test]
    async fn test_update_score_is_idempotent() {
        let store = seeded_store();

        store.update_score(42, 9, "Good work").await.expect("写入失败");
        let first = store.get_submission(42).await.expect("查询失败").expect("记录不存在");

        store.update_score(42, 9, "Good work").await.expect("写入失败");
        let second = store.get_submission(42).await.expect("查询失败").expect("记录不存在");

        assert_eq!(first, second);
        assert_eq!(second.score, Some(9));
        assert_eq!(second.ai_feedback.as_deref(), Some("Good work"));
        assert!(second.is_graded);
    }

    #[tokio::test]
    async fn test_update_score_unknown_submission() {
        let store = seeded_store();
        let result = store.update_score(999, 5, "x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ungraded_submissions() {
        let store = seeded_store();
        store.insert_submission(Submission::new(43, 1, 8, "another"));
        assert_eq!(store.ungraded_submissions().len(), 2);

        store.update_score(42, 7, "ok").await.expect("写入失败");
        let pending = store.ungraded_submissions();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 43);
    }
}
