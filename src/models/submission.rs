use serde::{Deserialize, Serialize};

/// 作业上下文
///
/// 构造评分提示词所需的只读信息，由存储层按作业 ID 查出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentContext {
    pub title: String,
    #[serde(default)]
    pub instructions: String,
}

/// 提交记录
///
/// 存储层持有的完整行，评分完成后整行作为广播事件的载荷发出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub assignment_id: i64,
    pub user_id: i64,
    pub content: String,
    /// 提交时间（epoch 毫秒）
    #[serde(default)]
    pub submitted_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    #[serde(default)]
    pub is_graded: bool,
}

impl Submission {
    /// 创建一条尚未评分的提交记录
    pub fn new(id: i64, assignment_id: i64, user_id: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            assignment_id,
            user_id,
            content: content.into(),
            submitted_at_ms: chrono::Utc::now().timestamp_millis(),
            score: None,
            ai_feedback: None,
            is_graded: false,
        }
    }
}

/// 批量评分输入文件
///
/// 一个 TOML 文件对应一个作业及其全部待评分提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionBatch {
    pub assignment: BatchAssignment,
    #[serde(default)]
    pub submissions: Vec<BatchSubmission>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAssignment {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub id: i64,
    pub owner_id: i64,
    pub content: String,
}
