use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 评分模型调用错误
    Scorer(ScorerError),
    /// 存储层错误
    Store(StoreError),
    /// 队列错误
    Queue(QueueError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Scorer(e) => write!(f, "评分错误: {}", e),
            AppError::Store(e) => write!(f, "存储错误: {}", e),
            AppError::Queue(e) => write!(f, "队列错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Scorer(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Queue(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 评分模型调用错误
///
/// 所有变体对重试协调器来说都是可重试的：
/// 模型不可用、超时、网络错误都走同一套退避重试流程。
#[derive(Debug)]
pub enum ScorerError {
    /// 模型未初始化（主模型和备用模型均探测失败）
    Unavailable,
    /// 单次评分超过时间预算
    Timeout {
        timeout_ms: u64,
    },
    /// 网络 / API 调用失败
    Transport {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 模型返回空结果
    EmptyResponse {
        model: String,
    },
}

impl fmt::Display for ScorerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerError::Unavailable => write!(f, "评分模型不可用"),
            ScorerError::Timeout { timeout_ms } => {
                write!(f, "评分超时 (预算: {}ms)", timeout_ms)
            }
            ScorerError::Transport { model, source } => {
                write!(f, "评分 API 调用失败 (模型: {}): {}", model, source)
            }
            ScorerError::EmptyResponse { model } => {
                write!(f, "评分模型返回内容为空 (模型: {})", model)
            }
        }
    }
}

impl std::error::Error for ScorerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScorerError::Transport { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 响应解析错误
///
/// 仅在 `ResponseParser` 内部使用：任何解析失败都会走降级提取路径，
/// 不会越过解析器的边界向外传播。
#[derive(Debug)]
pub enum ParseError {
    /// 响应中没有找到 JSON 对象
    NoJsonFound,
    /// JSON 解析失败
    JsonInvalid {
        source: serde_json::Error,
    },
    /// 分数超出合法区间
    ScoreOutOfRange {
        score: f64,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoJsonFound => write!(f, "响应中未找到 JSON 对象"),
            ParseError::JsonInvalid { source } => write!(f, "JSON 解析失败: {}", source),
            ParseError::ScoreOutOfRange { score } => {
                write!(f, "分数 {} 超出合法区间", score)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::JsonInvalid { source } => Some(source),
            _ => None,
        }
    }
}

/// 存储层错误
#[derive(Debug)]
pub enum StoreError {
    /// 作业不存在
    AssignmentNotFound {
        assignment_id: i64,
    },
    /// 提交记录不存在
    SubmissionNotFound {
        submission_id: i64,
    },
    /// 写入失败
    WriteFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AssignmentNotFound { assignment_id } => {
                write!(f, "作业不存在: {}", assignment_id)
            }
            StoreError::SubmissionNotFound { submission_id } => {
                write!(f, "提交记录不存在: {}", submission_id)
            }
            StoreError::WriteFailed { source } => write!(f, "写入失败: {}", source),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::WriteFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 队列错误
#[derive(Debug)]
pub enum QueueError {
    /// 提交内容为空
    EmptyContent {
        submission_id: i64,
    },
    /// 同一提交已在队列中（等待、执行中或在失败登记表里）
    Duplicate {
        submission_id: i64,
    },
    /// 重试次数耗尽，评分永久失败
    TerminalFailure {
        submission_id: i64,
        attempts: u32,
        last_error: String,
    },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::EmptyContent { submission_id } => {
                write!(f, "提交内容为空: {}", submission_id)
            }
            QueueError::Duplicate { submission_id } => {
                write!(f, "提交 {} 已在评分队列中", submission_id)
            }
            QueueError::TerminalFailure {
                submission_id,
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "提交 {} 评分永久失败 (共尝试 {} 次): {}",
                    submission_id, attempts, last_error
                )
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<ScorerError> for AppError {
    fn from(err: ScorerError) -> Self {
        AppError::Scorer(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建评分 API 调用失败错误
    pub fn scorer_transport(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Scorer(ScorerError::Transport {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建评分超时错误
    pub fn scorer_timeout(timeout_ms: u64) -> Self {
        AppError::Scorer(ScorerError::Timeout { timeout_ms })
    }

    /// 创建存储写入失败错误
    pub fn store_write_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Store(StoreError::WriteFailed {
            source: Box::new(source),
        })
    }
}

impl ScorerError {
    /// 创建 API 调用失败错误
    pub fn transport(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ScorerError::Transport {
            model: model.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
