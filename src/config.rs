/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时进行的评分调用上限
    pub max_concurrent_jobs: usize,
    /// 速率窗口长度（毫秒）
    pub interval_ms: u64,
    /// 每个速率窗口内允许进入执行的任务数
    pub interval_cap: u32,
    /// 单次评分任务的硬超时（毫秒）
    pub job_timeout_ms: u64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避延迟表（毫秒），按尝试次数索引
    pub retry_delays_ms: Vec<u64>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_fallback_model_name: String,
    // --- 批量评分配置 ---
    /// 待评分提交 TOML 文件存放目录
    pub submissions_folder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Gemini 免费档的速率限制大约是 15-60 RPM，
            // 并发 10 + 每秒 10 个的窗口上限足够保守
            max_concurrent_jobs: 10,
            interval_ms: 1000,
            interval_cap: 10,
            job_timeout_ms: 30_000,
            max_retries: 3,
            retry_delays_ms: vec![2000, 5000, 10_000],
            verbose_logging: false,
            output_log_file: "scoring_output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai"
                .to_string(),
            llm_model_name: "gemini-2.0-flash".to_string(),
            llm_fallback_model_name: "gemini-2.0-pro".to_string(),
            submissions_folder: "pending_submissions".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("SCORING_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_jobs),
            interval_ms: std::env::var("SCORING_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.interval_ms),
            interval_cap: std::env::var("SCORING_INTERVAL_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(default.interval_cap),
            job_timeout_ms: std::env::var("SCORING_JOB_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.job_timeout_ms),
            max_retries: std::env::var("SCORING_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            retry_delays_ms: std::env::var("SCORING_RETRY_DELAYS_MS").ok().and_then(|v| parse_delay_list(&v)).unwrap_or(default.retry_delays_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_fallback_model_name: std::env::var("LLM_FALLBACK_MODEL_NAME").unwrap_or(default.llm_fallback_model_name),
            submissions_folder: std::env::var("SUBMISSIONS_FOLDER").unwrap_or(default.submissions_folder),
        }
    }
}

/// 解析逗号分隔的延迟表，例如 "2000,5000,10000"
///
/// 任何一项解析失败都返回 None，回落到默认表
fn parse_delay_list(value: &str) -> Option<Vec<u64>> {
    let delays: Vec<u64> = value
        .split(',')
        .map(|s| s.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    if delays.is_empty() {
        None
    } else {
        Some(delays)
    }
}
