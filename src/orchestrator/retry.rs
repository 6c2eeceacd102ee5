//! 重试策略 - 编排层
//!
//! 把"第 N 次尝试失败"转换成"延迟多久后重试"或"宣告永久失败"。
//!
//! 每个提交的状态机：
//! 首次尝试 → 重试 1 → 重试 2 → 重试 3 → { 成功 | 永久失败 }
//! 终态不可逆（手动重试会把尝试计数清零重新开始）

use std::time::Duration;

use crate::config::Config;

/// 尝试次数超出退避表时的兜底延迟
const FALLBACK_DELAY_MS: u64 = 10_000;

/// 失败后的处置决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 延迟 `delay` 后重新入队
    Retry { delay: Duration },
    /// 重试次数耗尽，宣告永久失败
    GiveUp,
}

/// 重试策略
///
/// 退避表按尝试次数索引（0 = 首次尝试失败后的延迟），
/// 超出表长时复用最后一项
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delays_ms: &[u64]) -> Self {
        let delays = if delays_ms.is_empty() {
            vec![Duration::from_millis(FALLBACK_DELAY_MS)]
        } else {
            delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
        };
        Self {
            max_retries,
            delays,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, &config.retry_delays_ms)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 决定第 `attempt` 次尝试（0-based）失败后的处置
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt < self.max_retries {
            let index = attempt as usize;
            let delay = self
                .delays
                .get(index)
                .copied()
                .unwrap_or_else(|| *self.delays.last().expect("退避表不为空"));
            RetryDecision::Retry { delay }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let config = Config::default();
        Self::from_config(&config)
    }
}
