//! 评分队列 - 编排层
//!
//! ## 职责
//!
//! 本模块是评分流水线的入口，负责任务准入、限流和重试协调。
//!
//! ## 核心功能
//!
//! 1. **非阻塞入队**：`enqueue` 校验后立即返回，评分在后台进行
//! 2. **并发控制**：Semaphore 限制同时进行的模型调用数
//! 3. **速率控制**：固定窗口限制每个时间片进入执行的任务数
//! 4. **优先级**：重试任务排在新任务前面，避免被新提交淹没
//! 5. **重试协调**：失败后按退避表延迟重新入队，耗尽后写入哨兵结果
//! 6. **去重**：同一提交在任一时刻至多出现在
//!    {排队, 执行中, 失败登记表} 之一，不会并发评两次
//!
//! ## 共享状态
//!
//! `QueueState` 是本子系统唯一的共享可变状态，由一把互斥锁独占保护；
//! 簿记逻辑永远不会并发执行，真正重叠的只有模型网络调用本身。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, QueueError, ScorerError, StoreError};
use crate::infrastructure::{BroadcastChannel, SubmissionStore};
use crate::models::{FailedSubmission, QueueStats, ScoringJob, ScoringResult};
use crate::orchestrator::retry::{RetryDecision, RetryPolicy};
use crate::services::{ResponseParser, ResultPublisher, Scorer};
use crate::workflow::ScoringFlow;

/// 评分队列
///
/// 进程级单例，生命周期与进程一致。clone 共享同一个队列。
pub struct ScoringQueue<C, S, B> {
    inner: Arc<QueueInner<C, S, B>>,
}

impl<C, S, B> Clone for ScoringQueue<C, S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// 限流参数（从 Config 摘出，避免队列持有整个配置）
#[derive(Debug, Clone)]
struct QueueLimits {
    interval: Duration,
    interval_cap: u32,
    job_timeout: Duration,
}

struct QueueInner<C, S, B> {
    limits: QueueLimits,
    policy: RetryPolicy,
    state: Mutex<QueueState>,
    semaphore: Arc<Semaphore>,
    notify: Notify,
    store: Arc<S>,
    flow: ScoringFlow<C, S, B>,
    publisher: ResultPublisher<S, B>,
}

/// 队列的全部共享可变状态
struct QueueState {
    /// 等待执行的重试任务（优先）
    pending_retries: VecDeque<ScoringJob>,
    /// 等待执行的新任务
    pending_fresh: VecDeque<ScoringJob>,
    /// 排队中 + 执行中的提交 ID（准入去重）
    tracked: HashSet<i64>,
    /// 失败登记表：等待退避的和已永久失败的
    failed: HashMap<i64, FailedSubmission>,
    in_flight: usize,
    window_start: Instant,
    window_admitted: u32,
    total: u64,
    completed: u64,
    failed_count: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending_retries: VecDeque::new(),
            pending_fresh: VecDeque::new(),
            tracked: HashSet::new(),
            failed: HashMap::new(),
            in_flight: 0,
            window_start: Instant::now(),
            window_admitted: 0,
            total: 0,
            completed: 0,
            failed_count: 0,
        }
    }

    /// 按优先级取下一个任务：重试先于新任务，同级 FIFO
    fn pop_next(&mut self) -> Option<ScoringJob> {
        self.pending_retries
            .pop_front()
            .or_else(|| self.pending_fresh.pop_front())
    }

    fn queued(&self) -> usize {
        self.pending_retries.len() + self.pending_fresh.len()
    }
}

impl<C, S, B> ScoringQueue<C, S, B>
where
    C: Scorer,
    S: SubmissionStore,
    B: BroadcastChannel,
{
    /// 创建评分队列并启动调度器
    ///
    /// 必须在 tokio 运行时内调用
    pub fn new(config: &Config, scorer: Arc<C>, store: Arc<S>, bus: Arc<B>) -> Self {
        let publisher = ResultPublisher::new(Arc::clone(&store), bus);
        let flow = ScoringFlow::new(scorer, ResponseParser::new(), publisher.clone());

        let inner = Arc::new(QueueInner {
            limits: QueueLimits {
                interval: Duration::from_millis(config.interval_ms),
                interval_cap: config.interval_cap,
                job_timeout: Duration::from_millis(config.job_timeout_ms),
            },
            policy: RetryPolicy::from_config(config),
            state: Mutex::new(QueueState::new()),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            notify: Notify::new(),
            store,
            flow,
            publisher,
        });

        QueueInner::spawn_dispatcher(Arc::clone(&inner));

        info!(
            "📬 评分队列已初始化 (并发上限: {}, 速率: {}/{}ms)",
            config.max_concurrent_jobs, config.interval_cap, config.interval_ms
        );

        Self { inner }
    }

    /// 把一份提交加入评分队列
    ///
    /// 校验内容非空、作业存在后立即返回；评分在后台进行，
    /// 结果通过广播通道送达。
    ///
    /// # 错误
    /// - `QueueError::EmptyContent` - 提交内容为空
    /// - `StoreError::AssignmentNotFound` - 作业不存在
    /// - `QueueError::Duplicate` - 同一提交已在处理中
    pub async fn enqueue(
        &self,
        submission_id: i64,
        content: &str,
        assignment_id: i64,
        owner_id: i64,
    ) -> AppResult<()> {
        if content.trim().is_empty() {
            return Err(QueueError::EmptyContent { submission_id }.into());
        }

        // 作业上下文在入队时查出，重试直接复用
        let context = self
            .inner
            .store
            .get_assignment_context(assignment_id)
            .await?
            .ok_or(StoreError::AssignmentNotFound { assignment_id })?;

        let job = ScoringJob {
            submission_id,
            content: content.to_string(),
            assignment_id,
            owner_id,
            context,
            attempt: 0,
        };

        self.inner.admit_new(job)
    }

    /// 获取队列统计快照（非阻塞，可轮询）
    pub fn get_stats(&self) -> QueueStats {
        let st = self.inner.lock_state();
        QueueStats {
            total: st.total,
            queued: st.queued(),
            in_flight: st.in_flight,
            completed: st.completed,
            failed: st.failed_count,
            retrying: st.failed.values().filter(|f| !f.terminal).count()
                + st.pending_retries.len(),
            failed_submissions: st.failed.len(),
        }
    }

    /// 列出失败登记表（诊断用）
    pub fn failed_submissions(&self) -> Vec<FailedSubmission> {
        let st = self.inner.lock_state();
        let mut entries: Vec<FailedSubmission> = st.failed.values().cloned().collect();
        entries.sort_by_key(|e| e.job.submission_id);
        entries
    }

    /// 手动重试一个失败的提交
    ///
    /// 对等待退避的和已永久失败的都有效：清零尝试计数立即重新入队，
    /// 跳过剩余的退避等待。返回 false 表示该提交不在失败登记表中。
    pub fn retry_failed(&self, submission_id: i64) -> bool {
        let requeued = {
            let mut st = self.inner.lock_state();
            match st.failed.remove(&submission_id) {
                Some(entry) => {
                    let mut job = entry.job;
                    job.attempt = 0;
                    st.tracked.insert(submission_id);
                    st.total += 1;
                    st.pending_fresh.push_back(job);
                    true
                }
                None => false,
            }
        };

        if requeued {
            info!("[提交 {}] 🔄 手动重试已入队", submission_id);
            self.inner.notify.notify_one();
        }
        requeued
    }

    /// 清空失败登记表（慎用）
    ///
    /// 同时取消对应的待触发退避重试。返回清除的条目数。
    pub fn clear_failed(&self) -> usize {
        let mut st = self.inner.lock_state();
        let cleared = st.failed.len();
        st.failed.clear();
        cleared
    }
}

impl<C, S, B> QueueInner<C, S, B>
where
    C: Scorer,
    S: SubmissionStore,
    B: BroadcastChannel,
{
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("队列状态锁中毒")
    }

    /// 新任务准入：去重后按优先级入队
    fn admit_new(&self, job: ScoringJob) -> AppResult<()> {
        let submission_id = job.submission_id;
        {
            let mut st = self.lock_state();
            if st.tracked.contains(&submission_id) || st.failed.contains_key(&submission_id) {
                warn!("[提交 {}] 已在评分流程中，忽略重复入队", submission_id);
                return Err(QueueError::Duplicate { submission_id }.into());
            }
            st.tracked.insert(submission_id);
            st.total += 1;
            if job.attempt > 0 {
                st.pending_retries.push_back(job);
            } else {
                st.pending_fresh.push_back(job);
            }
        }

        debug!("[提交 {}] 已入队", submission_id);
        self.notify.notify_one();
        Ok(())
    }

    fn has_pending(&self) -> bool {
        self.lock_state().queued() > 0
    }

    /// 调度器主循环
    ///
    /// 等待任务 → 拿并发许可 → 过速率窗口 → 派发 worker。
    /// worker 的任何结局都会回到 on_success / on_failure，
    /// 不存在没有完成处理器的异步任务。
    fn spawn_dispatcher(inner: Arc<Self>) {
        tokio::spawn(async move {
            debug!("评分队列调度器已启动");
            loop {
                while !inner.has_pending() {
                    inner.notify.notified().await;
                }

                let Ok(permit) = inner.semaphore.clone().acquire_owned().await else {
                    error!("并发信号量已关闭，调度器退出");
                    return;
                };

                inner.wait_rate_slot().await;

                let Some(job) = inner.take_next() else {
                    drop(permit);
                    continue;
                };

                let worker = Arc::clone(&inner);
                tokio::spawn(async move {
                    // 许可在整次尝试期间持有，尝试结束随任务释放；
                    // 退避等待发生在另一个任务里，不占并发额度
                    let _permit = permit;
                    worker.run_attempt(job).await;
                });
            }
        });
    }

    /// 固定窗口速率准入：窗口内名额用完就睡到窗口结束
    async fn wait_rate_slot(&self) {
        loop {
            let wait = {
                let mut st = self.lock_state();
                let now = Instant::now();
                if now.duration_since(st.window_start) >= self.limits.interval {
                    st.window_start = now;
                    st.window_admitted = 0;
                }
                if st.window_admitted < self.limits.interval_cap {
                    st.window_admitted += 1;
                    return;
                }
                self.limits.interval - now.duration_since(st.window_start)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// 取下一个任务并标记为执行中（持有并发许可时才调用）
    fn take_next(&self) -> Option<ScoringJob> {
        let mut st = self.lock_state();
        let job = st.pop_next()?;
        st.in_flight += 1;
        Some(job)
    }

    /// 执行一次评分尝试
    ///
    /// 硬超时按评分错误处理，和网络错误走同一条失败路径
    async fn run_attempt(self: Arc<Self>, job: ScoringJob) {
        let submission_id = job.submission_id;
        info!(
            "[提交 {}] 🎯 开始评分 (第 {} 次尝试)",
            submission_id,
            job.attempt + 1
        );

        let timeout_ms = self.limits.job_timeout.as_millis() as u64;
        let outcome = match tokio::time::timeout(self.limits.job_timeout, self.flow.execute(&job))
            .await
        {
            Ok(result) => result,
            // 超时等同于评分调用抛错：放弃等待，但不保证远端调用停止
            Err(_) => Err(AppError::Scorer(ScorerError::Timeout { timeout_ms })),
        };

        match outcome {
            Ok(result) => self.on_success(&job, &result),
            Err(e) => self.on_failure(job, e).await,
        }
    }

    /// 成功收尾：解除跟踪，清掉历史失败记录
    fn on_success(&self, job: &ScoringJob, result: &ScoringResult) {
        {
            let mut st = self.lock_state();
            st.tracked.remove(&job.submission_id);
            st.in_flight -= 1;
            st.failed.remove(&job.submission_id);
            st.completed += 1;
        }
        info!(
            "[提交 {}] ✅ 评分完成: {}/10",
            job.submission_id, result.score
        );
    }

    /// 失败收尾：交给重试策略决定延迟重试还是永久失败
    async fn on_failure(self: Arc<Self>, job: ScoringJob, error: AppError) {
        let submission_id = job.submission_id;
        warn!(
            "[提交 {}] ❌ 第 {} 次尝试失败: {}",
            submission_id,
            job.attempt + 1,
            error
        );

        match self.policy.decide(job.attempt) {
            RetryDecision::Retry { delay } => {
                let mut retry_job = job;
                retry_job.attempt += 1;
                let next_attempt = retry_job.attempt;

                {
                    let mut st = self.lock_state();
                    st.tracked.remove(&submission_id);
                    st.in_flight -= 1;
                    st.failed.insert(
                        submission_id,
                        FailedSubmission {
                            job: retry_job,
                            error: error.to_string(),
                            next_retry_at_ms: Some(
                                chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64,
                            ),
                            terminal: false,
                        },
                    );
                }

                info!(
                    "[提交 {}] ⏳ {}ms 后进行第 {} 次尝试",
                    submission_id,
                    delay.as_millis(),
                    next_attempt + 1
                );

                let inner = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.resubmit_after_backoff(submission_id, next_attempt);
                });
            }
            RetryDecision::GiveUp => {
                let attempts = job.attempt + 1;
                let terminal = QueueError::TerminalFailure {
                    submission_id,
                    attempts,
                    last_error: error.to_string(),
                };
                error!("[提交 {}] ⚠️ {}", submission_id, terminal);

                {
                    let mut st = self.lock_state();
                    st.tracked.remove(&submission_id);
                    st.in_flight -= 1;
                    st.failed_count += 1;
                    st.failed.insert(
                        submission_id,
                        FailedSubmission {
                            job: job.clone(),
                            error: error.to_string(),
                            next_retry_at_ms: None,
                            terminal: true,
                        },
                    );
                }

                // 哨兵结果照常落库并广播；这里失败只记日志
                self.publisher
                    .publish_failure(&job, attempts, &error.to_string())
                    .await;
            }
        }
    }

    /// 退避结束后重新入队
    ///
    /// 只有登记表条目仍然存在且尝试计数匹配时才会触发；
    /// 手动重试或 clear_failed 会让这里静默跳过
    fn resubmit_after_backoff(&self, submission_id: i64, expected_attempt: u32) {
        let requeued = {
            let mut st = self.lock_state();
            let matches = st
                .failed
                .get(&submission_id)
                .map(|entry| !entry.terminal && entry.job.attempt == expected_attempt)
                .unwrap_or(false);
            if !matches {
                debug!(
                    "[提交 {}] 退避定时器触发但登记表条目已变更，跳过",
                    submission_id
                );
                false
            } else if let Some(entry) = st.failed.remove(&submission_id) {
                st.tracked.insert(submission_id);
                st.total += 1;
                st.pending_retries.push_back(entry.job);
                true
            } else {
                false
            }
        };

        if requeued {
            info!(
                "[提交 {}] 🔁 重新入队 (第 {} 次尝试)",
                submission_id,
                expected_attempt + 1
            );
            self.notify.notify_one();
        }
    }
}
