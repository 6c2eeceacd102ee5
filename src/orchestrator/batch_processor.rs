//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是二进制入口的主体，负责离线批量评分：
//!
//! 1. **应用初始化**：启动日志、探测评分模型、创建队列
//! 2. **批量加载**：扫描并加载所有待评分的提交（TOML 文件）
//! 3. **种子数据**：把作业和提交写入内存存储
//! 4. **全部入队**：逐条提交给评分队列
//! 5. **等待排空**：轮询统计直到队列空闲
//! 6. **全局统计**：输出最终评分结果汇总
//!
//! 在线场景（HTTP 服务）不走这里：直接构造 `ScoringQueue`
//! 并在请求处理器里调用 `enqueue` 即可。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{EventBus, MemoryStore};
use crate::models::{load_all_toml_files, AssignmentContext, Submission};
use crate::orchestrator::scoring_queue::ScoringQueue;
use crate::services::{LlmScorer, Scorer};
use crate::utils::logging::{init_log_file, log_batches_loaded, log_startup, print_final_stats};

/// 排空轮询间隔
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    queue: ScoringQueue<LlmScorer, MemoryStore, EventBus>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(
            config.max_concurrent_jobs,
            config.interval_cap,
            config.interval_ms,
        );

        // 探测评分模型（主模型失败会尝试一次备用模型）
        let scorer = Arc::new(LlmScorer::initialize(&config).await);
        if !scorer.is_available() {
            warn!("⚠️ 评分模型不可用，所有任务将在重试耗尽后标记为失败");
        }

        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let queue = ScoringQueue::new(&config, scorer, Arc::clone(&store), Arc::clone(&bus));

        Ok(Self {
            config,
            store,
            bus,
            queue,
        })
    }

    /// 运行批量评分主逻辑
    pub async fn run(&self) -> Result<()> {
        // 加载所有待评分的提交
        let batches = load_all_toml_files(&self.config.submissions_folder).await?;

        if batches.is_empty() {
            warn!("⚠️ 没有找到待评分的TOML文件，程序结束");
            return Ok(());
        }

        let submission_count: usize = batches.iter().map(|b| b.submissions.len()).sum();
        log_batches_loaded(batches.len(), submission_count);

        // 订阅评分事件，实时输出进度
        if self.config.verbose_logging {
            let mut rx = self.bus.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    info!(
                        "📡 {} | 提交 {} 得分 {}",
                        event.event, event.payload["id"], event.payload["score"]
                    );
                }
            });
        }

        // 种子数据：作业上下文 + 提交记录
        for batch in &batches {
            self.store.insert_assignment(
                batch.assignment.id,
                AssignmentContext {
                    title: batch.assignment.title.clone(),
                    instructions: batch.assignment.instructions.clone(),
                },
            );
            for submission in &batch.submissions {
                self.store.insert_submission(Submission::new(
                    submission.id,
                    batch.assignment.id,
                    submission.owner_id,
                    submission.content.clone(),
                ));
            }
        }

        // 全部入队
        for batch in &batches {
            for submission in &batch.submissions {
                if let Err(e) = self
                    .queue
                    .enqueue(
                        submission.id,
                        &submission.content,
                        batch.assignment.id,
                        submission.owner_id,
                    )
                    .await
                {
                    error!("[提交 {}] 入队失败: {}", submission.id, e);
                }
            }
        }

        // 等待队列排空
        self.wait_until_idle().await;

        print_final_stats(&self.queue.get_stats(), &self.config.output_log_file);

        Ok(())
    }

    /// 轮询统计直到队列空闲
    async fn wait_until_idle(&self) {
        loop {
            let stats = self.queue.get_stats();
            if stats.is_idle() {
                break;
            }
            if self.config.verbose_logging {
                info!(
                    "⏱️ 进度: 排队 {} | 执行中 {} | 完成 {} | 重试中 {} | 失败 {}",
                    stats.queued, stats.in_flight, stats.completed, stats.retrying, stats.failed
                );
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        // 终态的落库和广播在统计更新之后进行，稍等片刻再汇总
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
