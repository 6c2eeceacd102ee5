//! 评分队列集成测试
//!
//! 用可编排的 mock 评分器驱动整条流水线：
//! 并发上限、速率窗口、退避重试、去重、手动重试、超时处理

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use submission_scoring::{
    AssignmentContext, Config, EventBus, MemoryStore, Scorer, ScorerError, ScoringQueue,
    Submission, SubmissionStore,
};

/// 可编排的 mock 评分器
///
/// 按脚本依次返回结果（脚本耗尽后返回默认响应），
/// 同时记录每次调用的时刻和并发峰值
struct MockScorer {
    script: Mutex<VecDeque<Result<String, String>>>,
    default_response: String,
    delay: Duration,
    available: bool,
    call_times: Mutex<Vec<Instant>>,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl MockScorer {
    fn always(response: &str) -> Self {
        Self::with_script(Vec::new(), response)
    }

    fn with_script(script: Vec<Result<String, String>>, default_response: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_response: default_response.to_string(),
            delay: Duration::ZERO,
            available: true,
            call_times: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn unavailable() -> Self {
        let mut scorer = Self::always("{}");
        scorer.available = false;
        scorer
    }

    fn calls(&self) -> usize {
        self.call_times.lock().expect("call_times 锁中毒").len()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().expect("call_times 锁中毒").clone()
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl Scorer for MockScorer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn score(
        &self,
        _content: &str,
        _context: &AssignmentContext,
    ) -> Result<String, ScorerError> {
        self.call_times
            .lock()
            .expect("call_times 锁中毒")
            .push(Instant::now());

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().expect("script 锁中毒").pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(ScorerError::transport(
                "mock-model",
                std::io::Error::other(msg),
            )),
            None => Ok(self.default_response.clone()),
        }
    }
}

const GOOD_RESPONSE: &str = r#"{"score": 9, "feedback": "Good work"}"#;

fn test_config() -> Config {
    Config {
        max_concurrent_jobs: 10,
        interval_ms: 50,
        interval_cap: 100,
        job_timeout_ms: 5000,
        max_retries: 3,
        retry_delays_ms: vec![100, 200, 400],
        ..Config::default()
    }
}

/// 种子数据：一个作业 + 若干条未评分提交
fn seeded_store(submission_ids: &[i64]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_assignment(
        1,
        AssignmentContext {
            title: "Prompt Engineering Basics".to_string(),
            instructions: "Write a prompt. You must include a persona.".to_string(),
        },
    );
    for id in submission_ids {
        store.insert_submission(Submission::new(*id, 1, 7, format!("submission {}", id)));
    }
    store
}

/// 轮询直到某条提交完成评分，返回该行
async fn wait_until_graded(store: &MemoryStore, submission_id: i64, timeout: Duration) -> Submission {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(row) = store
            .get_submission(submission_id)
            .await
            .expect("查询提交失败")
        {
            if row.is_graded {
                return row;
            }
        }
        assert!(
            Instant::now() < deadline,
            "提交 {} 在 {:?} 内未完成评分",
            submission_id,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// 轮询直到条件成立
async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration, what: &str) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "{} 在 {:?} 内未达成", what, timeout);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_burst_never_exceeds_concurrency_limit() {
    let config = Config {
        max_concurrent_jobs: 3,
        ..test_config()
    };
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE).with_delay(Duration::from_millis(100)));
    let ids: Vec<i64> = (1..=12).collect();
    let store = seeded_store(&ids);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    for id in &ids {
        queue
            .enqueue(*id, &format!("submission {}", id), 1, 7)
            .await
            .expect("入队失败");
    }

    wait_until(
        || queue.get_stats().completed == 12,
        Duration::from_secs(10),
        "全部评分完成",
    )
    .await;

    assert_eq!(scorer.calls(), 12);
    assert!(
        scorer.max_concurrent() <= 3,
        "并发峰值 {} 超过上限 3",
        scorer.max_concurrent()
    );
}

#[tokio::test]
async fn test_rate_window_caps_admissions() {
    let config = Config {
        max_concurrent_jobs: 10,
        interval_ms: 300,
        interval_cap: 2,
        ..test_config()
    };
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE));
    let ids: Vec<i64> = (1..=6).collect();
    let store = seeded_store(&ids);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    for id in &ids {
        queue
            .enqueue(*id, "content", 1, 7)
            .await
            .expect("入队失败");
    }

    wait_until(
        || queue.get_stats().completed == 6,
        Duration::from_secs(10),
        "全部评分完成",
    )
    .await;

    let mut times = scorer.call_times();
    times.sort();
    assert_eq!(times.len(), 6);

    // 每个窗口最多放行 2 个：第 3、5 个调用必须落在后续窗口
    assert!(
        times[2].duration_since(times[0]) >= Duration::from_millis(200),
        "第 3 个调用过早: {:?}",
        times[2].duration_since(times[0])
    );
    assert!(
        times[4].duration_since(times[2]) >= Duration::from_millis(200),
        "第 5 个调用过早: {:?}",
        times[4].duration_since(times[2])
    );
    // 6 个任务至少要占三个窗口
    assert!(times[5].duration_since(times[0]) >= Duration::from_millis(450));
}

#[tokio::test]
async fn test_retry_exhaustion_reaches_terminal_failure_once() {
    let config = Config {
        retry_delays_ms: vec![50, 100, 150],
        ..test_config()
    };
    let scorer = Arc::new(MockScorer::with_script(
        vec![
            Err("connection reset".to_string()),
            Err("connection reset".to_string()),
            Err("connection reset".to_string()),
            Err("connection reset".to_string()),
        ],
        GOOD_RESPONSE,
    ));
    let store = seeded_store(&[42]);
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::clone(&bus));

    queue.enqueue(42, "essay", 1, 7).await.expect("入队失败");

    let row = wait_until_graded(&store, 42, Duration::from_secs(10)).await;

    // 首次尝试 + 3 次重试，然后恰好一次终态失败
    assert_eq!(scorer.calls(), 4);
    assert_eq!(row.score, Some(0));
    let feedback = row.ai_feedback.expect("应有诊断评语");
    assert!(
        feedback.contains("Scoring failed after 4 attempts"),
        "评语不符: {}",
        feedback
    );

    let stats = queue.get_stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);

    let failed = queue.failed_submissions();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].terminal);
    assert_eq!(failed[0].job.submission_id, 42);

    // 永久失败也要广播
    let event = rx.recv().await.expect("应收到失败广播");
    assert_eq!(event.payload["id"], 42);
    assert_eq!(event.payload["score"], 0);
}

#[tokio::test]
async fn test_duplicate_enqueue_while_in_flight_scores_once() {
    let config = test_config();
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE).with_delay(Duration::from_millis(150)));
    let store = seeded_store(&[7]);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    queue.enqueue(7, "essay", 1, 7).await.expect("首次入队应成功");
    let duplicate = queue.enqueue(7, "essay", 1, 7).await;
    assert!(duplicate.is_err(), "重复入队应被拒绝");

    wait_until(
        || queue.get_stats().completed == 1,
        Duration::from_secs(5),
        "评分完成",
    )
    .await;

    assert_eq!(scorer.calls(), 1, "同一提交不应并发评分两次");
}

#[tokio::test]
async fn test_fail_twice_then_succeed_with_backoff_spacing() {
    let config = Config {
        retry_delays_ms: vec![100, 200, 400],
        ..test_config()
    };
    let scorer = Arc::new(MockScorer::with_script(
        vec![
            Err("503 unavailable".to_string()),
            Err("503 unavailable".to_string()),
            Ok(GOOD_RESPONSE.to_string()),
        ],
        GOOD_RESPONSE,
    ));
    let store = seeded_store(&[42]);
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::clone(&bus));

    queue.enqueue(42, "essay", 1, 7).await.expect("入队失败");

    let row = wait_until_graded(&store, 42, Duration::from_secs(10)).await;

    assert_eq!(row.score, Some(9));
    assert_eq!(row.ai_feedback.as_deref(), Some("Good work"));
    assert_eq!(scorer.calls(), 3);

    // 第 2、3 次调用之间的间隔应符合退避表（允许调度误差）
    let times = scorer.call_times();
    let gap_1 = times[1].duration_since(times[0]);
    let gap_2 = times[2].duration_since(times[1]);
    assert!(gap_1 >= Duration::from_millis(90), "首次退避过短: {:?}", gap_1);
    assert!(gap_1 <= Duration::from_millis(1000), "首次退避过长: {:?}", gap_1);
    assert!(gap_2 >= Duration::from_millis(180), "二次退避过短: {:?}", gap_2);
    assert!(gap_2 <= Duration::from_millis(1200), "二次退避过长: {:?}", gap_2);

    // 成功事件只广播一次，且带最终分数
    let event = rx.recv().await.expect("应收到评分广播");
    assert_eq!(event.payload["id"], 42);
    assert_eq!(event.payload["score"], 9);

    let stats = queue.get_stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_manual_retry_after_terminal_failure() {
    let config = Config {
        retry_delays_ms: vec![30, 30, 30],
        ..test_config()
    };
    // 前 4 次全失败（耗尽重试），之后默认返回 6 分
    let scorer = Arc::new(MockScorer::with_script(
        vec![
            Err("boom".to_string()),
            Err("boom".to_string()),
            Err("boom".to_string()),
            Err("boom".to_string()),
        ],
        r#"{"score": 6, "feedback": "Recovered"}"#,
    ));
    let store = seeded_store(&[42]);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    queue.enqueue(42, "essay", 1, 7).await.expect("入队失败");

    // 等到终态失败落库
    let row = wait_until_graded(&store, 42, Duration::from_secs(10)).await;
    assert_eq!(row.score, Some(0));
    assert_eq!(scorer.calls(), 4);

    // 手动重试：清零尝试计数，跳过退避
    assert!(queue.retry_failed(42), "登记表中的提交应可手动重试");
    assert!(!queue.retry_failed(999), "未知提交应返回 false");

    wait_until(
        || queue.get_stats().completed == 1,
        Duration::from_secs(5),
        "手动重试评分完成",
    )
    .await;

    let row = store
        .get_submission(42)
        .await
        .expect("查询失败")
        .expect("记录不存在");
    assert_eq!(row.score, Some(6));
    assert_eq!(scorer.calls(), 5);
    assert!(queue.failed_submissions().is_empty(), "成功后登记表应清空");
}

#[tokio::test]
async fn test_unavailable_scorer_fails_jobs_without_crashing() {
    let config = Config {
        retry_delays_ms: vec![20, 20, 20],
        ..test_config()
    };
    let scorer = Arc::new(MockScorer::unavailable());
    let store = seeded_store(&[42]);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    queue.enqueue(42, "essay", 1, 7).await.expect("入队失败");

    let row = wait_until_graded(&store, 42, Duration::from_secs(10)).await;

    // 模型从未被真正调用，但任务照常走完重试并拿到哨兵结果
    assert_eq!(scorer.calls(), 0);
    assert_eq!(row.score, Some(0));
    assert!(row
        .ai_feedback
        .expect("应有诊断评语")
        .contains("Scoring failed after 4 attempts"));
}

#[tokio::test]
async fn test_timeout_flows_into_retry_like_transport_error() {
    let config = Config {
        job_timeout_ms: 80,
        max_retries: 1,
        retry_delays_ms: vec![50],
        ..test_config()
    };
    // 每次调用都睡 300ms，必然超时
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE).with_delay(Duration::from_millis(300)));
    let store = seeded_store(&[42]);
    let queue = ScoringQueue::new(&config, Arc::clone(&scorer), Arc::clone(&store), Arc::new(EventBus::new()));

    queue.enqueue(42, "essay", 1, 7).await.expect("入队失败");

    let row = wait_until_graded(&store, 42, Duration::from_secs(10)).await;

    assert_eq!(scorer.calls(), 2, "超时后应照常重试");
    assert_eq!(row.score, Some(0));
    assert!(row
        .ai_feedback
        .expect("应有诊断评语")
        .contains("Scoring failed after 2 attempts"));
}

#[tokio::test]
async fn test_enqueue_validation() {
    let config = test_config();
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE));
    let store = seeded_store(&[42]);
    let queue = ScoringQueue::new(&config, scorer, Arc::clone(&store), Arc::new(EventBus::new()));

    // 空内容
    assert!(queue.enqueue(42, "   ", 1, 7).await.is_err());
    // 作业不存在
    assert!(queue.enqueue(42, "essay", 999, 7).await.is_err());
    // 校验失败的任务没有进入队列
    assert_eq!(queue.get_stats().total, 0);
}

#[tokio::test]
async fn test_stats_snapshot_after_drain() {
    let config = test_config();
    let scorer = Arc::new(MockScorer::always(GOOD_RESPONSE));
    let ids: Vec<i64> = (1..=5).collect();
    let store = seeded_store(&ids);
    let queue = ScoringQueue::new(&config, scorer, Arc::clone(&store), Arc::new(EventBus::new()));

    for id in &ids {
        queue.enqueue(*id, "content", 1, 7).await.expect("入队失败");
    }

    wait_until(
        || queue.get_stats().is_idle() && queue.get_stats().completed == 5,
        Duration::from_secs(5),
        "队列排空",
    )
    .await;

    let stats = queue.get_stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.retrying, 0);
    assert_eq!(stats.failed, 0);

    // 每条提交都拿到了解析后的分数
    for id in ids {
        let row = store
            .get_submission(id)
            .await
            .expect("查询失败")
            .expect("记录不存在");
        assert_eq!(row.score, Some(9));
    }
}
