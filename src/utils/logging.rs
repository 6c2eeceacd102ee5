/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::QueueStats;

/// 初始化 tracing 日志
///
/// 默认级别 info，可通过 RUST_LOG 环境变量覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n评分处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(max_concurrent: usize, interval_cap: u32, interval_ms: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 自动评分模式");
    info!("📊 最大并发数: {}", max_concurrent);
    info!("⏱️ 速率上限: {} 个 / {}ms", interval_cap, interval_ms);
    info!("{}", "=".repeat(60));
}

/// 记录批次加载信息
pub fn log_batches_loaded(batch_count: usize, submission_count: usize) {
    info!("✓ 找到 {} 个作业批次，共 {} 条待评分提交", batch_count, submission_count);
    info!("💡 全部入队后等待队列排空\n");
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &QueueStats, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}", stats.completed);
    info!("❌ 永久失败: {}", stats.failed);
    info!("📥 累计入队: {}", stats.total);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
