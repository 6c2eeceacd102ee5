use anyhow::Result;
use submission_scoring::utils::logging;
use submission_scoring::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行批量评分
    App::initialize(config).await?.run().await?;

    Ok(())
}
