use anyhow::Result;
use clap::Parser;

use exam_generator::cli::Cli;
use exam_generator::utils::logging;
use exam_generator::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // 加载配置：默认值 < TOML < 环境变量 < 命令行
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        config.verbose_logging = true;
    }

    // 初始化日志
    logging::init(config.verbose_logging);

    // 运行子命令
    App::new(config).run(&cli.command).await
}
