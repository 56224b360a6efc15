mod api;
mod client;
mod config;
mod database;
mod llm;
mod user;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use crate::api::{router, AppContext};
use crate::config::{Cli, Command, LlmConfig, ServeArgs};
use crate::database::setup_database;
use crate::utils::init_logger;
use crate::utils::signal::terminate;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(&cli.log_level);

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => client::repl::run(args).await,
    };
    if let Err(e) = result {
        error!("程序异常退出: {:#}", e);
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = LlmConfig::from(&args.llm);
    info!(
        has_api_url = config.api_url.is_some(),
        has_api_key = config.api_key.is_some(),
        models = %config.model_ids.join(","),
        chat_timeout_secs = config.chat_timeout.as_secs(),
        "LLM 配置已加载"
    );
    if config.model_ids.is_empty() {
        warn!("未配置任何全局模型，只有设置了个人模型的用户可以使用聊天");
    }

    let database_path = args.database_path();
    let db = setup_database(&database_path).await?;
    info!(path = %database_path.display(), "数据库已就绪");

    let ctx = Arc::new(AppContext::new(db, config, &args.user_header)?);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("绑定地址 {} 失败", args.bind))?;
    info!(addr = %args.bind, user_header = %ctx.user_header, "HTTP 服务已启动");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(terminate())
        .await
        .context("HTTP 服务异常退出")?;
    info!("HTTP 服务已停止");
    Ok(())
}
