use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use once_cell::sync::Lazy;

use crate::llm::FALLBACK_MODEL_ID;

/// 默认配置目录（数据库文件所在位置）
pub static CONFIG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("texchat")
});

pub const DEFAULT_USER_HEADER: &str = "x-user-id";

#[derive(Parser, Debug)]
#[command(name = "texchat-rs", version, about = "Ask AI 聊天代理与用户 LLM 设置服务")]
pub struct Cli {
    /// 日志级别（trace/debug/info/warn/error）
    #[arg(long, env = "TEXCHAT_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 启动 HTTP 服务
    Serve(ServeArgs),
    /// 终端聊天客户端
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "TEXCHAT_BIND", default_value = "0.0.0.0:12345")]
    pub bind: SocketAddr,

    /// SQLite 数据库文件，默认位于配置目录下
    #[arg(long, env = "TEXCHAT_DATABASE")]
    pub database: Option<PathBuf>,

    /// 认证层写入用户 ID 的请求头
    #[arg(long, env = "TEXCHAT_USER_HEADER", default_value = DEFAULT_USER_HEADER)]
    pub user_header: String,

    #[command(flatten)]
    pub llm: LlmArgs,
}

impl ServeArgs {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| CONFIG_DIR.join("data.sqlite"))
    }
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// 服务地址
    #[arg(long, env = "TEXCHAT_SERVER", default_value = "http://127.0.0.1:12345")]
    pub server: String,

    /// 项目 ID
    #[arg(long)]
    pub project: String,

    /// 以该用户身份请求（个人模型需要）
    #[arg(long, env = "TEXCHAT_USER")]
    pub user: Option<String>,

    #[arg(long, env = "TEXCHAT_USER_HEADER", default_value = DEFAULT_USER_HEADER)]
    pub user_header: String,
}

/// 未配置模型列表时的回退策略
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModelFallback {
    /// 不提供任何全局模型
    #[default]
    Strict,
    /// 回退到内置的默认模型
    Permissive,
}

/// 全局 LLM 相关参数，全部可由环境变量提供
#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    #[arg(long = "llm-api-url", env = "LLM_API_URL")]
    pub api_url: Option<String>,

    #[arg(long = "llm-api-key", env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// 逗号分隔的模型列表，第一个为默认模型
    #[arg(long = "llm-available-models", env = "LLM_AVAILABLE_MODELS")]
    pub available_models: Option<String>,

    /// 单模型回退
    #[arg(long = "llm-model-name", env = "LLM_MODEL_NAME")]
    pub model_name: Option<String>,

    #[arg(
        long = "llm-model-fallback",
        env = "LLM_MODEL_FALLBACK",
        value_enum,
        default_value_t = ModelFallback::Strict
    )]
    pub model_fallback: ModelFallback,

    #[arg(long = "llm-chat-timeout-secs", env = "LLM_CHAT_TIMEOUT_SECS", default_value_t = 300)]
    pub chat_timeout_secs: u64,

    #[arg(long = "llm-check-timeout-secs", env = "LLM_CHECK_TIMEOUT_SECS", default_value_t = 30)]
    pub check_timeout_secs: u64,
}

/// 进程启动时解析一次的 LLM 配置，通过 `Arc` 注入到模型解析器与聊天代理
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// 全局模型 ID，保持配置顺序
    pub model_ids: Vec<String>,
    /// 聊天请求上限，需低于上游反向代理的 10 分钟超时
    pub chat_timeout: Duration,
    pub check_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model_ids: Vec::new(),
            chat_timeout: Duration::from_secs(300),
            check_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&LlmArgs> for LlmConfig {
    fn from(args: &LlmArgs) -> Self {
        let source = args.available_models.as_deref().or(args.model_name.as_deref());
        Self {
            api_url: non_blank(args.api_url.as_deref()),
            api_key: non_blank(args.api_key.as_deref()),
            model_ids: resolve_model_ids(source, args.model_fallback),
            chat_timeout: Duration::from_secs(args.chat_timeout_secs),
            check_timeout: Duration::from_secs(args.check_timeout_secs),
        }
    }
}

impl LlmConfig {
    /// 全局凭据是否完整
    pub fn server_credentials(&self) -> Option<(&str, &str)> {
        match (self.api_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// 解析逗号分隔的模型列表
///
/// 变量未设置时按回退策略处理；设置了但解析后为空则视为没有全局模型。
pub fn resolve_model_ids(source: Option<&str>, fallback: ModelFallback) -> Vec<String> {
    match source {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        None => match fallback {
            ModelFallback::Strict => Vec::new(),
            ModelFallback::Permissive => vec![FALLBACK_MODEL_ID.to_string()],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> LlmArgs {
        LlmArgs {
            api_url: None,
            api_key: None,
            available_models: None,
            model_name: None,
            model_fallback: ModelFallback::Strict,
            chat_timeout_secs: 300,
            check_timeout_secs: 30,
        }
    }

    #[test]
    fn test_resolve_model_ids_keeps_order_and_drops_blanks() {
        let ids = resolve_model_ids(Some(" a , b,, c ,"), ModelFallback::Strict);
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_model_ids_fallback() {
        assert!(resolve_model_ids(None, ModelFallback::Strict).is_empty());
        assert_eq!(
            resolve_model_ids(None, ModelFallback::Permissive),
            vec![FALLBACK_MODEL_ID.to_string()]
        );
        // 显式设置为空串时不走回退
        assert!(resolve_model_ids(Some(" , "), ModelFallback::Permissive).is_empty());
    }

    #[test]
    fn test_available_models_take_precedence_over_model_name() {
        let mut a = args();
        a.available_models = Some("m1,m2".to_string());
        a.model_name = Some("single".to_string());
        assert_eq!(LlmConfig::from(&a).model_ids, vec!["m1", "m2"]);

        a.available_models = None;
        assert_eq!(LlmConfig::from(&a).model_ids, vec!["single"]);
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let mut a = args();
        a.api_url = Some("  ".to_string());
        a.api_key = Some("sk-1".to_string());
        let config = LlmConfig::from(&a);
        assert!(config.api_url.is_none());
        assert!(config.server_credentials().is_none());

        a.api_url = Some("https://llm.example/v1".to_string());
        let config = LlmConfig::from(&a);
        assert_eq!(config.server_credentials(), Some(("https://llm.example/v1", "sk-1")));
    }
}
