use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::ask_ai::{ask_about_error, LogEntry, LogLevel, OpenDocument};
use super::fetch::ApiClient;
use super::session::{ChatError, ChatSession, HttpChatTransport, SendOutcome};
use crate::config::ChatArgs;

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    Models,
    Select(String),
    Rerun,
    Clear,
    /// `/ask <file> <line> <message>`：按编译错误提问，附带文件中的源码上下文
    Ask {
        file: PathBuf,
        line: usize,
        message: String,
    },
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(input: &str) -> ReplCommand {
    let input = input.trim();
    if input.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = input.strip_prefix('/') else {
        return ReplCommand::Send(input.to_string());
    };
    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "quit" | "exit" => ReplCommand::Quit,
        "models" => ReplCommand::Models,
        "model" if !rest.is_empty() => ReplCommand::Select(rest.to_string()),
        "rerun" => ReplCommand::Rerun,
        "clear" => ReplCommand::Clear,
        "help" => ReplCommand::Help,
        "ask" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next().and_then(|l| l.parse().ok()), parts.next()) {
                (Some(file), Some(line), Some(message)) if !file.is_empty() => ReplCommand::Ask {
                    file: PathBuf::from(file),
                    line,
                    message: message.trim().to_string(),
                },
                _ => ReplCommand::Invalid("usage: /ask <file> <line> <message>".to_string()),
            }
        }
        other => ReplCommand::Invalid(format!("unknown command: /{}", other)),
    }
}

const HELP: &str = "\
/models                 list available models
/model <id>             select a model
/rerun                  resend the last message
/clear                  reset the conversation
/ask <file> <line> <m>  ask about a compilation error
/quit                   exit
Ctrl-C while waiting stops the current request.";

fn print_models(session: &ChatSession<HttpChatTransport>) {
    let selected = session.selected_model();
    for model in session.models() {
        let marker = if model.id == selected { "*" } else { " " };
        let label = model.label.map(|l| format!(" [{}]", l)).unwrap_or_default();
        println!("{} {:<32} {}{}", marker, model.id, model.name, label);
    }
}

/// 等待一轮对话，期间 Ctrl-C 只停止当前请求
async fn run_turn(
    session: &ChatSession<HttpChatTransport>,
    turn: impl Future<Output = Result<SendOutcome, ChatError>>,
) {
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            _ = tokio::signal::ctrl_c() => {
                session.stop_generation();
            }
        }
    };
    match outcome {
        Ok(SendOutcome::Replied(content)) => println!("\n{}\n", content),
        Ok(SendOutcome::Stopped) => println!("\n{}\n", super::session::STOPPED_MESSAGE),
        Ok(SendOutcome::Failed(message)) => println!("\n❌ Error: {}\n", message),
        Ok(SendOutcome::Discarded) => {}
        Err(e) => println!("{}", e),
    }
}

pub async fn run(args: ChatArgs) -> Result<()> {
    let api = ApiClient::new(&args.server, &args.user_header, args.user.clone())?;
    let session = ChatSession::new(HttpChatTransport::new(api, args.project.clone()));
    session.load_models().await;
    if !session.has_models() {
        warn!(server = %args.server, project = %args.project, "没有可用的模型，聊天不可用");
        println!("No LLM models are available on {}.", args.server);
        return Ok(());
    }
    info!(server = %args.server, project = %args.project, "聊天会话已就绪");
    print_models(&session);
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.context("读取输入失败")? else {
            break;
        };
        match parse_command(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Models => print_models(&session),
            ReplCommand::Select(id) => {
                if session.select_model(&id) {
                    println!("model: {}", id);
                } else {
                    println!("unknown model: {}", id);
                }
            }
            ReplCommand::Clear => {
                session.clear_messages();
                println!("conversation cleared");
            }
            ReplCommand::Rerun => run_turn(&session, session.rerun_last_message()).await,
            ReplCommand::Send(text) => run_turn(&session, session.send_message(&text)).await,
            ReplCommand::Ask { file, line, message } => {
                let content = match tokio::fs::read_to_string(&file).await {
                    Ok(content) => Some(content),
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "读取源文件失败，不附带上下文");
                        None
                    }
                };
                let name = file.to_string_lossy().into_owned();
                let entry = LogEntry {
                    level: LogLevel::Error,
                    message: Some(message),
                    content: None,
                    file: Some(name.clone()),
                    line: Some(line),
                    raw: None,
                };
                let document = content.as_deref().map(|content| OpenDocument { name: &name, content });
                run_turn(&session, ask_about_error(&session, &entry, document)).await;
            }
            ReplCommand::Invalid(message) => println!("{}", message),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("   "), ReplCommand::Empty);
        assert_eq!(parse_command("why \\foo?"), ReplCommand::Send("why \\foo?".to_string()));
        assert_eq!(parse_command("/quit"), ReplCommand::Quit);
        assert_eq!(parse_command("/model  gpt-4o "), ReplCommand::Select("gpt-4o".to_string()));
        assert_matches::assert_matches!(parse_command("/model"), ReplCommand::Invalid(_));
        assert_eq!(parse_command("/rerun"), ReplCommand::Rerun);
        assert_eq!(
            parse_command("/ask main.tex 12 Undefined control sequence."),
            ReplCommand::Ask {
                file: PathBuf::from("main.tex"),
                line: 12,
                message: "Undefined control sequence.".to_string(),
            }
        );
        assert_matches::assert_matches!(parse_command("/ask main.tex x msg"), ReplCommand::Invalid(_));
        assert_matches::assert_matches!(parse_command("/bogus"), ReplCommand::Invalid(_));
    }
}
