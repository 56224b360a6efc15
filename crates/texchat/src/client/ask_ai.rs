use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::session::{ChatError, ChatSession, ChatTransport, SendOutcome};

/// 错误行前后各取的行数
const CONTEXT_RADIUS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Typesetting,
}

/// 编译日志中的一条记录，由外部的日志解析流程产生
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<usize>,
    #[serde(default)]
    pub raw: Option<String>,
}

/// 编辑器当前打开的文档
#[derive(Debug, Clone, Copy)]
pub struct OpenDocument<'a> {
    pub name: &'a str,
    pub content: &'a str,
}

/// 只对错误级别的记录、且模型列表已加载且非空时提供入口
pub fn is_available(entry: &LogEntry, models_loaded: bool, has_models: bool) -> bool {
    entry.level == LogLevel::Error && models_loaded && has_models
}

/// 去掉开头的 `./`，反斜杠统一为 `/`
pub fn normalize_path(path: &str) -> String {
    path.strip_prefix("./").unwrap_or(path).replace('\\', "/")
}

pub fn is_same_file(log_file: &str, document: &str) -> bool {
    let file = normalize_path(log_file);
    let doc = normalize_path(document);
    file == doc || file.ends_with(&format!("/{}", doc)) || doc.ends_with(&format!("/{}", file))
}

/// 错误行附近的源码，错误行带 `→` 标记与行尾提示
pub fn source_context(entry: &LogEntry, document: Option<OpenDocument<'_>>) -> Option<String> {
    let (file, line, document) = (entry.file.as_deref()?, entry.line?, document?);
    if line == 0 || !is_same_file(file, document.name) {
        return None;
    }

    let lines: Vec<&str> = document.content.split('\n').collect();
    let error_index = line - 1;
    let start = error_index.saturating_sub(CONTEXT_RADIUS);
    let end = lines.len().min(error_index.saturating_add(CONTEXT_RADIUS + 1));
    if start >= end {
        return None;
    }

    let context = (start..end)
        .map(|i| {
            let number = i + 1;
            let (marker, highlight) = if number == line {
                ("→ ", " <<<--- ERROR HERE")
            } else {
                ("  ", "")
            };
            format!("{}{:>4} | {}{}", marker, number, lines[i], highlight)
        })
        .collect::<Vec<_>>()
        .join("\n");
    debug!(chars = context.len(), "已提取源码上下文");
    Some(context)
}

/// 生成发给模型的 Markdown 提问
pub fn format_error_prompt(entry: &LogEntry, context: Option<&str>) -> String {
    let message = entry
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .or(entry.content.as_deref().filter(|c| !c.is_empty()))
        .unwrap_or("Unknown error");

    let mut parts: Vec<String> = vec![
        "🔴 **LaTeX Compilation Error**".into(),
        String::new(),
        "**Error Message:**".into(),
        message.into(),
        String::new(),
    ];

    if let Some(file) = entry.file.as_deref().filter(|f| !f.is_empty()) {
        parts.push(format!("**File:** `{}`", file));
    }
    if let Some(line) = entry.line.filter(|l| *l > 0) {
        parts.push(format!("**Line:** {}", line));
    }
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        parts.extend([
            String::new(),
            "**Source Code Context:**".into(),
            "```latex".into(),
            context.into(),
            "```".into(),
            String::new(),
        ]);
    }
    if let Some(raw) = entry.raw.as_deref() {
        if Some(raw) != entry.message.as_deref() {
            parts.extend([
                "**Full Error Details:**".into(),
                "```".into(),
                raw.into(),
                "```".into(),
                String::new(),
            ]);
        }
    }
    parts.extend([
        "**Please help me:**".into(),
        "1. Explain what this error means in simple terms".into(),
        "2. Show me exactly what's wrong in my code".into(),
        "3. Provide the corrected code".into(),
        "4. Explain how to avoid this error in the future".into(),
    ]);
    parts.join("\n")
}

/// 把一条编译错误连同源码上下文发送到聊天会话
pub async fn ask_about_error<T: ChatTransport>(
    session: &ChatSession<T>,
    entry: &LogEntry,
    document: Option<OpenDocument<'_>>,
) -> Result<SendOutcome, ChatError> {
    if !is_available(entry, session.models_loaded(), session.has_models()) {
        return Err(ChatError::Unavailable);
    }
    let context = source_context(entry, document);
    debug!(with_context = context.is_some(), "发送编译错误到聊天");
    let prompt = format_error_prompt(entry, context.as_deref());
    session.send_message(&prompt).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::tests::{Reply, ScriptedTransport};
    use crate::llm::Role;

    fn entry(level: LogLevel, file: Option<&str>, line: Option<usize>) -> LogEntry {
        LogEntry {
            level,
            message: Some("Undefined control sequence.".to_string()),
            content: None,
            file: file.map(str::to_string),
            line,
            raw: None,
        }
    }

    fn document(lines: usize) -> String {
        (1..=lines).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_availability_gate() {
        let error = entry(LogLevel::Error, None, None);
        assert!(is_available(&error, true, true));
        assert!(!is_available(&error, false, true));
        assert!(!is_available(&error, true, false));
        assert!(!is_available(&entry(LogLevel::Warning, None, None), true, true));
    }

    #[test]
    fn test_path_matching() {
        assert_eq!(normalize_path("./chapters\\intro.tex"), "chapters/intro.tex");
        assert!(is_same_file("./main.tex", "main.tex"));
        assert!(is_same_file("/compile/project/main.tex", "main.tex"));
        assert!(is_same_file("intro.tex", "chapters/intro.tex"));
        assert!(!is_same_file("other.tex", "main.tex"));
        assert!(!is_same_file("xmain.tex", "main.tex"));
    }

    #[test]
    fn test_source_context_window() {
        let content = document(20);
        let doc = OpenDocument {
            name: "main.tex",
            content: &content,
        };
        let context = source_context(&entry(LogLevel::Error, Some("./main.tex"), Some(10)), Some(doc)).unwrap();
        let lines: Vec<_> = context.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "     5 | line 5");
        assert_eq!(lines[5], "→   10 | line 10 <<<--- ERROR HERE");
        assert_eq!(lines[10], "    15 | line 15");
    }

    #[test]
    fn test_source_context_clamped_and_skipped() {
        let content = document(3);
        let doc = OpenDocument {
            name: "main.tex",
            content: &content,
        };
        let context = source_context(&entry(LogLevel::Error, Some("main.tex"), Some(1)), Some(doc)).unwrap();
        assert_eq!(context.lines().count(), 3);
        assert!(context.starts_with("→    1 | line 1 <<<--- ERROR HERE"));

        assert!(source_context(&entry(LogLevel::Error, Some("other.tex"), Some(1)), Some(doc)).is_none());
        assert!(source_context(&entry(LogLevel::Error, Some("main.tex"), None), Some(doc)).is_none());
        assert!(source_context(&entry(LogLevel::Error, Some("main.tex"), Some(1)), None).is_none());
    }

    #[test]
    fn test_source_context_line_past_end() {
        let content = document(3);
        let doc = OpenDocument {
            name: "main.tex",
            content: &content,
        };
        assert!(source_context(&entry(LogLevel::Error, Some("main.tex"), Some(usize::MAX)), Some(doc)).is_none());
        assert!(source_context(&entry(LogLevel::Error, Some("main.tex"), Some(100)), Some(doc)).is_none());
        // 超出末尾但仍在窗口内时保留末尾几行
        let context = source_context(&entry(LogLevel::Error, Some("main.tex"), Some(5)), Some(doc)).unwrap();
        assert_eq!(context.lines().count(), 3);
        assert!(!context.contains("ERROR HERE"));
    }

    #[test]
    fn test_prompt_format() {
        let mut e = entry(LogLevel::Error, Some("main.tex"), Some(7));
        e.raw = Some("! Undefined control sequence.\nl.7 \\foo".to_string());
        let prompt = format_error_prompt(&e, Some("→    7 | \\foo <<<--- ERROR HERE"));
        assert!(prompt.starts_with("🔴 **LaTeX Compilation Error**\n\n**Error Message:**\nUndefined control sequence.\n"));
        assert!(prompt.contains("**File:** `main.tex`\n**Line:** 7\n\n**Source Code Context:**\n```latex\n"));
        assert!(prompt.contains("**Full Error Details:**\n```\n! Undefined control sequence."));
        assert!(prompt.ends_with("4. Explain how to avoid this error in the future"));

        let bare = LogEntry {
            message: None,
            ..entry(LogLevel::Error, None, None)
        };
        let prompt = format_error_prompt(&bare, None);
        assert!(prompt.contains("**Error Message:**\nUnknown error\n"));
        assert!(!prompt.contains("**File:**"));
        assert!(!prompt.contains("Source Code Context"));
    }

    #[tokio::test]
    async fn test_ask_about_error_sends_prompt() {
        let session = ChatSession::new(ScriptedTransport::with_replies(vec![Reply::Content("fix it")]));
        let e = entry(LogLevel::Error, Some("main.tex"), Some(2));
        assert_eq!(
            ask_about_error(&session, &e, None).await,
            Err(ChatError::Unavailable)
        );

        session.load_models().await;
        let content = document(4);
        let outcome = ask_about_error(
            &session,
            &e,
            Some(OpenDocument {
                name: "main.tex",
                content: &content,
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SendOutcome::Replied("fix it".to_string()));
        let messages = session.messages();
        let sent = &messages[1];
        assert_eq!(sent.role, Role::User);
        assert!(sent.content.contains("→    2 | line 2 <<<--- ERROR HERE"));
    }
}
