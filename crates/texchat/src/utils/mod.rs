pub mod signal;
pub mod time_format;

use std::fmt::{self, Write as _};

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

// 控制台输出层：时间戳 + 彩色级别 + 消息 + 结构化字段
struct ConsoleLayer;

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let Some(line) = visitor.render() else {
            return;
        };

        let timestamp = Local::now().format("%b %d %H:%M:%S");
        let (color_code, level_str) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", " WARN"),
            tracing::Level::INFO => ("\x1b[32m", " INFO"),
            tracing::Level::DEBUG => ("\x1b[36m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };

        println!("\x1b[2m{}\x1b[0m {}{:>5}\x1b[0m {}", timestamp, color_code, level_str, line);
    }
}

/// 收集事件的消息与其余字段（`key=value`）
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn render(self) -> Option<String> {
        if self.message.is_none() && self.fields.is_empty() {
            return None;
        }
        let mut line = self.message.unwrap_or_default();
        for (name, value) in self.fields {
            if !line.is_empty() {
                line.push(' ');
            }
            let _ = write!(line, "\x1b[2m{}=\x1b[0m{}", name, value);
        }
        Some(line)
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((field.name(), format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }
}

pub fn init_logger(log_level: &str) {
    let console_layer = ConsoleLayer.with_filter(build_console_filter(log_level));

    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}

/// 构建控制台日志过滤器，压低数据库与 HTTP 栈的噪音
fn build_console_filter(base_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder().parse_lossy(format!(
        "{},\
            sqlx::query=error,\
            sqlx=error,\
            sea_orm::database=error,\
            sea_orm_migration=warn,\
            hyper=warn,\
            reqwest=warn,\
            h2=warn",
        base_level
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message_with_fields() {
        let visitor = FieldVisitor {
            message: Some("收到聊天请求".to_string()),
            fields: vec![("user_id", "u1".to_string()), ("status", "200".to_string())],
        };
        let line = visitor.render().unwrap();
        assert!(line.starts_with("收到聊天请求 "));
        assert!(line.contains("user_id=\x1b[0mu1"));
        assert!(line.contains("status=\x1b[0m200"));
    }

    #[test]
    fn test_render_empty_event() {
        assert!(FieldVisitor::default().render().is_none());
    }
}
