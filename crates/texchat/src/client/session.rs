use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetch::{ApiClient, FetchError};
use crate::api::request::ChatRequest;
use crate::api::response::ModelsResponse;
use crate::llm::models::Model;
use crate::llm::{ChatMessage, Role};

pub const SYSTEM_PROMPT: &str = r#"You are an expert LaTeX debugging assistant and compiler error specialist.

**Your Primary Role - Error Debugging:**
- Analyze LaTeX compilation errors and warnings
- Identify syntax mistakes, missing packages, and structural issues
- Explain errors in beginner-friendly language
- Provide working fixes with clear explanations

**When a user sends a compilation error:**

1. **Quick Summary** (1-2 sentences)
   - What's wrong in plain English

2. **The Problem**
   - Explain the error clearly
   - Point to the exact issue in their code

3. **The Fix**
   - Show corrected code in ```latex blocks
   - Highlight what changed

4. **Why This Happened**
   - Brief explanation of the root cause
   - How to prevent it in future

**Error Analysis Guidelines:**
- The line marked with → is where the error occurred
- Look at surrounding context for clues
- Common issues: typos in commands, missing packages, unmatched braces
- Check for: \begin without \end, missing $, wrong package names

**Also Helpful With:**
- General LaTeX syntax and commands
- Document structure and formatting
- Mathematical typesetting
- Bibliography and citations

**Response Style:**
- Be concise and practical
- Use code blocks for all LaTeX examples
- Assume the user is learning LaTeX
- Focus on solving the immediate problem first

Remember: The user is likely frustrated. Be encouraging and clear!"#;

pub const STOPPED_MESSAGE: &str = "⚠️ Request stopped by user.";

/// 聊天后端，真实实现走 HTTP，测试中可替换
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn list_models(&self) -> Result<Vec<Model>, FetchError>;
    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<Value, FetchError>;
}

pub struct HttpChatTransport {
    api: ApiClient,
    project_id: String,
}

impl HttpChatTransport {
    pub fn new(api: ApiClient, project_id: impl Into<String>) -> Self {
        Self {
            api,
            project_id: project_id.into(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn list_models(&self) -> Result<Vec<Model>, FetchError> {
        let res: ModelsResponse = self
            .api
            .get_json(&format!("/project/{}/llm/models", self.project_id))
            .await?;
        Ok(res.models)
    }

    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<Value, FetchError> {
        let request = ChatRequest {
            messages: serde_json::to_value(messages)?,
            model: model.map(str::to_string),
        };
        self.api
            .post_json(&format!("/project/{}/llm/chat", self.project_id), &request)
            .await
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChatError {
    #[error("a request is already in progress")]
    Busy,
    #[error("there is no previous message to rerun")]
    NothingToRerun,
    #[error("Ask AI is not available here")]
    Unavailable,
}

/// 一轮对话的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(String),
    Stopped,
    Failed(String),
    /// 请求期间会话被清空，结果被丢弃
    Discarded,
}

struct SessionState {
    messages: Vec<ChatMessage>,
    models: Vec<Model>,
    models_loaded: bool,
    selected_model: String,
    last_user_message: Option<String>,
    error: Option<String>,
    in_flight: Option<CancellationToken>,
    /// 每次清空递增，用于识别过期的请求结果
    epoch: u64,
}

/// 客户端会话：消息历史、模型选择与单个可取消的在途请求
///
/// 状态机为 `idle → sending → (success | aborted | errored) → idle`，
/// 同一时刻只允许一个请求，在途时再次发送返回 [`ChatError::Busy`]。
pub struct ChatSession<T> {
    transport: T,
    state: Mutex<SessionState>,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState {
                messages: vec![ChatMessage::system(SYSTEM_PROMPT)],
                models: Vec::new(),
                models_loaded: false,
                selected_model: String::new(),
                last_user_message: None,
                error: None,
                in_flight: None,
                epoch: 0,
            }),
        }
    }

    /// 拉取模型列表并选中默认模型；失败按空列表处理
    pub async fn load_models(&self) {
        let models = match self.transport.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "获取模型列表失败");
                Vec::new()
            }
        };
        let selected = models
            .iter()
            .find(|m| m.is_default)
            .or_else(|| models.first())
            .map(|m| m.id.clone())
            .unwrap_or_default();
        info!(count = models.len(), selected = %selected, "模型列表已加载");

        let mut state = self.state.lock();
        state.models = models;
        state.selected_model = selected;
        state.models_loaded = true;
    }

    pub fn models(&self) -> Vec<Model> {
        self.state.lock().models.clone()
    }

    pub fn models_loaded(&self) -> bool {
        self.state.lock().models_loaded
    }

    /// 加载完成后列表为空表示功能不可用
    pub fn has_models(&self) -> bool {
        !self.state.lock().models.is_empty()
    }

    pub fn selected_model(&self) -> String {
        self.state.lock().selected_model.clone()
    }

    /// 只能选择列表中存在的模型
    pub fn select_model(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if state.models.iter().any(|m| m.id == id) {
            state.selected_model = id.to_string();
            true
        } else {
            false
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn can_rerun(&self) -> bool {
        self.state.lock().last_user_message.is_some()
    }

    /// 追加用户消息并携带完整历史发起一次请求
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let pending = {
            let mut state = self.state.lock();
            if state.in_flight.is_some() {
                return Err(ChatError::Busy);
            }
            begin_send(&mut state, text)
        };
        Ok(self.complete(pending).await)
    }

    async fn complete(&self, pending: PendingRequest) -> SendOutcome {
        let PendingRequest {
            history,
            model,
            token,
            epoch,
        } = pending;

        debug!(model = %model, message_count = history.len(), "发送聊天请求");
        let model = Some(model.as_str()).filter(|m| !m.is_empty());
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transport.chat(&history, model) => Some(result),
        };

        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!("会话已清空，丢弃请求结果");
            return SendOutcome::Discarded;
        }
        state.in_flight = None;

        match result {
            None => {
                info!("请求已被用户停止");
                state.messages.push(ChatMessage::assistant(STOPPED_MESSAGE));
                SendOutcome::Stopped
            }
            Some(Ok(body)) => match body.pointer("/choices/0/message/content").and_then(Value::as_str) {
                Some(content) => {
                    state.messages.push(ChatMessage::assistant(content));
                    SendOutcome::Replied(content.to_string())
                }
                None => record_failure(&mut state, "Invalid response format from LLM API".to_string()),
            },
            Some(Err(e)) => {
                warn!(status = ?e.status(), error = %e, "聊天请求失败");
                record_failure(&mut state, e.user_facing_message())
            }
        }
    }

    /// 取消在途请求，返回是否确实有请求被取消
    pub fn stop_generation(&self) -> bool {
        match self.state.lock().in_flight.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 删除最近一次相同内容的用户消息及其后的所有消息，然后重新发送
    pub async fn rerun_last_message(&self) -> Result<SendOutcome, ChatError> {
        let pending = {
            let mut state = self.state.lock();
            if state.in_flight.is_some() {
                return Err(ChatError::Busy);
            }
            let text = state.last_user_message.clone().ok_or(ChatError::NothingToRerun)?;
            match state
                .messages
                .iter()
                .rposition(|m| m.role == Role::User && m.content == text)
            {
                Some(index) => {
                    debug!(removed = state.messages.len() - index, "重新运行前截断历史");
                    state.messages.truncate(index);
                }
                None => debug!("历史中未找到上一条用户消息，直接重发"),
            }
            begin_send(&mut state, &text)
        };
        Ok(self.complete(pending).await)
    }

    /// 重置为只含系统提示的历史；在途请求会被取消且结果丢弃
    pub fn clear_messages(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.in_flight.take() {
            token.cancel();
        }
        state.epoch += 1;
        state.messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        state.error = None;
        state.last_user_message = None;
    }
}

/// 已写入会话、等待发出的请求
struct PendingRequest {
    history: Vec<ChatMessage>,
    model: String,
    token: CancellationToken,
    epoch: u64,
}

/// 追加用户消息并登记在途请求，调用方需持有锁且已确认没有在途请求
fn begin_send(state: &mut SessionState, text: &str) -> PendingRequest {
    state.messages.push(ChatMessage::user(text));
    state.error = None;
    state.last_user_message = Some(text.to_string());
    let token = CancellationToken::new();
    state.in_flight = Some(token.clone());
    PendingRequest {
        history: state.messages.clone(),
        model: state.selected_model.clone(),
        token,
        epoch: state.epoch,
    }
}

fn record_failure(state: &mut SessionState, message: String) -> SendOutcome {
    state.messages.push(ChatMessage::assistant(format!(
        "❌ Error: {}\n\nPlease check the console for details.",
        message
    )));
    state.error = Some(message.clone());
    SendOutcome::Failed(message)
}
