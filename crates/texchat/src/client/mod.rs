//! 聊天面板、设置表单与 Ask AI 入口的客户端逻辑，终端客户端基于此实现

pub mod ask_ai;
pub mod fetch;
pub mod repl;
pub mod session;
pub mod settings_form;
