use chrono::Local;

/// 当前本地时间，格式 `YYYY-MM-DD HH:MM:SS`
pub fn now_standard_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
