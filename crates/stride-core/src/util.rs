//! Small helpers shared by models, config and the sync engine.

/// Trim user-supplied text; blank input becomes `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Wall clock in epoch milliseconds, the unit of every sync timestamp
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time-ordered id for entities, devices and queue bookkeeping
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
