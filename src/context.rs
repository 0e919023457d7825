//! Per-call evaluation context.

use chrono::{DateTime, Utc};

/// Who is asking and what time it is, supplied by the caller on every
/// compilation. The compiler never reads a clock or a session itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub current_user_id: String,
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(current_user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            now,
        }
    }
}
