use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied parameters forwarded to the auth server on refresh.
pub type RefreshParams = HashMap<String, Value>;

/// A token as issued by the auth server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }
}
