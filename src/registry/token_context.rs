use std::path::Path;

use crate::cache::token_record::RefreshCallback;
use crate::registry::TokenRegistry;

/// One visitor's handle on one token type.
/// Dropping it releases nothing; idle visitors are swept centrally.
#[derive(Clone)]
pub struct TokenContext {
    registry: TokenRegistry,
    visitor_id: String,
    token_type: String,
}

impl TokenContext {
    pub fn new(registry: TokenRegistry, visitor_id: &str, token_type: &str) -> Self {
        Self {
            registry,
            visitor_id: visitor_id.to_owned(),
            token_type: token_type.to_owned(),
        }
    }

    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn get(&self) -> Option<String> {
        self.registry.get_token(&self.visitor_id, &self.token_type)
    }

    pub fn needs_refresh(&self) -> bool {
        self.registry.needs_refresh(&self.token_type)
    }

    pub fn refresh(&self, callback: Option<RefreshCallback>) -> bool {
        self.registry.refresh_token(&self.token_type, callback)
    }

    pub async fn force_backup(&self, path: Option<&Path>) -> bool {
        self.registry.force_backup(path).await
    }
}
