/// Sources module
///
/// The token-issuing server the registry talks to, and a factory building it from config.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::token::{RefreshParams, Token};
use crate::config::sources::AuthServerConfig;

pub mod http;
pub mod simulated;

use http::HttpAuthServer;
use simulated::SimulatedAuthServer;

/// Business result of a refresh call. Transport problems are the `Err` side of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(Token),
    /// server answered and said no; the token type is dead until restored
    Refused,
}

/// Abstraction over the token-issuing backend.
/// Implementations: HttpAuthServer (configurable HTTP API), SimulatedAuthServer (local development).
#[async_trait]
pub trait AuthServer: Send + Sync {
    /// First token of a type. Every error is treated as transient and retried.
    async fn fetch_initial(&self, token_type: &str) -> Result<Token>;

    /// Renew a token with caller-supplied parameters.
    async fn refresh(&self, token_type: &str, params: &RefreshParams) -> Result<RefreshOutcome>;
}

pub fn build_auth_server(cfg: &AuthServerConfig) -> Result<Arc<dyn AuthServer>> {
    Ok(match cfg {
        AuthServerConfig::Http(http) => Arc::new(HttpAuthServer::new(http.clone())?),
        AuthServerConfig::Simulated(simulated) => Arc::new(SimulatedAuthServer::new(simulated.clone())),
    })
}
