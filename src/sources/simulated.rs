use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rand::Rng;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::cache::token::{RefreshParams, Token};
use crate::config::sources::SimulatedAuthServerConfig;
use crate::helpers::time::now;
use crate::sources::{AuthServer, RefreshOutcome};

/// In-process stand-in for the real backend: fixed latency, fixed TTL,
/// refreshes succeed with a configurable probability.
#[derive(Debug, Clone)]
pub struct SimulatedAuthServer {
    cfg: SimulatedAuthServerConfig,
}

impl SimulatedAuthServer {
    pub fn new(cfg: SimulatedAuthServerConfig) -> Self {
        Self { cfg }
    }

    fn issue(&self, prefix: &str, token_type: &str) -> Result<Token> {
        let expires_at = i64::try_from(self.cfg.ttl_seconds)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| now().checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("ttl_seconds {} out of range", self.cfg.ttl_seconds))?;
        Ok(Token::new(format!("{}_{}_{}", prefix, token_type, Uuid::new_v4()), expires_at))
    }
}

#[async_trait]
impl AuthServer for SimulatedAuthServer {
    async fn fetch_initial(&self, token_type: &str) -> Result<Token> {
        tokio::time::sleep(Duration::from_millis(self.cfg.latency_ms)).await;
        self.issue("anonymous", token_type)
    }

    async fn refresh(&self, token_type: &str, params: &RefreshParams) -> Result<RefreshOutcome> {
        tokio::time::sleep(Duration::from_millis(self.cfg.latency_ms)).await;
        debug!(token_type, params = params.len(), "simulated refresh");
        if rand::thread_rng().gen_bool(self.cfg.refresh_success_ratio.clamp(0.0, 1.0)) {
            Ok(RefreshOutcome::Refreshed(self.issue("refreshed", token_type)?))
        } else {
            Ok(RefreshOutcome::Refused)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::time::now;

    fn server(ratio: f64) -> SimulatedAuthServer {
        SimulatedAuthServer::new(SimulatedAuthServerConfig {
            latency_ms: 0,
            ttl_seconds: 3000,
            refresh_success_ratio: ratio,
        })
    }

    #[tokio::test]
    async fn initial_token_is_anonymous_and_lives_for_ttl() {
        let token = server(1.0).fetch_initial("api").await.unwrap();
        assert!(token.value.starts_with("anonymous_api_"));
        assert!(token.expires_at > now() + ChronoDuration::seconds(2990));
    }

    #[tokio::test]
    async fn oversized_ttl_is_an_error() {
        let server = SimulatedAuthServer::new(SimulatedAuthServerConfig {
            latency_ms: 0,
            ttl_seconds: u64::MAX,
            refresh_success_ratio: 1.0,
        });
        assert!(server.fetch_initial("api").await.is_err());
        assert!(server.refresh("api", &RefreshParams::new()).await.is_err());
    }

    #[tokio::test]
    async fn refresh_obeys_success_ratio() {
        let params = RefreshParams::new();
        match server(1.0).refresh("api", &params).await.unwrap() {
            RefreshOutcome::Refreshed(token) => assert!(token.value.starts_with("refreshed_api_")),
            RefreshOutcome::Refused => panic!("ratio 1.0 must always succeed"),
        }
        assert_eq!(server(0.0).refresh("api", &params).await.unwrap(), RefreshOutcome::Refused);
    }
}
