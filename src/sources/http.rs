use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use std::time::Duration;
use std::{env, fs};
use tracing::{debug, warn};

use crate::cache::token::{RefreshParams, Token};
use crate::config::sources::{GenericSourceValue, HttpAuthServerConfig, RequestConfig};
use crate::parser::parser;
use crate::sources::{AuthServer, RefreshOutcome};

/// Auth server reached over HTTP, fully described by configuration.
#[derive(Debug, Clone)]
pub struct HttpAuthServer {
    cfg: HttpAuthServerConfig,
    client: Client,
}

impl HttpAuthServer {
    pub fn new(cfg: HttpAuthServerConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = cfg.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build()?;
        Ok(Self { cfg, client })
    }

    fn build_request(&self, req_cfg: &RequestConfig, body: serde_json::Value) -> Result<RequestBuilder> {
        let mut request = self.client.request(req_cfg.method.clone(), &req_cfg.url);

        // Build headers dynamically
        if let Some(headers) = &req_cfg.headers {
            for (key, v) in headers {
                let value = prepare_generic_source_value(v)?;
                request = request.header(key, value);
            }
        }

        // GET carries the token type as a query parameter instead of a body
        if req_cfg.method == http::Method::GET {
            if let Some(token_type) = body.get("token_type").and_then(|v| v.as_str()) {
                request = request.query(&[("token_type", token_type)]);
            }
            Ok(request)
        } else {
            Ok(request.json(&body))
        }
    }
}

#[async_trait]
impl AuthServer for HttpAuthServer {
    async fn fetch_initial(&self, token_type: &str) -> Result<Token> {
        let request = self.build_request(&self.cfg.fetch, json!({ "token_type": token_type }))?;

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("initial fetch failed: {}", status));
        }
        let headers = response.headers().clone();
        let body = response.text().await?;
        parser::parse_token(&headers, &body, &self.cfg.parse)
    }

    async fn refresh(&self, token_type: &str, params: &RefreshParams) -> Result<RefreshOutcome> {
        let request = self.build_request(
            &self.cfg.refresh,
            json!({ "token_type": token_type, "parameters": params }),
        )?;

        let response = request.send().await?;
        let status = response.status();
        if self.cfg.refusal_statuses.contains(&status.as_u16()) {
            warn!(token_type, status = %status, "auth server refused refresh");
            return Ok(RefreshOutcome::Refused);
        }
        if !status.is_success() {
            return Err(anyhow!("refresh failed: {}", status));
        }

        let headers = response.headers().clone();
        let body = response.text().await?;
        if parser::is_refused(&body, &self.cfg.parse) {
            warn!(token_type, "auth server reported unsuccessful refresh");
            return Ok(RefreshOutcome::Refused);
        }
        let token = parser::parse_token(&headers, &body, &self.cfg.parse)?;
        debug!(token_type, expires_at = %token.expires_at, "refresh response parsed");
        Ok(RefreshOutcome::Refreshed(token))
    }
}

fn prepare_generic_source_value(value: &GenericSourceValue) -> Result<String> {
    match value {
        GenericSourceValue::Literal { value } => Ok(value.to_owned()),
        GenericSourceValue::FromEnv { from_env } => {
            env::var(from_env).map_err(|err| anyhow!("env {}: {}", from_env, err))
        }
        GenericSourceValue::FromFile { path } => fs::read_to_string(path)
            .map_err(|err| anyhow!("file {}: {}", path, err))
            .map(|res| res.trim().to_string()),
    }
}
