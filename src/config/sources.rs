use http::Method;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::settings::SettingsConfig;
use crate::utils::constants::*;


/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub auth_server: AuthServerConfig,
}

/// ================================
/// Token issuing server
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthServerConfig {
    Http(HttpAuthServerConfig),
    Simulated(SimulatedAuthServerConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpAuthServerConfig {
    /// used once per token type, when its record is created
    pub fetch: RequestConfig,
    /// used for every later refresh, carries the refresh parameters
    pub refresh: RequestConfig,
    pub parse: ParseConfig,
    /// statuses meaning "the server refused", anything else non-2xx is a transport error
    #[serde(default = "default_refusal_statuses")]
    pub refusal_statuses: Vec<u16>,
    pub timeout_ms: Option<u64>,
}

/// HTTP request details
#[derive(Debug, Deserialize, Clone)]
pub struct RequestConfig {
    pub url: String,
    #[serde(with = "http_serde::method", default = "default_method")]
    pub method: Method, // GET, POST
    pub headers: Option<HashMap<String, GenericSourceValue>>,
}

/// Header value sources
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}

/// ================================
/// Parsing - Token & Expiration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ParseConfig {
    /// JSON pointer of the token value in the response body
    pub token_pointer: String,
    /// optional JSON pointer of a boolean business result; `false` means refused
    pub success_pointer: Option<String>,
    pub expiration: Expiration,
}

/// Expiration definition
#[derive(Debug, Deserialize, Clone)]
pub struct Expiration {
    pub source: ExpirationSource,        // jwt | body_field | header_field | manual
    pub pointer: Option<String>,         // required if source=body_field|header_field
    pub manual_ttl_seconds: Option<u64>, // required if source=manual
    #[serde(default)]
    pub format: ExpirationSourceFormat
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationSourceFormat {
    /// Duration in seconds until expiration.
    #[default]
    Seconds,

    /// Unix timestamp (integer seconds since epoch)
    Unix,
}

/// Expiration sources
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationSource {
    Jwt, // extract `exp` claim from the token itself
    BodyField,  // extract from JSON Body field
    HeaderField,  // extract from Headers field
    Manual, // user-defined TTL
}

/// ================================
/// Simulated server (local development)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatedAuthServerConfig {
    #[serde(default = "default_simulated_latency")]
    pub latency_ms: u64,
    #[serde(default = "default_simulated_ttl")]
    pub ttl_seconds: u64,
    /// probability in [0, 1] that a refresh is accepted
    #[serde(default = "default_simulated_success_ratio")]
    pub refresh_success_ratio: f64,
}

impl Default for SimulatedAuthServerConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_simulated_latency(),
            ttl_seconds: default_simulated_ttl(),
            refresh_success_ratio: default_simulated_success_ratio(),
        }
    }
}

// jwt token
#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    pub exp: i64,
}

fn default_refusal_statuses() -> Vec<u16> {
    DEFAULT_REFUSAL_STATUSES.to_vec()
}

fn default_method() -> Method {
    Method::POST
}

fn default_simulated_latency() -> u64 {
    DEFAULT_SIMULATED_LATENCY_MS
}

fn default_simulated_ttl() -> u64 {
    DEFAULT_SIMULATED_TTL_SECS
}

fn default_simulated_success_ratio() -> f64 {
    DEFAULT_SIMULATED_SUCCESS_RATIO
}
