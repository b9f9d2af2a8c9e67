use anyhow::{anyhow, Result};
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::token::Token;
use crate::config::sources::{Expiration, ExpirationSource, ExpirationSourceFormat, JwtClaims, ParseConfig};
use crate::helpers::time::now;

/// Parse an auth server response into a token according to configuration.
pub fn parse_token(headers: &HeaderMap, body: &str, parse_config: &ParseConfig) -> Result<Token> {
    let json_body: Value = serde_json::from_str(body).map_err(|e| anyhow!("body is not valid JSON: {}", e))?;

    let token_value = json_body
        .pointer(&parse_config.token_pointer)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("body field '{}' not found or not a string", parse_config.token_pointer))?
        .to_owned();

    let expires_at = get_expiration(&parse_config.expiration, &token_value, &json_body, headers)?;
    if expires_at <= now() {
        return Err(anyhow!("token already expired at {}", expires_at));
    }
    debug!(expires_at = %expires_at, "token parsed successfully");
    Ok(Token::new(token_value, expires_at))
}

/// True when the configured success flag is present in the body and is `false`.
/// A missing pointer, unparsable body or absent field never counts as a refusal.
pub fn is_refused(body: &str, parse_config: &ParseConfig) -> bool {
    let Some(pointer) = &parse_config.success_pointer else {
        return false;
    };
    match serde_json::from_str::<Value>(body) {
        Ok(json) => matches!(json.pointer(pointer), Some(Value::Bool(false))),
        Err(e) => {
            warn!("Body is not valid JSON: {}", e);
            false
        }
    }
}

fn decode_jwt_from_string(token_string: &str) -> Result<JwtClaims> {
    let parts: Vec<&str> = token_string.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("invalid JWT format"));
    }

    // JWT segments are base64url; tolerate issuers that keep the padding
    let payload = parts[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| anyhow!("base64 decode error: {}", e))?;

    serde_json::from_slice::<JwtClaims>(&decoded).map_err(|e| anyhow!("invalid JWT payload: {}", e))
}

fn get_expiration(
    exp_cfg: &Expiration,
    token_value: &str,
    json_body: &Value,
    headers: &HeaderMap,
) -> Result<DateTime<Utc>> {
    let raw = match exp_cfg.source {
        ExpirationSource::Jwt => {
            let claims = decode_jwt_from_string(token_value)?;
            return DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| anyhow!("JWT exp {} out of range", claims.exp));
        }
        ExpirationSource::BodyField => {
            let pointer = exp_cfg
                .pointer
                .as_deref()
                .ok_or_else(|| anyhow!("expiration.pointer required"))?;
            let field = json_body
                .pointer(pointer)
                .ok_or_else(|| anyhow!("body {} not found", pointer))?;
            // some servers send numbers as strings
            field
                .as_i64()
                .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| anyhow!("body {} is not an integer", pointer))?
        }
        ExpirationSource::HeaderField => {
            let key = exp_cfg
                .pointer
                .as_deref()
                .ok_or_else(|| anyhow!("expiration.pointer required"))?;
            let val = get_header_value(headers, key)?;
            val.trim()
                .parse::<i64>()
                .map_err(|e| anyhow!("invalid header value '{}': {}", key, e))?
        }
        ExpirationSource::Manual => {
            let ttl = exp_cfg
                .manual_ttl_seconds
                .ok_or_else(|| anyhow!("manual_ttl_seconds must be provided for manual expiration"))?;
            i64::try_from(ttl).map_err(|_| anyhow!("manual_ttl_seconds {} out of range", ttl))?
        }
    };

    // manual TTL is always relative
    let format = match exp_cfg.source {
        ExpirationSource::Manual => &ExpirationSourceFormat::Seconds,
        _ => &exp_cfg.format,
    };
    match format {
        ExpirationSourceFormat::Seconds => ChronoDuration::try_seconds(raw)
            .and_then(|ttl| now().checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("expires in {} seconds is out of range", raw)),
        ExpirationSourceFormat::Unix => {
            DateTime::from_timestamp(raw, 0).ok_or_else(|| anyhow!("unix timestamp {} out of range", raw))
        }
    }
}

fn get_header_value(headers: &HeaderMap, key: &str) -> Result<String> {
    headers
        .get(key)
        .ok_or_else(|| anyhow!("header '{}' not found", key))?
        .to_str()
        .map(|s| s.to_owned())
        .map_err(|e| anyhow!("invalid header '{}': {}", key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use http::{HeaderName, HeaderValue};
    use serde_json::json;
    use std::str::FromStr;

    fn sample_jwt(exp: i64) -> String {
        // minimal unsigned JWT for tests: {"exp": exp}
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
        format!("{}.{}.", header, payload)
    }

    fn make_headers(map: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in map.iter() {
            headers.insert(HeaderName::from_str(k).unwrap(), HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    fn config(source: ExpirationSource, pointer: Option<&str>, format: ExpirationSourceFormat) -> ParseConfig {
        ParseConfig {
            token_pointer: "/access_token".into(),
            success_pointer: Some("/success".into()),
            expiration: Expiration {
                source,
                pointer: pointer.map(str::to_owned),
                manual_ttl_seconds: Some(60),
                format,
            },
        }
    }

    #[test]
    fn jwt_expiration_comes_from_exp_claim() {
        let exp = Utc::now().timestamp() + 600;
        let jwt = sample_jwt(exp);
        let body = json!({ "access_token": jwt }).to_string();
        let cfg = config(ExpirationSource::Jwt, None, ExpirationSourceFormat::Seconds);

        let token = parse_token(&HeaderMap::new(), &body, &cfg).unwrap();
        assert_eq!(token.value, jwt);
        assert_eq!(token.expires_at.timestamp(), exp);
    }

    #[test]
    fn expired_jwt_is_rejected() {
        let body = json!({ "access_token": sample_jwt(Utc::now().timestamp() - 30) }).to_string();
        let cfg = config(ExpirationSource::Jwt, None, ExpirationSourceFormat::Seconds);
        assert!(parse_token(&HeaderMap::new(), &body, &cfg).is_err());
    }

    #[test]
    fn body_field_in_seconds_is_relative() {
        let body = json!({ "access_token": "abc", "expires_in": 3000 }).to_string();
        let cfg = config(ExpirationSource::BodyField, Some("/expires_in"), ExpirationSourceFormat::Seconds);

        let before = Utc::now();
        let token = parse_token(&HeaderMap::new(), &body, &cfg).unwrap();
        assert_eq!(token.value, "abc");
        assert!(token.expires_at >= before + ChronoDuration::seconds(3000));
        assert!(token.expires_at <= Utc::now() + ChronoDuration::seconds(3000));
    }

    #[test]
    fn nested_body_field_as_unix_timestamp() {
        let exp = Utc::now().timestamp() + 100;
        let body = json!({ "access_token": "xyz", "meta": { "exp": exp.to_string() } }).to_string();
        let cfg = config(ExpirationSource::BodyField, Some("/meta/exp"), ExpirationSourceFormat::Unix);

        let token = parse_token(&HeaderMap::new(), &body, &cfg).unwrap();
        assert_eq!(token.expires_at.timestamp(), exp);
    }

    #[test]
    fn header_field_expiration() {
        let exp = Utc::now().timestamp() + 30;
        let headers = make_headers(&[("x-exp", &exp.to_string())]);
        let body = json!({ "access_token": "pln" }).to_string();
        let cfg = config(ExpirationSource::HeaderField, Some("x-exp"), ExpirationSourceFormat::Unix);

        let token = parse_token(&headers, &body, &cfg).unwrap();
        assert_eq!(token.expires_at.timestamp(), exp);
    }

    #[test]
    fn manual_ttl_ignores_unix_format() {
        let body = json!({ "access_token": "abc" }).to_string();
        let cfg = config(ExpirationSource::Manual, None, ExpirationSourceFormat::Unix);
        let token = parse_token(&HeaderMap::new(), &body, &cfg).unwrap();
        assert!(token.expires_at > Utc::now() + ChronoDuration::seconds(50));
    }

    #[test]
    fn missing_token_and_invalid_body_fail() {
        let cfg = config(ExpirationSource::Manual, None, ExpirationSourceFormat::Seconds);
        assert!(parse_token(&HeaderMap::new(), r#"{"other":"x"}"#, &cfg).is_err());
        assert!(parse_token(&HeaderMap::new(), r#"{"access_token":""}"#, &cfg).is_err());
        assert!(parse_token(&HeaderMap::new(), "{invalid_json", &cfg).is_err());
        let missing_header = config(ExpirationSource::HeaderField, Some("x-exp"), ExpirationSourceFormat::Unix);
        assert!(parse_token(&HeaderMap::new(), r#"{"access_token":"a"}"#, &missing_header).is_err());
    }

    #[test]
    fn out_of_range_expiration_is_an_error() {
        let cfg = config(ExpirationSource::BodyField, Some("/expires_in"), ExpirationSourceFormat::Seconds);
        for expires_in in [json!(10_000_000_000_000i64), json!(i64::MAX), json!(i64::MAX.to_string())] {
            let body = json!({ "access_token": "abc", "expires_in": expires_in }).to_string();
            assert!(parse_token(&HeaderMap::new(), &body, &cfg).is_err());
        }

        let mut manual = config(ExpirationSource::Manual, None, ExpirationSourceFormat::Seconds);
        manual.expiration.manual_ttl_seconds = Some(u64::MAX);
        assert!(parse_token(&HeaderMap::new(), r#"{"access_token":"a"}"#, &manual).is_err());
    }

    #[test]
    fn refusal_needs_explicit_false() {
        let cfg = config(ExpirationSource::Manual, None, ExpirationSourceFormat::Seconds);
        assert!(is_refused(r#"{"success":false}"#, &cfg));
        assert!(!is_refused(r#"{"success":true}"#, &cfg));
        assert!(!is_refused(r#"{"access_token":"a"}"#, &cfg));
        assert!(!is_refused("not json", &cfg));

        let no_pointer = ParseConfig { success_pointer: None, ..cfg };
        assert!(!is_refused(r#"{"success":false}"#, &no_pointer));
    }
}
