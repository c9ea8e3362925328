//! HTTP connector: `web.fetch` behind SSRF-blocking URL gating and inbound
//! header scrubbing. The header denylist below is carried over from a
//! "never forward inbound auth to a downstream call" invariant used
//! elsewhere in this codebase.

use crate::errors::GatewayError;
use crate::registry::{Tool, ToolHandler};
use crate::schema::{FieldSchema, FieldSpec, ObjectSchema};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

/// Header names that must never be forwarded from caller to backend
/// (case-insensitive). Covers common credential/cookie leak paths.
pub const SENSITIVE_HEADER_NAMES: &[&str] = &[
    "authorization",
    "x-api-key",
    "api-key",
    "proxy-authorization",
    "cookie",
    "cookie2",
    "x-auth-token",
    "x-access-token",
    "x-forwarded-authorization",
    "set-cookie",
];

fn sensitive_set() -> HashSet<&'static str> {
    SENSITIVE_HEADER_NAMES.iter().copied().collect()
}

pub fn is_sensitive(name: &str) -> bool {
    sensitive_set().contains(name.to_lowercase().as_str())
}

const RESPONSE_HEADER_ALLOWLIST: &[&str] = &["content-type", "content-length", "last-modified", "etag"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HttpConnectorConfig {
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub denied_domains: Vec<String>,
    pub max_response_bytes: u64,
    pub timeout_ms: u64,
}

fn domain_suffix_match(hostname: &str, pattern: &str) -> bool {
    let pattern = pattern.trim_start_matches("*.");
    hostname == pattern || hostname.ends_with(&format!(".{pattern}"))
}

const PRIVATE_RANGE_PATTERNS: &[&str] = &[
    r"^10\.",
    r"^172\.(1[6-9]|2\d|3[01])\.",
    r"^192\.168\.",
    r"^169\.254\.",
];

fn is_private_or_loopback(hostname: &str) -> bool {
    matches!(hostname, "localhost" | "127.0.0.1" | "0.0.0.0" | "::1")
        || PRIVATE_RANGE_PATTERNS.iter().any(|pat| {
            regex::Regex::new(pat)
                .expect("static pattern is valid")
                .is_match(hostname)
        })
}

fn check_url(raw: &str, config: &HttpConnectorConfig) -> Result<url::Url, GatewayError> {
    let parsed = url::Url::parse(raw).map_err(|e| GatewayError::security(format!("invalid url: {e}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(GatewayError::security(format!("unsupported scheme '{}'", parsed.scheme())));
    }

    let hostname = parsed
        .host_str()
        .ok_or_else(|| GatewayError::security("url has no host"))?
        .to_lowercase();

    if is_private_or_loopback(&hostname) {
        return Err(GatewayError::security(format!("host '{hostname}' resolves to a private/internal address")));
    }

    if config.denied_domains.iter().any(|d| domain_suffix_match(&hostname, d)) {
        return Err(GatewayError::security(format!("host '{hostname}' is denylisted")));
    }

    if config.allowed_domains.is_empty()
        || !config.allowed_domains.iter().any(|d| domain_suffix_match(&hostname, d))
    {
        return Err(GatewayError::security(format!("host '{hostname}' is not in allowed_domains")));
    }

    Ok(parsed)
}

struct FetchHandler {
    config: HttpConnectorConfig,
    client: reqwest::Client,
}

#[async_trait]
impl ToolHandler for FetchHandler {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        let raw_url = args["url"].as_str().ok_or_else(|| GatewayError::validation("url", "required"))?;
        let url = check_url(raw_url, &self.config)?;

        let mut request = self.client.get(url.clone());
        if let Some(Value::Object(headers)) = args.get("headers") {
            for (key, value) in headers {
                if is_sensitive(key) {
                    continue;
                }
                if let Some(value_str) = value.as_str() {
                    request = request.header(key.as_str(), value_str);
                }
            }
        }

        let deadline = Duration::from_millis(self.config.timeout_ms);
        let max_bytes = self.config.max_response_bytes as usize;
        let (final_url, status, status_text, headers, body) = tokio::time::timeout(deadline, async move {
            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::connector(format!("request failed: {e}")))?;

            if let Some(len) = response.content_length() {
                if len > self.config.max_response_bytes {
                    return Err(GatewayError::MaxBytesExceeded {
                        actual: len as usize,
                        limit: self.config.max_response_bytes,
                    });
                }
            }

            let final_url = response.url().to_string();
            let status = response.status().as_u16();
            let status_text = response.status().canonical_reason().unwrap_or("").to_string();

            let mut headers = serde_json::Map::new();
            for name in RESPONSE_HEADER_ALLOWLIST {
                if let Some(value) = response.headers().get(*name) {
                    if let Ok(value_str) = value.to_str() {
                        headers.insert(name.to_string(), json!(value_str));
                    }
                }
            }

            let body = read_body_capped(response, max_bytes).await?;
            Ok((final_url, status, status_text, headers, body))
        })
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: self.config.timeout_ms,
        })??;

        let size = body.len();
        let body_text = String::from_utf8_lossy(&body).into_owned();

        Ok(json!({
            "url": final_url,
            "status": status,
            "statusText": status_text,
            "headers": headers,
            "body": body_text,
            "size": size,
        }))
    }
}

async fn read_body_capped(response: reqwest::Response, max_bytes: usize) -> Result<Vec<u8>, GatewayError> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::connector(format!("stream read failed: {e}")))?;
        buf.extend_from_slice(&chunk);
        if buf.len() > max_bytes {
            return Err(GatewayError::MaxBytesExceeded {
                actual: buf.len(),
                limit: max_bytes as u64,
            });
        }
    }
    Ok(buf)
}

pub struct HttpConnector;

impl HttpConnector {
    pub fn tools(config: HttpConnectorConfig) -> Vec<Tool> {
        let client = reqwest::Client::builder()
            .user_agent("mcp-gateway/1.0")
            .build()
            .expect("reqwest client configuration is static and valid");

        vec![Tool::new(
            "web.fetch",
            "Fetch a URL within the configured domain allowlist",
            ObjectSchema::new()
                .field("url", FieldSpec::required(FieldSchema::string()))
                .field(
                    "headers",
                    FieldSpec::optional(FieldSchema::Object(Box::new(ObjectSchema {
                        fields: Default::default(),
                        deny_unknown: false,
                    }))),
                ),
            std::sync::Arc::new(FetchHandler { config, client }),
        )]
    }
}
