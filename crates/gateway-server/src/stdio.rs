//! Newline-delimited JSON-RPC-shaped framing over stdin/stdout.
//!
//! Only the two methods this gateway needs are implemented: `tools/list`
//! and `tools/call`. Anything else, or malformed JSON, gets a `-32700`
//! parse-error response without ever touching the harness.

use gateway_core::Harness;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Deserialize)]
struct StdioRequest {
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct StdioResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StdioError>,
}

#[derive(Debug, Serialize)]
struct StdioError {
    code: i32,
    message: String,
}

impl StdioResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(StdioError {
                code,
                message: message.into(),
            }),
        }
    }
}

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
/// Implementation-defined server error range (JSON-RPC reserves -32000..-32099).
const INVOKE_FAILED: i32 = -32000;

/// Run the stdio loop to completion (until EOF on stdin). `actor` identifies
/// the caller for audit purposes; every request on this stream shares it.
pub async fn serve_stdio(harness: Arc<Harness>, actor: String) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&harness, &actor, &line).await;
        let encoded = serde_json::to_string(&response)?;
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_line(harness: &Arc<Harness>, actor: &str, line: &str) -> StdioResponse {
    let request: StdioRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return StdioResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}")),
    };

    match request.method.as_str() {
        "tools/list" => {
            let tools = harness.registry().metadata();
            StdioResponse::ok(request.id, serde_json::json!({ "tools": tools }))
        }
        "tools/call" => {
            let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                return StdioResponse::err(request.id, INVALID_PARAMS, "missing params.name");
            };
            let args = request.params.get("arguments").cloned();
            match harness.invoke(name, actor, args).await {
                Ok(success) => StdioResponse::ok(
                    request.id,
                    serde_json::json!({ "request_id": success.request_id, "value": success.value }),
                ),
                Err(failure) => StdioResponse::err(
                    request.id,
                    INVOKE_FAILED,
                    format!("{}: {}", failure.code, failure.message),
                ),
            }
        }
        other => StdioResponse::err(request.id, METHOD_NOT_FOUND, format!("unknown method '{other}'")),
    }
}
