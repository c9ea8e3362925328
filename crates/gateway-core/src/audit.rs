//! Privacy-preserving audit log.
//!
//! One [`AuditEvent`] is emitted per invocation. [`AuditContext`] captures
//! the request id and start time up front so `duration_ms` always reflects
//! the full pipeline, not just the logging call.

use crate::canonical::canonicalize_args;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// A single audit record, emitted exactly once per `invoke` call.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub request_id: String,
    pub tool: String,
    pub actor: String,
    pub args_sha256: String,
    pub decision: Decision,
    pub reason: String,
    pub duration_ms: u64,
    pub result_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

/// Per-invocation audit state, created at the very start of `invoke`.
pub struct AuditContext {
    request_id: String,
    tool: String,
    actor: String,
    args_sha256: String,
    started_at: Instant,
}

impl AuditContext {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Sink for audit events: always writes a `[audit] `-prefixed line to the
/// process log (via `tracing`), and optionally appends the bare JSON object
/// to a file.
pub struct AuditLogger {
    enabled: bool,
    file: Option<Mutex<std::fs::File>>,
}

impl AuditLogger {
    /// Build a logger. When `enabled` is false, `create_context` still hands
    /// out request ids (callers rely on them for correlation) but `log`
    /// performs no sink writes.
    pub fn new(enabled: bool, file_path: Option<&Path>) -> Self {
        let file = file_path.and_then(|p| open_append(p));
        Self { enabled, file }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            file: None,
        }
    }

    pub fn create_context(&self, tool: &str, actor: &str, args: Option<&Value>) -> AuditContext {
        let canonical = canonicalize_args(args);
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let args_sha256 = hex::encode(hasher.finalize());

        AuditContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            actor: actor.to_string(),
            args_sha256,
            started_at: Instant::now(),
        }
    }

    pub fn log(
        &self,
        ctx: &AuditContext,
        decision: Decision,
        reason: impl Into<String>,
        result: Option<&Value>,
        error_code: Option<&'static str>,
    ) -> AuditEvent {
        let duration_ms = ctx.started_at.elapsed().as_millis() as u64;
        let result_bytes = match (decision, result) {
            (Decision::Allow, Some(Value::Null)) | (Decision::Allow, None) => 0,
            (Decision::Allow, Some(v)) => {
                serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0)
            }
            (Decision::Deny, _) => 0,
        };

        let event = AuditEvent {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            request_id: ctx.request_id.clone(),
            tool: ctx.tool.clone(),
            actor: ctx.actor.clone(),
            args_sha256: ctx.args_sha256.clone(),
            decision,
            reason: reason.into(),
            duration_ms,
            result_bytes,
            error_code,
        };

        if self.enabled {
            self.emit(&event);
        }

        event
    }

    pub fn log_success(&self, ctx: &AuditContext, reason: &str, result: &Value) -> AuditEvent {
        self.log(ctx, Decision::Allow, reason, Some(result), None)
    }

    pub fn log_denied(&self, ctx: &AuditContext, reason: impl Into<String>) -> AuditEvent {
        self.log(ctx, Decision::Deny, reason, None, None)
    }

    pub fn log_error(
        &self,
        ctx: &AuditContext,
        reason: impl Into<String>,
        error_code: &'static str,
    ) -> AuditEvent {
        self.log(ctx, Decision::Allow, reason, None, Some(error_code))
    }

    fn emit(&self, event: &AuditEvent) {
        let Ok(json) = serde_json::to_string(event) else {
            tracing::error!("failed to serialize audit event for {}", event.request_id);
            return;
        };
        tracing::info!(target: "gateway_core::audit", "[audit] {json}");

        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                if let Err(e) = writeln!(f, "{json}") {
                    tracing::error!("audit file append failed: {e}");
                }
            }
        }
    }
}

fn open_append(path: &Path) -> Option<Mutex<std::fs::File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("could not create audit log directory {}: {e}", parent.display());
                return None;
            }
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            tracing::error!("could not open audit log file {}: {e}", path.display());
            None
        }
    }
}

/// RAII guard enforcing the "exactly one audit event per invocation"
/// invariant even across early returns and panics: if the guard is dropped
/// without an explicit `finish`, it emits an `internal_error` event itself.
pub struct AuditGuard<'a> {
    logger: &'a AuditLogger,
    ctx: AuditContext,
    finished: bool,
}

impl<'a> AuditGuard<'a> {
    pub fn new(logger: &'a AuditLogger, ctx: AuditContext) -> Self {
        Self {
            logger,
            ctx,
            finished: false,
        }
    }

    pub fn ctx(&self) -> &AuditContext {
        &self.ctx
    }

    pub fn finish(
        mut self,
        decision: Decision,
        reason: impl Into<String>,
        result: Option<&Value>,
        error_code: Option<&'static str>,
    ) -> AuditEvent {
        self.finished = true;
        self.logger.log(&self.ctx, decision, reason, result, error_code)
    }
}

impl Drop for AuditGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.logger.log(
                &self.ctx,
                Decision::Allow,
                "error: internal_error (audit guard dropped without explicit finish)",
                None,
                Some("internal_error"),
            );
        }
    }
}

/// Convenience alias for tests and callers that only need a writable path.
pub fn default_audit_path(base: &Path) -> PathBuf {
    base.join("audit.ndjson")
}
