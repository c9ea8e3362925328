//! Bounded execution harness: the single `invoke` pipeline every tool call
//! goes through — lookup, schema validation, policy enforcement, bounded
//! execution, size check, audit.

use crate::audit::{AuditGuard, AuditLogger, Decision};
use crate::errors::GatewayError;
use crate::policy::PolicyEngine;
use crate::registry::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Successful outcome of `invoke`: the tool's result value plus the request
/// id it was audited under.
#[derive(Debug, Clone)]
pub struct InvokeSuccess {
    pub request_id: String,
    pub value: Value,
}

/// Failed outcome of `invoke`: a stable error code, message, and request id.
#[derive(Debug, Clone)]
pub struct InvokeFailure {
    pub request_id: String,
    pub code: &'static str,
    pub message: String,
}

pub type InvokeResult = Result<InvokeSuccess, InvokeFailure>;

pub struct Harness {
    registry: ToolRegistry,
    policy: PolicyEngine,
    audit: AuditLogger,
}

impl Harness {
    pub fn new(registry: ToolRegistry, policy: PolicyEngine, audit: AuditLogger) -> Self {
        Self {
            registry,
            policy,
            audit,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call end to end. Exactly one audit event is emitted,
    /// structurally guaranteed by [`AuditGuard`] even on an early return.
    pub async fn invoke(&self, tool_name: &str, actor: &str, raw_args: Option<Value>) -> InvokeResult {
        let ctx = self.audit.create_context(tool_name, actor, raw_args.as_ref());
        let guard = AuditGuard::new(&self.audit, ctx);
        let request_id = guard.ctx().request_id().to_string();

        // 1. Tool lookup
        let Some(tool) = self.registry.lookup(tool_name) else {
            guard.finish(
                Decision::Deny,
                "tool_not_found".to_string(),
                None,
                Some("tool_not_found"),
            );
            return Err(InvokeFailure {
                request_id,
                code: "tool_not_found",
                message: format!("no tool registered under '{tool_name}'"),
            });
        };

        // 2. Schema validation
        let args_in = raw_args.unwrap_or(Value::Object(Default::default()));
        let validated = match crate::schema::parse_args(&tool.input_schema, &args_in) {
            Ok(v) => v,
            Err(e) => {
                let reason = format!("validation_failed: {}: {}", e.path, e.message);
                guard.finish(Decision::Deny, reason.clone(), None, Some("validation_error"));
                return Err(InvokeFailure {
                    request_id,
                    code: "validation_error",
                    message: reason,
                });
            }
        };

        // 3. Policy enforce
        let verdict = self.policy.decide(tool_name, &validated);
        if !verdict.allowed {
            guard.finish(Decision::Deny, verdict.reason.clone(), None, Some("policy_denied"));
            return Err(InvokeFailure {
                request_id,
                code: "policy_denied",
                message: verdict.reason,
            });
        }
        let envelope = verdict.envelope;

        // 4. Bounded execute
        let deadline = Duration::from_millis(envelope.timeout_ms);
        let outcome = tokio::time::timeout(deadline, tool.handler.call(&validated)).await;

        let result = match outcome {
            Err(_elapsed) => {
                guard.finish(
                    Decision::Allow,
                    "error: timeout".to_string(),
                    None,
                    Some("timeout"),
                );
                return Err(InvokeFailure {
                    request_id,
                    code: "timeout",
                    message: format!("handler exceeded {}ms", envelope.timeout_ms),
                });
            }
            Ok(Err(err)) => {
                let code = err.code();
                let message = err.to_string();
                guard.finish(Decision::Allow, format!("error: {code}"), None, Some(code));
                return Err(InvokeFailure {
                    request_id,
                    code,
                    message,
                });
            }
            Ok(Ok(value)) => value,
        };

        // 5. Size check
        let encoded_len = serde_json::to_vec(&result).map(|b| b.len()).unwrap_or(0);
        if encoded_len as u64 > envelope.max_bytes {
            guard.finish(
                Decision::Allow,
                "error: max_bytes_exceeded".to_string(),
                None,
                Some("max_bytes_exceeded"),
            );
            return Err(InvokeFailure {
                request_id,
                code: "max_bytes_exceeded",
                message: format!("result size {encoded_len} exceeds max_bytes {}", envelope.max_bytes),
            });
        }

        guard.finish(Decision::Allow, "execution_success".to_string(), Some(&result), None);
        Ok(InvokeSuccess {
            request_id,
            value: result,
        })
    }
}

/// Convenience constructor bundling a registry/policy/audit triple behind a
/// shared handle, for transports that need to clone a harness into tasks.
pub fn shared(registry: ToolRegistry, policy: PolicyEngine, audit: AuditLogger) -> Arc<Harness> {
    Arc::new(Harness::new(registry, policy, audit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::policy::PolicyConfig;
    use crate::registry::Tool;
    use crate::schema::{FieldSchema, FieldSpec, ObjectSchema};
    use serde_json::json;
    use std::collections::BTreeSet;
    use tokio::time::sleep;

    fn config(default_deny: bool, allow: &[&str]) -> PolicyConfig {
        PolicyConfig {
            default_deny,
            allow_tools: allow.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            deny_tools: BTreeSet::new(),
            per_tool: Default::default(),
            global_timeout_ms: 200,
            global_max_bytes: 1_000_000,
        }
    }

    fn echo_schema() -> ObjectSchema {
        ObjectSchema::new().field("msg", FieldSpec::required(FieldSchema::string()))
    }

    fn build_harness(policy: PolicyConfig) -> Harness {
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::new(
                "echo",
                "echoes msg",
                echo_schema(),
                Arc::new(|args: Value| async move { Ok(json!({"msg": args["msg"]})) }),
            ))
            .unwrap();
        registry
            .register(Tool::new(
                "slow",
                "sleeps past deadline",
                ObjectSchema::new(),
                Arc::new(|_args: Value| async move {
                    sleep(Duration::from_millis(500)).await;
                    Ok(json!({}))
                }),
            ))
            .unwrap();
        registry
            .register(Tool::new(
                "boom",
                "always errors",
                ObjectSchema::new(),
                Arc::new(|_args: Value| async move { Err(GatewayError::connector("backend down")) }),
            ))
            .unwrap();
        Harness::new(registry, PolicyEngine::new(policy), AuditLogger::disabled())
    }

    #[tokio::test]
    async fn tool_not_found_is_a_deny() {
        let harness = build_harness(config(true, &["echo"]));
        let err = harness.invoke("missing", "actor", None).await.unwrap_err();
        assert_eq!(err.code, "tool_not_found");
    }

    #[tokio::test]
    async fn schema_validation_failure_is_a_deny() {
        let harness = build_harness(config(true, &["echo"]));
        let err = harness.invoke("echo", "actor", Some(json!({}))).await.unwrap_err();
        assert_eq!(err.code, "validation_error");
    }

    #[tokio::test]
    async fn policy_denied_for_unlisted_tool() {
        let harness = build_harness(config(true, &["echo"]));
        let err = harness
            .invoke("slow", "actor", Some(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "policy_denied");
    }

    #[tokio::test]
    async fn successful_call_returns_value_and_request_id() {
        let harness = build_harness(config(true, &["echo"]));
        let ok = harness
            .invoke("echo", "actor", Some(json!({"msg": "hi"})))
            .await
            .unwrap();
        assert_eq!(ok.value["msg"], json!("hi"));
        assert!(!ok.request_id.is_empty());
    }

    #[tokio::test]
    async fn timeout_produces_timeout_code() {
        let harness = build_harness(config(true, &["slow"]));
        let err = harness.invoke("slow", "actor", Some(json!({}))).await.unwrap_err();
        assert_eq!(err.code, "timeout");
    }

    #[tokio::test]
    async fn handler_error_propagates_its_code() {
        let harness = build_harness(config(true, &["boom"]));
        let err = harness.invoke("boom", "actor", Some(json!({}))).await.unwrap_err();
        assert_eq!(err.code, "connector_error");
    }

    #[tokio::test]
    async fn max_bytes_exceeded_when_result_too_large() {
        let mut policy = config(true, &["echo"]);
        policy.per_tool.insert(
            "echo".to_string(),
            crate::policy::PerToolConfig {
                max_bytes: Some(1),
                ..Default::default()
            },
        );
        let harness = build_harness(policy);
        let err = harness
            .invoke("echo", "actor", Some(json!({"msg": "much longer than one byte"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "max_bytes_exceeded");
    }
}
