//! Core of the compliance-first tool gateway: policy engine, bounded
//! execution harness, audit log, and built-in connectors.
//!
//! Transports (stdio, HTTP) and the CLI entrypoint are thin collaborators
//! that live in sibling crates and depend on this one, not the reverse.

pub mod audit;
pub mod canonical;
pub mod config;
pub mod connectors;
pub mod errors;
pub mod harness;
pub mod policy;
pub mod registry;
pub mod schema;

pub use audit::{AuditContext, AuditEvent, AuditGuard, AuditLogger, Decision};
pub use config::GatewayConfig;
pub use errors::{http_status_for_code, ConfigError, GatewayError};
pub use harness::{Harness, InvokeFailure, InvokeResult, InvokeSuccess};
pub use policy::{Envelope, PolicyConfig, PolicyEngine, PolicyVerdict};
pub use registry::{Tool, ToolHandler, ToolMetadata, ToolRegistry};
pub use schema::{FieldSchema, FieldSpec, ObjectSchema, SchemaError};

use std::sync::Arc;

/// Build a [`Harness`] wired up from a loaded [`GatewayConfig`], with the
/// three built-in connectors registered.
pub fn build_harness(config: &GatewayConfig) -> Result<Arc<Harness>, GatewayError> {
    let mut registry = ToolRegistry::new();
    registry.register_many(connectors::FsConnector::tools(config.filesystem.clone()))?;
    registry.register_many(connectors::HttpConnector::tools(config.http.clone()))?;
    registry.register_many(connectors::SqlConnector::tools(config.database.clone())?)?;

    let policy = PolicyEngine::new(config.policy.clone());
    let audit = AuditLogger::new(config.audit.enabled, config.audit.file_path.as_deref());

    Ok(Arc::new(Harness::new(registry, policy, audit)))
}
