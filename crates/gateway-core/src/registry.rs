//! Tool registry: the set of callable tools and their declared shapes.

use crate::errors::GatewayError;
use crate::schema::ObjectSchema;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// A connector-supplied handler for a single tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, GatewayError>> + Send,
{
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        (self)(args.clone()).await
    }
}

/// A single registered tool: its name, docs, input shape and handler.
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: ObjectSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ObjectSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }
}

/// Lightweight, serializable description of a registered tool, used for the
/// `tools/list` and `GET /tools` surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The full set of tools this gateway instance can execute. Listing order
/// matches registration order, not name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, failing if its name is already taken.
    pub fn register(&mut self, tool: Tool) -> Result<(), GatewayError> {
        if self.tools.contains_key(&tool.name) {
            return Err(GatewayError::internal(format!(
                "duplicate tool registration: {}",
                tool.name
            )));
        }
        self.tools.insert(tool.name.clone(), Arc::new(tool));
        Ok(())
    }

    pub fn register_many(&mut self, tools: impl IntoIterator<Item = Tool>) -> Result<(), GatewayError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn metadata(&self) -> Vec<ToolMetadata> {
        self.tools
            .values()
            .map(|t| ToolMetadata {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.to_json_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, FieldSpec};
    use serde_json::json;

    fn noop_tool(name: &str) -> Tool {
        Tool::new(
            name,
            "does nothing",
            ObjectSchema::new().field("x", FieldSpec::optional(FieldSchema::string())),
            Arc::new(|_args: Value| async { Ok(json!({})) }),
        )
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("fs.readFile")).unwrap();
        let err = registry.register(noop_tool("fs.readFile")).unwrap_err();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn lookup_finds_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("web.fetch")).unwrap();
        assert!(registry.lookup("web.fetch").is_some());
        assert!(registry.lookup("db.query").is_none());
    }

    #[test]
    fn metadata_reports_json_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("db.query")).unwrap();
        let meta = registry.metadata();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].name, "db.query");
        assert_eq!(meta[0].input_schema["type"], json!("object"));
    }

    #[tokio::test]
    async fn handler_closure_is_callable() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("web.fetch")).unwrap();
        let tool = registry.lookup("web.fetch").unwrap();
        let result = tool.handler.call(&json!({})).await.unwrap();
        assert_eq!(result, json!({}));
    }
}
