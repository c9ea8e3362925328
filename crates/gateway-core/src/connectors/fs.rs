//! Filesystem connector: `fs.readFile` / `fs.listDir` behind path confinement.

use crate::errors::GatewayError;
use crate::registry::{Tool, ToolHandler};
use crate::schema::{FieldSchema, FieldSpec, ObjectSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FsConnectorConfig {
    pub allowed_paths: Vec<PathBuf>,
    #[serde(default)]
    pub denied_paths: Vec<PathBuf>,
    pub max_file_size: u64,
}

/// True if `path` is `base` itself or a descendant of it, using path-segment
/// boundaries rather than a textual prefix comparison.
fn is_descendant_of(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

fn confine(raw: &Path, config: &FsConnectorConfig) -> Result<PathBuf, GatewayError> {
    let canonical = std::fs::canonicalize(raw)
        .map_err(|e| GatewayError::connector(format!("cannot resolve path: {e}")))?;

    for denied in &config.denied_paths {
        if let Ok(denied_canonical) = std::fs::canonicalize(denied) {
            if is_descendant_of(&canonical, &denied_canonical) {
                return Err(GatewayError::security(format!(
                    "path {} is within a denied path",
                    canonical.display()
                )));
            }
        }
    }

    if config.allowed_paths.is_empty() {
        return Err(GatewayError::security("no allowed_paths configured"));
    }

    let allowed = config.allowed_paths.iter().any(|allowed| {
        std::fs::canonicalize(allowed)
            .map(|allowed_canonical| is_descendant_of(&canonical, &allowed_canonical))
            .unwrap_or(false)
    });

    if !allowed {
        return Err(GatewayError::security(format!(
            "path {} is outside allowed_paths",
            canonical.display()
        )));
    }

    Ok(canonical)
}

fn decode_contents(bytes: &[u8], encoding: &str) -> Result<String, GatewayError> {
    match encoding {
        "utf-8" | "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| GatewayError::connector(format!("invalid utf-8: {e}"))),
        "base64" => {
            use base64::Engine;
            Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        "hex" => Ok(hex::encode(bytes)),
        other => Err(GatewayError::validation("encoding", format!("unsupported encoding '{other}'"))),
    }
}

struct ReadFileHandler {
    config: FsConnectorConfig,
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        let path = args["path"].as_str().ok_or_else(|| GatewayError::validation("path", "required"))?;
        let encoding = args.get("encoding").and_then(Value::as_str).unwrap_or("utf-8");

        let confined = confine(Path::new(path), &self.config)?;
        let metadata = tokio::fs::metadata(&confined)
            .await
            .map_err(|e| GatewayError::connector(format!("stat failed: {e}")))?;

        if !metadata.is_file() {
            return Err(GatewayError::connector("not a regular file"));
        }
        if metadata.len() > self.config.max_file_size {
            return Err(GatewayError::security(format!(
                "file size {} exceeds max_file_size {}",
                metadata.len(),
                self.config.max_file_size
            )));
        }

        let bytes = tokio::fs::read(&confined)
            .await
            .map_err(|e| GatewayError::connector(format!("read failed: {e}")))?;
        let content = decode_contents(&bytes, encoding)?;

        Ok(json!({
            "path": confined.display().to_string(),
            "content": content,
            "size": bytes.len(),
            "encoding": encoding,
        }))
    }
}

struct ListDirHandler {
    config: FsConnectorConfig,
}

#[async_trait]
impl ToolHandler for ListDirHandler {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        let path = args["path"].as_str().ok_or_else(|| GatewayError::validation("path", "required"))?;
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);
        let max_depth = args.get("max_depth").and_then(Value::as_u64).unwrap_or(3) as u32;

        let confined = confine(Path::new(path), &self.config)?;
        let metadata = tokio::fs::metadata(&confined)
            .await
            .map_err(|e| GatewayError::connector(format!("stat failed: {e}")))?;
        if !metadata.is_dir() {
            return Err(GatewayError::connector("not a directory"));
        }

        let mut entries = Vec::new();
        self.walk(&confined, 1, max_depth, recursive, &mut entries).await?;
        let count = entries.len();

        Ok(json!({
            "path": confined.display().to_string(),
            "entries": entries,
            "count": count,
        }))
    }
}

impl ListDirHandler {
    async fn walk(
        &self,
        dir: &Path,
        depth: u32,
        max_depth: u32,
        recursive: bool,
        out: &mut Vec<Value>,
    ) -> Result<(), GatewayError> {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| GatewayError::connector(format!("readdir failed: {e}")))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| GatewayError::connector(format!("readdir failed: {e}")))?
        {
            let child_path = entry.path();
            // Paths that escape the allowlist via symlink resolution are
            // silently skipped, not returned as errors.
            let Ok(confined_child) = confine(&child_path, &self.config) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let kind = if meta.is_dir() {
                "directory"
            } else if meta.is_file() {
                "file"
            } else {
                "other"
            };
            out.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "path": confined_child.display().to_string(),
                "type": kind,
                "size": if meta.is_file() { Some(meta.len()) } else { None::<u64> },
            }));

            if recursive && meta.is_dir() && depth < max_depth {
                Box::pin(self.walk(&confined_child, depth + 1, max_depth, recursive, out)).await?;
            }
        }
        Ok(())
    }
}

pub struct FsConnector;

impl FsConnector {
    pub fn tools(config: FsConnectorConfig) -> Vec<Tool> {
        vec![
            Tool::new(
                "fs.readFile",
                "Read a file within the configured allowlist",
                ObjectSchema::new()
                    .field("path", FieldSpec::required(FieldSchema::string()))
                    .field(
                        "encoding",
                        FieldSpec::with_default(
                            FieldSchema::enum_of(["utf-8", "utf8", "base64", "hex"]),
                            json!("utf-8"),
                        ),
                    ),
                std::sync::Arc::new(ReadFileHandler {
                    config: config.clone(),
                }),
            ),
            Tool::new(
                "fs.listDir",
                "List directory entries within the configured allowlist",
                ObjectSchema::new()
                    .field("path", FieldSpec::required(FieldSchema::string()))
                    .field("recursive", FieldSpec::with_default(FieldSchema::Boolean, json!(false)))
                    .field(
                        "max_depth",
                        FieldSpec::with_default(FieldSchema::integer_range(1, 10), json!(3)),
                    ),
                std::sync::Arc::new(ListDirHandler { config }),
            ),
        ]
    }
}
