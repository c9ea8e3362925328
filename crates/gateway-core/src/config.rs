//! Startup configuration: a fully-defaulted `GatewayConfig` parsed once from
//! YAML, with a small set of permitted environment overrides layered on top.

use crate::connectors::fs::FsConnectorConfig;
use crate::connectors::http::HttpConnectorConfig;
use crate::connectors::sql::SqlConnectorConfig;
use crate::errors::ConfigError;
use crate::policy::PolicyConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportConfig {
    #[serde(default = "default_true")]
    pub stdio: bool,
    #[serde(default)]
    pub http: Option<HttpTransportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub actor: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub filesystem: FsConnectorConfig,
    pub http: HttpConnectorConfig,
    pub database: SqlConnectorConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl GatewayConfig {
    /// Load from `path`, then apply the permitted environment overrides.
    /// The core only reads the environment here, at this single entry
    /// point — never implicitly elsewhere.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError(format!("could not read config file {}: {e}", path.display()))
        })?;
        let mut config: GatewayConfig =
            serde_yaml::from_str(&raw).map_err(|e| ConfigError(format!("invalid config YAML: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(actor) = std::env::var("GATEWAY_ACTOR") {
            self.actor = actor;
        }
        if let Ok(audit_file) = std::env::var("GATEWAY_AUDIT_FILE") {
            self.audit.file_path = Some(PathBuf::from(audit_file));
        }
        if let Ok(db_path) = std::env::var("GATEWAY_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }
        if let Ok(bind) = std::env::var("GATEWAY_HTTP_BIND") {
            match bind.parse::<SocketAddr>() {
                Ok(addr) => {
                    self.transport.http = Some(HttpTransportConfig { bind_addr: addr });
                }
                Err(e) => {
                    tracing::warn!("ignoring invalid GATEWAY_HTTP_BIND '{bind}': {e}");
                }
            }
        }
    }
}
