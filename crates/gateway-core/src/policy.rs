//! Policy decision engine: allow/deny plus the effective resource envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Top-level policy configuration, loaded from `GatewayConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default = "default_deny_default")]
    pub default_deny: bool,
    #[serde(default)]
    pub allow_tools: BTreeSet<String>,
    #[serde(default)]
    pub deny_tools: BTreeSet<String>,
    #[serde(default)]
    pub per_tool: BTreeMap<String, PerToolConfig>,
    pub global_timeout_ms: u64,
    pub global_max_bytes: u64,
}

fn default_deny_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerToolConfig {
    /// Tristate: absent means "no per-tool opinion".
    #[serde(default)]
    pub allow: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_bytes: Option<u64>,
    #[serde(default)]
    pub arg_allowlist: BTreeMap<String, ArgAllowlistEntry>,
}

/// One entry of a `per_tool.arg_allowlist`, deserialized from whichever of
/// the four shapes appears in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgAllowlistEntry {
    Any(bool),
    Values(Vec<Value>),
    Pattern(String),
    Literal(Value),
}

impl ArgAllowlistEntry {
    /// `regex:<pattern>` strings are patterns; everything else falls through
    /// to membership/equality checks.
    fn as_regex_pattern(raw: &str) -> Option<&str> {
        raw.strip_prefix("regex:")
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any(true) => true,
            Self::Any(false) => false,
            Self::Values(values) => values.contains(value),
            Self::Pattern(raw) => {
                let Some(pattern) = Self::as_regex_pattern(raw) else {
                    return value.as_str() == Some(raw.as_str()) || value == &Value::String(raw.clone());
                };
                let Some(s) = value.as_str() else { return false };
                regex::Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false)
            }
            Self::Literal(expected) => expected == value,
        }
    }

    /// Human-readable description of what this entry accepts, for denial reasons.
    fn describe(&self) -> String {
        match self {
            Self::Any(true) => "any value".to_string(),
            Self::Any(false) => "no value (disabled)".to_string(),
            Self::Values(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("one of [{}]", rendered.join(", "))
            }
            Self::Pattern(raw) => format!("pattern {raw}"),
            Self::Literal(expected) => format!("exactly {expected}"),
        }
    }
}

/// The computed timeout/size bounds a tool call is allowed to run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub timeout_ms: u64,
    pub max_bytes: u64,
}

/// Outcome of [`PolicyEngine::decide`].
#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub reason: String,
    pub envelope: Envelope,
}

pub struct PolicyEngine {
    config: PolicyConfig,
}

/// Glob-ish tool-name matching: `*`, `prefix*`, `*suffix`, `*mid*`, exact.
fn matches_tool_pattern(tool_name: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return tool_name == pattern;
    }
    let starts_star = pattern.starts_with('*');
    let ends_star = pattern.ends_with('*');
    match (starts_star, ends_star) {
        (true, true) => {
            let inner = pattern.trim_matches('*');
            inner.is_empty() || tool_name.contains(inner)
        }
        (false, true) => {
            let prefix = pattern.trim_end_matches('*');
            !prefix.is_empty() && tool_name.starts_with(prefix)
        }
        (true, false) => {
            let suffix = pattern.trim_start_matches('*');
            !suffix.is_empty() && tool_name.ends_with(suffix)
        }
        (false, false) => tool_name == pattern,
    }
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    fn envelope_for(&self, per_tool: Option<&PerToolConfig>) -> Envelope {
        Envelope {
            timeout_ms: per_tool
                .and_then(|p| p.timeout_ms)
                .unwrap_or(self.config.global_timeout_ms),
            max_bytes: per_tool
                .and_then(|p| p.max_bytes)
                .unwrap_or(self.config.global_max_bytes),
        }
    }

    /// Evaluate the five-step decision order against `tool`/`args`.
    pub fn decide(&self, tool: &str, args: &Value) -> PolicyVerdict {
        let per_tool = self.config.per_tool.get(tool);
        let envelope = self.envelope_for(per_tool);

        // 1. deny_tools
        if self
            .config
            .deny_tools
            .iter()
            .any(|pattern| matches_tool_pattern(tool, pattern))
        {
            return PolicyVerdict {
                allowed: false,
                reason: format!("deny_tools: {tool}"),
                envelope,
            };
        }

        // 2. per_tool
        if let Some(per_tool) = per_tool {
            if per_tool.allow == Some(false) {
                return PolicyVerdict {
                    allowed: false,
                    reason: "per_tool denied".to_string(),
                    envelope,
                };
            }

            if !per_tool.arg_allowlist.is_empty() {
                if let Some(verdict) = self.check_arg_allowlist(tool, args, per_tool, envelope) {
                    return verdict;
                }
            }

            if per_tool.allow == Some(true) {
                return PolicyVerdict {
                    allowed: true,
                    reason: "per_tool allow".to_string(),
                    envelope,
                };
            }
        }

        // 3. allow_tools
        if self
            .config
            .allow_tools
            .iter()
            .any(|pattern| matches_tool_pattern(tool, pattern))
        {
            return PolicyVerdict {
                allowed: true,
                reason: format!("allow_tools: {tool}"),
                envelope,
            };
        }

        // 4. default_deny
        if self.config.default_deny {
            return PolicyVerdict {
                allowed: false,
                reason: "default_deny".to_string(),
                envelope,
            };
        }

        // 5. default allow
        PolicyVerdict {
            allowed: true,
            reason: "default allow".to_string(),
            envelope,
        }
    }

    fn check_arg_allowlist(
        &self,
        tool: &str,
        args: &Value,
        per_tool: &PerToolConfig,
        envelope: Envelope,
    ) -> Option<PolicyVerdict> {
        let Value::Object(map) = args else {
            return None;
        };
        for (key, value) in map {
            let Some(entry) = per_tool.arg_allowlist.get(key) else {
                return Some(PolicyVerdict {
                    allowed: false,
                    reason: format!("arg_allowlist: unrecognized key '{key}' for {tool}"),
                    envelope,
                });
            };
            if !entry.matches(value) {
                return Some(PolicyVerdict {
                    allowed: false,
                    reason: format!(
                        "arg_allowlist: '{key}' = {value} does not match allowed values for {tool} (expected {})",
                        entry.describe()
                    ),
                    envelope,
                });
            }
        }
        None
    }

    /// Convenience wrapper returning just the envelope on allow, or the deny
    /// reason as an `Err`.
    pub fn enforce(&self, tool: &str, args: &Value) -> Result<Envelope, String> {
        let verdict = self.decide(tool, args);
        if verdict.allowed {
            Ok(verdict.envelope)
        } else {
            Err(verdict.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> PolicyConfig {
        PolicyConfig {
            default_deny: true,
            allow_tools: BTreeSet::new(),
            deny_tools: BTreeSet::new(),
            per_tool: BTreeMap::new(),
            global_timeout_ms: 5000,
            global_max_bytes: 1_000_000,
        }
    }

    #[test]
    fn deny_tools_wins_over_allow_tools() {
        let mut config = base_config();
        config.allow_tools.insert("fs.readFile".into());
        config.deny_tools.insert("fs.readFile".into());
        let engine = PolicyEngine::new(config);
        let verdict = engine.decide("fs.readFile", &json!({}));
        assert!(!verdict.allowed);
        assert!(verdict.reason.starts_with("deny_tools"));
    }

    #[test]
    fn default_deny_blocks_unlisted_tool() {
        let engine = PolicyEngine::new(base_config());
        let verdict = engine.decide("anything", &json!({}));
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, "default_deny");
    }

    #[test]
    fn default_allow_when_default_deny_false() {
        let mut config = base_config();
        config.default_deny = false;
        let engine = PolicyEngine::new(config);
        let verdict = engine.decide("anything", &json!({}));
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, "default allow");
    }

    #[test]
    fn per_tool_explicit_deny_overrides_allow_tools() {
        let mut config = base_config();
        config.allow_tools.insert("fs.readFile".into());
        config.per_tool.insert(
            "fs.readFile".into(),
            PerToolConfig {
                allow: Some(false),
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(config);
        let verdict = engine.decide("fs.readFile", &json!({}));
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, "per_tool denied");
    }

    #[test]
    fn arg_allowlist_rejects_unrecognized_key() {
        let mut config = base_config();
        let mut allowlist = BTreeMap::new();
        allowlist.insert("path".to_string(), ArgAllowlistEntry::Any(true));
        config.per_tool.insert(
            "fs.readFile".into(),
            PerToolConfig {
                allow: Some(true),
                arg_allowlist: allowlist,
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(config);
        let verdict = engine.decide("fs.readFile", &json!({"path": "/tmp/x", "extra": 1}));
        assert!(!verdict.allowed);
        assert!(verdict.reason.contains("extra"));
    }

    #[test]
    fn arg_allowlist_regex_prefix_matches() {
        let mut config = base_config();
        let mut allowlist = BTreeMap::new();
        allowlist.insert(
            "path".to_string(),
            ArgAllowlistEntry::Pattern("regex:^/tmp/.*".to_string()),
        );
        config.per_tool.insert(
            "fs.readFile".into(),
            PerToolConfig {
                allow: Some(true),
                arg_allowlist: allowlist,
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(config);
        assert!(engine.decide("fs.readFile", &json!({"path": "/tmp/a"})).allowed);
        assert!(!engine.decide("fs.readFile", &json!({"path": "/etc/passwd"})).allowed);
    }

    #[test]
    fn arg_allowlist_does_not_require_keys_absent_from_args() {
        let mut config = base_config();
        let mut allowlist = BTreeMap::new();
        allowlist.insert("path".to_string(), ArgAllowlistEntry::Any(true));
        allowlist.insert("encoding".to_string(), ArgAllowlistEntry::Any(true));
        config.per_tool.insert(
            "fs.readFile".into(),
            PerToolConfig {
                allow: Some(true),
                arg_allowlist: allowlist,
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(config);
        assert!(engine.decide("fs.readFile", &json!({"path": "/tmp/a"})).allowed);
    }

    #[test]
    fn per_tool_overrides_replace_not_merge_globals() {
        let mut config = base_config();
        config.allow_tools.insert("fs.readFile".into());
        config.per_tool.insert(
            "fs.readFile".into(),
            PerToolConfig {
                timeout_ms: Some(100),
                ..Default::default()
            },
        );
        let engine = PolicyEngine::new(config);
        let verdict = engine.decide("fs.readFile", &json!({}));
        assert_eq!(verdict.envelope.timeout_ms, 100);
        assert_eq!(verdict.envelope.max_bytes, 1_000_000);
    }

    #[test]
    fn wildcard_patterns_match_tool_names() {
        assert!(matches_tool_pattern("fs.readFile", "fs.*"));
        assert!(matches_tool_pattern("fs.readFile", "*.readFile"));
        assert!(matches_tool_pattern("fs.readFile", "*read*"));
        assert!(!matches_tool_pattern("web.fetch", "fs.*"));
    }

    #[test]
    fn enforce_returns_envelope_on_allow_and_reason_on_deny() {
        let mut config = base_config();
        config.default_deny = false;
        let engine = PolicyEngine::new(config);
        assert!(engine.enforce("x", &json!({})).is_ok());

        let engine = PolicyEngine::new(base_config());
        assert_eq!(engine.enforce("x", &json!({})).unwrap_err(), "default_deny");
    }
}
