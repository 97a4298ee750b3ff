//! Server and per-tool configuration, independent of the transport and
//! manager runtime state.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use smcp_mcp_client::TransportParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    Expand(String),
    #[error("converting parsed TOML to server config: {0}")]
    Convert(#[from] serde_json::Error),
}

/// Expand `${VAR}` and `${VAR:-default}` sequences in `input` using
/// `lookup`. `${VAR}` resolves via `lookup` or errors if unset;
/// `${VAR:-default}` falls back to the literal default instead. Variable
/// names must match `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn expand_vars(input: &str, mut lookup: impl FnMut(&str) -> Option<String>, source_label: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let start_inner = i + 2;
            let mut end = start_inner;
            let mut found = false;
            while end < bytes.len() {
                if bytes[end] == b'}' {
                    found = true;
                    break;
                }
                end += 1;
            }
            if !found {
                return Err(ConfigError::Expand(format!("unterminated variable expansion starting at byte {i} in {source_label}")));
            }
            let inner = &input[start_inner..end];
            let (name, default) = match inner.split_once(":-") {
                Some((n, d)) => (n, Some(d)),
                None => (inner, None),
            };
            if !is_valid_var_name(name) {
                return Err(ConfigError::Expand(format!("invalid variable name `{name}` in {source_label}")));
            }
            let replacement = match (lookup(name), default) {
                (Some(v), _) => v,
                (None, Some(d)) => d.to_string(),
                (None, None) => {
                    return Err(ConfigError::Expand(format!("environment variable `{name}` not set and no default provided in {source_label}")));
                }
            };
            out.push_str(&replacement);
            i = end + 1;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    Ok(out)
}

fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Walks a parsed TOML document, expanding `${VAR}`/`${VAR:-default}` in
/// every string leaf against the process environment.
fn expand_toml_value(value: toml::Value, source_label: &str) -> Result<toml::Value, ConfigError> {
    Ok(match value {
        toml::Value::String(s) => toml::Value::String(expand_vars(&s, |k| std::env::var(k).ok(), source_label)?),
        toml::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expand_toml_value(item, source_label)?);
            }
            toml::Value::Array(out)
        }
        toml::Value::Table(table) => {
            let mut out = toml::map::Map::new();
            for (k, v) in table {
                out.insert(k, expand_toml_value(v, source_label)?);
            }
            toml::Value::Table(out)
        }
        other => other,
    })
}

#[derive(Deserialize)]
struct ServerConfigFile {
    #[serde(default)]
    server: Vec<ServerConfig>,
}

/// Parses a TOML document of the form `[[server]] ...` into server configs,
/// expanding `${VAR}`/`${VAR:-default}` against the process environment in
/// every string field first (so a `command`/`env` value can reference e.g.
/// `${HOME}` without the caller pre-processing the file).
pub fn load_servers_from_toml(text: &str, source_label: &str) -> Result<Vec<ServerConfig>, ConfigError> {
    let raw: toml::Value = toml::from_str(text)?;
    let expanded = expand_toml_value(raw, source_label)?;
    let json = serde_json::to_value(expanded).map_err(ConfigError::Convert)?;
    let file: ServerConfigFile = serde_json::from_value(json).map_err(ConfigError::Convert)?;
    Ok(file.server)
}

/// Meta applied to a single tool (or, via [`ServerConfig::default_tool_meta`],
/// to every tool on a server that has no per-tool entry). Every field is
/// optional so a per-tool entry can leave a field unset and still inherit it
/// from `default_tool_meta` — `tool_meta_for` merges the two field-by-field,
/// the per-tool value winning wherever it's actually set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_apply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret_meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret_object_mapper: Option<Value>,
}

impl ToolMeta {
    /// `auto_apply`, defaulting to `false` when unset anywhere in the chain.
    pub fn is_auto_apply(&self) -> bool {
        self.auto_apply.unwrap_or(false)
    }

    /// Shallow field-by-field override: every field set on `self` wins;
    /// unset fields fall back to `default`'s.
    fn merged_over(&self, default: &ToolMeta) -> ToolMeta {
        ToolMeta {
            auto_apply: self.auto_apply.or(default.auto_apply),
            alias: self.alias.clone().or_else(|| default.alias.clone()),
            ret_meta: self.ret_meta.clone().or_else(|| default.ret_meta.clone()),
            ret_object_mapper: self.ret_object_mapper.clone().or_else(|| default.ret_object_mapper.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub forbidden_tools: Vec<String>,
    #[serde(default)]
    pub tool_meta: HashMap<String, ToolMeta>,
    #[serde(default)]
    pub default_tool_meta: Option<ToolMeta>,
    #[serde(default)]
    pub vrl: Option<String>,
    pub transport: TransportParams,
}

impl ServerConfig {
    /// The effective meta for a tool: its own `tool_meta` entry (if any)
    /// merged field-by-field over `default_tool_meta`, the per-tool value
    /// winning wherever it's set and the default filling in the rest.
    pub fn tool_meta_for(&self, tool_name: &str) -> ToolMeta {
        match (self.tool_meta.get(tool_name), &self.default_tool_meta) {
            (Some(meta), Some(default)) => meta.merged_over(default),
            (Some(meta), None) => meta.clone(),
            (None, default) => default.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with(tool_meta: HashMap<String, ToolMeta>, default_tool_meta: Option<ToolMeta>) -> ServerConfig {
        ServerConfig {
            name: "s".to_string(),
            disabled: false,
            forbidden_tools: Vec::new(),
            tool_meta,
            default_tool_meta,
            vrl: None,
            transport: smcp_mcp_client::TransportParams::Stdio {
                command: "true".to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                cwd: None,
            },
        }
    }

    #[test]
    fn default_tool_meta_applies_when_missing_per_tool() {
        let default = ToolMeta { auto_apply: Some(true), ..Default::default() };
        let server = server_with(HashMap::new(), Some(default));
        assert!(server.tool_meta_for("tool1").is_auto_apply());
    }

    #[test]
    fn per_tool_field_overrides_default_field() {
        let default = ToolMeta { auto_apply: Some(true), ..Default::default() };
        let per_tool = ToolMeta { auto_apply: Some(false), ..Default::default() };
        let server = server_with(HashMap::from([("tool1".to_string(), per_tool)]), Some(default));
        assert!(!server.tool_meta_for("tool1").is_auto_apply());
    }

    #[test]
    fn per_tool_unset_fields_inherit_from_default() {
        let default = ToolMeta {
            auto_apply: Some(true),
            alias: Some("default-alias".to_string()),
            ret_meta: None,
            ret_object_mapper: Some(serde_json::json!({"a": 1})),
        };
        // per-tool entry only overrides auto_apply; alias/ret_object_mapper are unset
        // and must still be inherited from default_tool_meta, not dropped.
        let per_tool = ToolMeta { auto_apply: Some(false), ..Default::default() };
        let server = server_with(HashMap::from([("tool1".to_string(), per_tool)]), Some(default));
        let effective = server.tool_meta_for("tool1");
        assert!(!effective.is_auto_apply());
        assert_eq!(effective.alias.as_deref(), Some("default-alias"));
        assert_eq!(effective.ret_object_mapper, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn no_default_and_no_entry_yields_default_meta() {
        let server = server_with(HashMap::new(), None);
        assert_eq!(server.tool_meta_for("tool1"), ToolMeta::default());
    }

    #[test]
    fn expand_vars_substitutes_and_falls_back_to_default() {
        std::env::set_var("SMCP_TEST_CONFIG_VAR", "alice");
        let resolved = expand_vars("/home/${SMCP_TEST_CONFIG_VAR}/bin", |k| std::env::var(k).ok(), "test").unwrap();
        assert_eq!(resolved, "/home/alice/bin");
        let with_default = expand_vars("${SMCP_TEST_CONFIG_MISSING:-us-east}", |k| std::env::var(k).ok(), "test").unwrap();
        assert_eq!(with_default, "us-east");
    }

    #[test]
    fn expand_vars_errors_on_missing_required() {
        let err = expand_vars("x${SMCP_TEST_CONFIG_REQUIRED}y", |_| None, "test").unwrap_err();
        assert!(matches!(err, ConfigError::Expand(_)));
    }

    #[test]
    fn load_servers_from_toml_expands_env_and_parses_transport() {
        std::env::set_var("SMCP_TEST_CONFIG_CMD", "my-server");
        let text = r#"
            [[server]]
            name = "demo"

            [server.transport]
            type = "stdio"
            command = "${SMCP_TEST_CONFIG_CMD}"
            args = []
        "#;
        let servers = load_servers_from_toml(text, "test.toml").unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "demo");
        match &servers[0].transport {
            smcp_mcp_client::TransportParams::Stdio { command, .. } => assert_eq!(command, "my-server"),
            other => panic!("unexpected transport: {other:?}"),
        }
    }
}

/// `meta` key under which `ToolMeta` is injected into a tool call's result.
pub const A2C_TOOL_META: &str = "a2c_tool_meta";

/// Key under which a tool's server-originated annotations are carried
/// verbatim alongside the injected `a2c_tool_meta`, so neither clobbers the
/// other when both are present.
pub const MCP_TOOL_ANNOTATION: &str = "mcp_tool_annotation";

/// `meta` key under which the VRL-transformed JSON payload is attached to a
/// tool call's result, as a JSON-encoded string.
pub const A2C_VRL_TRANSFORMED: &str = "a2c_vrl_transformed";
