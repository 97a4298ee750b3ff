//! Compiles and runs a per-server VRL ("Vector Remap Language") script that
//! post-processes a tool call's JSON result before it is handed back to the
//! agent. Compilation happens once, at server-install time; a script that
//! fails to compile rejects the server config outright. A script that fails
//! *at runtime* is logged and the call falls through with the untransformed
//! result rather than failing the whole tool call.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;
use vrl::compiler::runtime::Runtime;
use vrl::compiler::state::RuntimeState;
use vrl::compiler::TargetValueRef;
use vrl::compiler::TimeZone;
use vrl::diagnostic::Formatter;
use vrl::value::Secrets;
use vrl::value::Value as VrlValue;

#[derive(Debug, Error)]
pub enum VrlError {
    #[error("vrl script failed to compile:\n{0}")]
    Compile(String),

    #[error("vrl script failed at runtime: {0}")]
    Runtime(String),
}

/// A VRL program compiled against the default stdlib function set.
pub struct CompiledVrl {
    program: vrl::compiler::Program,
}

impl CompiledVrl {
    pub fn compile(script: &str) -> Result<Self, VrlError> {
        let functions = vrl::stdlib::all();
        let compiled = vrl::compiler::compile(script, &functions).map_err(|diagnostics| {
            VrlError::Compile(Formatter::new(script, diagnostics).to_string())
        })?;
        Ok(Self { program: compiled.program })
    }

    /// Runs the program against `input`, returning the transformed JSON
    /// value. The script mutates `.` in place, so the return value is the
    /// post-mutation document, not a VRL function return.
    pub fn run(&self, input: serde_json::Value) -> Result<serde_json::Value, VrlError> {
        let mut target_value = json_to_vrl(input);
        let mut metadata = VrlValue::Object(BTreeMap::new());
        let mut secrets = Secrets::new();
        let mut target = TargetValueRef {
            value: &mut target_value,
            metadata: &mut metadata,
            secrets: &mut secrets,
        };
        let timezone = TimeZone::default();
        let mut runtime = Runtime::new(RuntimeState::default());
        runtime
            .resolve(&mut target, &self.program, &timezone)
            .map_err(|e| VrlError::Runtime(e.to_string()))?;
        Ok(vrl_to_json(target_value))
    }
}

/// Builds the VRL input document for a tool call: `{tool_name, parameters}`,
/// matching the context the script can introspect.
pub fn tool_call_context(tool_name: &str, parameters: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "tool_name": tool_name,
        "parameters": parameters,
    })
}

fn json_to_vrl(value: serde_json::Value) -> VrlValue {
    match value {
        serde_json::Value::Null => VrlValue::Null,
        serde_json::Value::Bool(b) => VrlValue::Boolean(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                VrlValue::Integer(i)
            } else {
                match n.as_f64().and_then(|f| ordered_float::NotNan::new(f).ok()) {
                    Some(f) => VrlValue::Float(f),
                    None => VrlValue::Null,
                }
            }
        }
        serde_json::Value::String(s) => VrlValue::Bytes(s.into_bytes().into()),
        serde_json::Value::Array(items) => VrlValue::Array(items.into_iter().map(json_to_vrl).collect()),
        serde_json::Value::Object(map) => {
            VrlValue::Object(map.into_iter().map(|(k, v)| (k, json_to_vrl(v))).collect())
        }
    }
}

fn vrl_to_json(value: VrlValue) -> serde_json::Value {
    match value {
        VrlValue::Null => serde_json::Value::Null,
        VrlValue::Boolean(b) => serde_json::Value::Bool(b),
        VrlValue::Integer(i) => serde_json::Value::from(i),
        VrlValue::Float(f) => serde_json::json!(f.into_inner()),
        VrlValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(&b).into_owned()),
        VrlValue::Array(items) => serde_json::Value::Array(items.into_iter().map(vrl_to_json).collect()),
        VrlValue::Object(map) => {
            serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, vrl_to_json(v))).collect())
        }
        _ => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_runs_simple_script() {
        let script = r#".context = { "tool": .tool_name, "params": .parameters }"#;
        let compiled = CompiledVrl::compile(script).expect("script compiles");
        let input = tool_call_context("search", &serde_json::json!({"query": "rust"}));
        let out = compiled.run(input).expect("script runs");
        assert_eq!(out["context"]["tool"], "search");
        assert_eq!(out["context"]["params"]["query"], "rust");
    }

    #[test]
    fn rejects_invalid_script_at_compile_time() {
        let err = CompiledVrl::compile("this is not valid vrl {{{").unwrap_err();
        assert!(matches!(err, VrlError::Compile(_)));
    }
}
