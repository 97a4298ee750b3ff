use std::collections::BTreeMap;

use regex_lite::Regex;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use crate::resolver::Resolver;

const DEFAULT_MAX_DEPTH: usize = 8;

fn placeholder_re() -> Regex {
    // Built fresh per call: regex-lite has no `once_cell`-style static cache
    // helper and the pattern is tiny, so compiling it is cheap relative to
    // the I/O work resolving a placeholder can trigger.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$\{input:([^}]+)\}").unwrap()
}

/// Walk `value` recursively, substituting `${input:ID}` placeholders via
/// `resolver`. Never fails: unresolved placeholders are left in place and
/// logged; exceeding `max_depth` leaves the remaining subtree untouched.
pub async fn render(value: &Value, resolver: &Resolver, max_depth: Option<usize>) -> Value {
    render_inner(value, resolver, max_depth.unwrap_or(DEFAULT_MAX_DEPTH)).await
}

fn render_inner<'a>(
    value: &'a Value,
    resolver: &'a Resolver,
    depth_remaining: usize,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Value> + Send + 'a>> {
    Box::pin(async move {
        if depth_remaining == 0 {
            warn!("render depth exceeded; leaving subtree unresolved");
            return value.clone();
        }

        match value {
            Value::String(s) => render_string(s, resolver).await,
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(render_inner(item, resolver, depth_remaining - 1).await);
                }
                Value::Array(out)
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), render_inner(v, resolver, depth_remaining - 1).await);
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    })
}

async fn render_string(s: &str, resolver: &Resolver) -> Value {
    let re = placeholder_re();
    let matches: Vec<_> = re.captures_iter(s).collect();
    if matches.is_empty() {
        return Value::String(s.to_string());
    }

    // A string that is *entirely* one placeholder resolves to the native
    // value (may be non-string); preserve that special case first.
    if let Some(whole) = re.find(s) {
        if whole.start() == 0 && whole.end() == s.len() && matches.len() == 1 {
            let id = &matches[0][1];
            return match resolver.resolve(id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(input_id = id, error = %e, "unresolved placeholder left in place");
                    Value::String(s.to_string())
                }
            };
        }
    }

    // Mixed literal/placeholder string: resolve each placeholder and
    // stringify, concatenating with the surrounding literal text. Resolve
    // each distinct id at most once per call.
    let mut resolved: BTreeMap<String, Option<String>> = BTreeMap::new();
    for cap in &matches {
        let id = cap[1].to_string();
        if resolved.contains_key(&id) {
            continue;
        }
        let text = match resolver.resolve(&id).await {
            Ok(v) => Some(stringify(&v)),
            Err(e) => {
                warn!(input_id = %id, error = %e, "unresolved placeholder left in place");
                None
            }
        };
        resolved.insert(id, text);
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for cap in re.captures_iter(s) {
        let whole = cap.get(0).expect("capture group 0 always present");
        out.push_str(&s[last..whole.start()]);
        let id = &cap[1];
        match resolved.get(id).and_then(|o| o.as_ref()) {
            Some(text) => out.push_str(text),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Value::String(out)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::InputDefinition;
    use crate::resolver::FixedPrompter;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn resolver(answers: &[(&str, &str)]) -> Resolver {
        let defs = answers
            .iter()
            .map(|(id, _)| InputDefinition::PromptString {
                id: id.to_string(),
                description: "d".to_string(),
                default: None,
                password: false,
            })
            .collect();
        let answers = answers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Resolver::new(defs, Arc::new(FixedPrompter { answers }))
    }

    #[tokio::test]
    async fn whole_string_placeholder_preserves_native_type() {
        let defs = vec![InputDefinition::Command {
            id: "n".to_string(),
            description: "d".to_string(),
            command: "echo".to_string(),
        }];
        let answers = HashMap::from([("n".to_string(), "42".to_string())]);
        let r = Resolver::new(defs, Arc::new(FixedPrompter { answers }));
        let out = render(&Value::String("${input:n}".to_string()), &r, None).await;
        assert_eq!(out, Value::String("42".to_string()));
    }

    #[tokio::test]
    async fn mixed_placeholder_concatenates_as_string() {
        let r = resolver(&[("user", "alice"), ("region", "us-east")]);
        let out = render(
            &Value::String("hello ${input:user} from ${input:region}!".to_string()),
            &r,
            None,
        )
        .await;
        assert_eq!(out, Value::String("hello alice from us-east!".to_string()));
    }

    #[tokio::test]
    async fn unresolved_placeholder_left_in_place() {
        let r = resolver(&[]);
        let out = render(&Value::String("x${input:missing}y".to_string()), &r, None).await;
        assert_eq!(out, Value::String("x${input:missing}y".to_string()));
    }

    #[tokio::test]
    async fn recurses_into_maps_and_arrays() {
        let r = resolver(&[("k", "v")]);
        let input = serde_json::json!({
            "a": ["${input:k}", "literal"],
            "b": { "c": "${input:k}-suffix" },
        });
        let out = render(&input, &r, None).await;
        assert_eq!(
            out,
            serde_json::json!({
                "a": ["v", "literal"],
                "b": { "c": "v-suffix" },
            })
        );
    }

    #[tokio::test]
    async fn depth_limit_stops_recursion() {
        let r = resolver(&[("k", "v")]);
        let input = serde_json::json!({"a": {"b": {"c": "${input:k}"}}});
        let out = render(&input, &r, Some(2)).await;
        // depth 2 permits object -> object but not the innermost string.
        assert_eq!(out, serde_json::json!({"a": {"b": {"c": "${input:k}"}}}));
    }
}
