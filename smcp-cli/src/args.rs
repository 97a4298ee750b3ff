//! REPL line tokenizing and the `@file` JSON-argument convention shared by
//! every command that takes a JSON payload (`tc`, `render`, `server add`,
//! `inputs add`, ...).

use anyhow::Context;
use anyhow::Result;

/// A leading `@` means "read the JSON from this file" instead of treating
/// the argument as inline JSON text.
pub fn parse_json_arg(raw: &str) -> Result<serde_json::Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading JSON from {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("parsing JSON argument")
}

/// Splits a REPL line into shell-like tokens, honoring single and double
/// quotes so a JSON payload with embedded spaces can be passed as one token.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        anyhow::bail!("unterminated quote in input");
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_quoted_json_as_one_token() {
        let tokens = tokenize(r#"tc computer1 say_hello '{"name": "world"}'"#).expect("tokenize");
        assert_eq!(tokens, vec!["tc", "computer1", "say_hello", r#"{"name": "world"}"#]);
    }

    #[test]
    fn file_arg_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"a": 1}"#).expect("write");
        let value = parse_json_arg(&format!("@{}", path.display())).expect("parse");
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn inline_json_parses_directly() {
        let value = parse_json_arg(r#"{"a": 1}"#).expect("parse");
        assert_eq!(value, serde_json::json!({"a": 1}));
    }
}
