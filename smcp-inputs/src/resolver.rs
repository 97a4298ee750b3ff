use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::definition::InputDefinition;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no input definition with id `{0}`")]
    UnknownId(String),
    #[error("prompt for `{0}` failed: {1}")]
    PromptFailed(String, String),
}

/// The user-supplied I/O surface a [`Resolver`] delegates prompting to.
///
/// Implementations live outside this crate (the interactive CLI shell, a
/// headless test double, ...); this crate only defines the contract.
#[async_trait]
pub trait InputPrompter: Send + Sync {
    async fn prompt_string(&self, id: &str, description: &str, password: bool) -> Result<String, String>;
    async fn pick_string(&self, id: &str, description: &str, options: &[String]) -> Result<String, String>;
    async fn run_command(&self, id: &str, command: &str) -> Result<String, String>;
}

/// A prompter that always fails; useful for headless contexts where no input
/// definitions are expected to be exercised.
pub struct NullPrompter;

#[async_trait]
impl InputPrompter for NullPrompter {
    async fn prompt_string(&self, id: &str, _description: &str, _password: bool) -> Result<String, String> {
        Err(format!("no interactive prompter configured for input `{id}`"))
    }

    async fn pick_string(&self, id: &str, _description: &str, _options: &[String]) -> Result<String, String> {
        Err(format!("no interactive prompter configured for input `{id}`"))
    }

    async fn run_command(&self, id: &str, _command: &str) -> Result<String, String> {
        Err(format!("no interactive prompter configured for input `{id}`"))
    }
}

/// Resolves `${input:ID}` placeholders against a list of [`InputDefinition`]s,
/// caching results by id until explicitly invalidated.
pub struct Resolver {
    definitions: Mutex<HashMap<String, InputDefinition>>,
    cache: Mutex<HashMap<String, Value>>,
    prompter: Arc<dyn InputPrompter>,
}

impl Resolver {
    pub fn new(definitions: Vec<InputDefinition>, prompter: Arc<dyn InputPrompter>) -> Self {
        let definitions = definitions.into_iter().map(|d| (d.id().to_string(), d)).collect();
        Self {
            definitions: Mutex::new(definitions),
            cache: Mutex::new(HashMap::new()),
            prompter,
        }
    }

    /// Replace the definition set, clearing the whole cache: stale answers
    /// to redefined or removed inputs must never be reused.
    pub async fn update_definitions(&self, definitions: Vec<InputDefinition>) {
        let mut defs = self.definitions.lock().await;
        *defs = definitions.into_iter().map(|d| (d.id().to_string(), d)).collect();
        drop(defs);
        self.cache.lock().await.clear();
    }

    pub async fn invalidate(&self, id: &str) {
        self.cache.lock().await.remove(id);
    }

    pub async fn invalidate_all(&self) {
        self.cache.lock().await.clear();
    }

    /// Seeds (or overwrites) a cached answer directly, bypassing the
    /// prompter. Used by non-interactive callers that already know the value.
    pub async fn set_cached(&self, id: &str, value: Value) {
        self.cache.lock().await.insert(id.to_string(), value);
    }

    pub async fn get_cached(&self, id: &str) -> Option<Value> {
        self.cache.lock().await.get(id).cloned()
    }

    pub async fn cached_ids(&self) -> Vec<String> {
        self.cache.lock().await.keys().cloned().collect()
    }

    /// Resolve `id` to its native value, prompting (and caching) on first use.
    pub async fn resolve(&self, id: &str) -> Result<Value, ResolveError> {
        if let Some(cached) = self.cache.lock().await.get(id) {
            return Ok(cached.clone());
        }

        let definition = {
            let defs = self.definitions.lock().await;
            defs.get(id).cloned().ok_or_else(|| ResolveError::UnknownId(id.to_string()))?
        };

        let value = match &definition {
            InputDefinition::PromptString { description, default, password, .. } => {
                match self.prompter.prompt_string(id, description, *password).await {
                    Ok(s) => Value::String(s),
                    Err(e) => {
                        if let Some(d) = default {
                            Value::String(d.clone())
                        } else {
                            return Err(ResolveError::PromptFailed(id.to_string(), e));
                        }
                    }
                }
            }
            InputDefinition::PickString { description, options, default, .. } => {
                match self.prompter.pick_string(id, description, options).await {
                    Ok(s) => Value::String(s),
                    Err(e) => {
                        if let Some(d) = default {
                            Value::String(d.clone())
                        } else {
                            return Err(ResolveError::PromptFailed(id.to_string(), e));
                        }
                    }
                }
            }
            InputDefinition::Command { command, .. } => {
                match self.prompter.run_command(id, command).await {
                    Ok(s) => Value::String(s),
                    Err(e) => return Err(ResolveError::PromptFailed(id.to_string(), e)),
                }
            }
        };

        self.cache.lock().await.insert(id.to_string(), value.clone());
        Ok(value)
    }
}

/// A prompter driven entirely by a fixed answer table; used by tests and by
/// non-interactive callers that pre-seed all expected input ids.
pub struct FixedPrompter {
    pub answers: HashMap<String, String>,
}

#[async_trait]
impl InputPrompter for FixedPrompter {
    async fn prompt_string(&self, id: &str, _description: &str, _password: bool) -> Result<String, String> {
        self.answers.get(id).cloned().ok_or_else(|| {
            warn!(input_id = id, "no fixed answer registered");
            format!("no answer for `{id}`")
        })
    }

    async fn pick_string(&self, id: &str, _description: &str, _options: &[String]) -> Result<String, String> {
        self.answers.get(id).cloned().ok_or_else(|| format!("no answer for `{id}`"))
    }

    async fn run_command(&self, id: &str, _command: &str) -> Result<String, String> {
        self.answers.get(id).cloned().ok_or_else(|| format!("no answer for `{id}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(id: &str, answer: &str) -> Resolver {
        let defs = vec![InputDefinition::PromptString {
            id: id.to_string(),
            description: "d".to_string(),
            default: None,
            password: false,
        }];
        let prompter = Arc::new(FixedPrompter {
            answers: HashMap::from([(id.to_string(), answer.to_string())]),
        });
        Resolver::new(defs, prompter)
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let r = resolver_with("name", "alice");
        assert_eq!(r.resolve("name").await.expect("resolve"), Value::String("alice".into()));
        // second call must hit cache even though FixedPrompter would answer the same anyway
        assert_eq!(r.resolve("name").await.expect("resolve"), Value::String("alice".into()));
    }

    #[tokio::test]
    async fn unknown_id_errors() {
        let r = resolver_with("name", "alice");
        assert_eq!(r.resolve("missing").await, Err(ResolveError::UnknownId("missing".into())));
    }

    #[tokio::test]
    async fn update_definitions_clears_cache() {
        let r = resolver_with("name", "alice");
        r.resolve("name").await.expect("resolve");
        r.update_definitions(vec![InputDefinition::PromptString {
            id: "name".to_string(),
            description: "d2".to_string(),
            default: Some("bob".to_string()),
            password: false,
        }])
        .await;
        // cache was cleared; the prompter has no "name" answer anymore so the default applies
        let prompter = Arc::new(FixedPrompter { answers: HashMap::new() });
        let r2 = Resolver::new(
            vec![InputDefinition::PromptString {
                id: "name".to_string(),
                description: "d2".to_string(),
                default: Some("bob".to_string()),
                password: false,
            }],
            prompter,
        );
        assert_eq!(r2.resolve("name").await.expect("resolve"), Value::String("bob".into()));
    }

    #[tokio::test]
    async fn explicit_invalidate_forces_reprompt() {
        let r = resolver_with("name", "alice");
        r.resolve("name").await.expect("resolve");
        r.invalidate("name").await;
        assert_eq!(r.resolve("name").await.expect("resolve"), Value::String("alice".into()));
    }
}
