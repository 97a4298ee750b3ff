//! The C4 MCP Client Manager: owns every configured server's connection
//! lifecycle, keeps the flattened tool-name -> server routing table current,
//! and is the single place tool calls (and VRL post-processing) run through.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use smcp_mcp_client::CallToolOutcome;
use smcp_mcp_client::ClientError;
use smcp_mcp_client::McpClient;
use smcp_mcp_client::NotificationHandler;
use smcp_mcp_client::ServerNotification;
use smcp_mcp_client::ToolInfo;
use smcp_window_uri::WindowUri;

use crate::config::ServerConfig;
use crate::config::ToolMeta;
use crate::config::A2C_TOOL_META;
use crate::config::A2C_VRL_TRANSFORMED;
use crate::config::MCP_TOOL_ANNOTATION;
use crate::desktop::RawWindow;
use crate::vrl_transform::tool_call_context;
use crate::vrl_transform::CompiledVrl;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("server {0} is disabled")]
    ServerDisabled(String),

    #[error("server {0} is not active")]
    ServerNotActive(String),

    #[error("tool {0} is disabled")]
    ToolDisabled(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} is registered by both {existing} and {incoming}")]
    ToolNameDuplicated { tool: String, existing: String, incoming: String },

    #[error("auto-reconnect is disabled; restart {0} manually to apply the new config")]
    AutoReconnectDisabled(String),

    #[error("tool call timed out")]
    Timeout,

    #[error(transparent)]
    Client(#[from] ClientError),
}

struct ActiveServer {
    client: Arc<McpClient>,
    vrl: Option<Arc<CompiledVrl>>,
}

/// Supervises every configured MCP server. Holds no opinion on *how* a tool
/// call's result should be displayed; that is the desktop aggregator's job.
pub struct MCPServerManager {
    servers_config: RwLock<HashMap<String, ServerConfig>>,
    active: RwLock<HashMap<String, ActiveServer>>,
    tool_mapping: RwLock<HashMap<String, String>>,
    alias_mapping: RwLock<HashMap<String, (String, String)>>,
    disabled_tools: RwLock<HashSet<String>>,
    auto_reconnect: RwLock<bool>,
    /// The single upstream handler every client's notifications relay to
    /// (spec's "Manager installs a single message handler shared by all
    /// clients"). A plain `std::sync::RwLock` because reading/writing it
    /// never crosses an `.await` point.
    upstream_notify: Arc<StdRwLock<Option<NotificationHandler>>>,
}

impl Default for MCPServerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MCPServerManager {
    pub fn new() -> Self {
        Self {
            servers_config: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            tool_mapping: RwLock::new(HashMap::new()),
            alias_mapping: RwLock::new(HashMap::new()),
            disabled_tools: RwLock::new(HashSet::new()),
            auto_reconnect: RwLock::new(false),
            upstream_notify: Arc::new(StdRwLock::new(None)),
        }
    }

    pub async fn set_auto_reconnect(&self, enabled: bool) {
        *self.auto_reconnect.write().await = enabled;
    }

    /// Installs the handler every connected client's server-pushed
    /// notifications are forwarded to. The Computer Facade uses this to
    /// re-broadcast tool-list / desktop changes upstream.
    pub fn set_notification_handler(&self, handler: NotificationHandler) {
        if let Ok(mut guard) = self.upstream_notify.write() {
            *guard = Some(handler);
        }
    }

    /// The handler every client is connected with: forwards each
    /// notification to whichever upstream handler is currently installed, or
    /// drops it if none is.
    fn notification_relay(&self) -> NotificationHandler {
        let upstream = Arc::clone(&self.upstream_notify);
        Arc::new(move |notification: ServerNotification| {
            if let Ok(guard) = upstream.read() {
                if let Some(handler) = guard.as_ref() {
                    handler(notification);
                }
            }
        })
    }

    /// Registers server configs without connecting anything.
    pub async fn initialize(&self, servers: Vec<ServerConfig>) {
        let mut cfg = self.servers_config.write().await;
        cfg.clear();
        for server in servers {
            cfg.insert(server.name.clone(), server);
        }
    }

    /// Connects every non-disabled configured server. A server whose tool
    /// names collide with an already-started server is rolled back alone;
    /// the remaining servers stay up and the error is returned once all
    /// servers have been attempted.
    pub async fn start_all(&self) -> Result<(), ManagerError> {
        let names: Vec<String> = self.servers_config.read().await.keys().cloned().collect();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.start_client(&name).await {
                if !matches!(e, ManagerError::ServerDisabled(_)) {
                    warn!(server = %name, error = %e, "server failed to start");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn start_client(&self, name: &str) -> Result<(), ManagerError> {
        let config = {
            let cfg = self.servers_config.read().await;
            cfg.get(name).cloned().ok_or_else(|| ManagerError::UnknownServer(name.to_string()))?
        };
        if config.disabled {
            return Err(ManagerError::ServerDisabled(name.to_string()));
        }
        if self.active.read().await.contains_key(name) {
            return Ok(());
        }

        let client = Arc::new(McpClient::new(name, config.transport.clone()));
        client.connect(Some(self.notification_relay())).await?;

        let vrl = match &config.vrl {
            Some(script) => Some(Arc::new(CompiledVrl::compile(script).map_err(|e| {
                ClientError::Transport(format!("vrl compile error for {name}: {e}"))
            })?)),
            None => None,
        };

        self.active.write().await.insert(name.to_string(), ActiveServer { client, vrl });

        if let Err(e) = self.refresh_tool_mapping().await {
            // Roll back only this server, per the duplicate-tool invariant.
            self.active.write().await.remove(name);
            if let Some(server) = self.active.read().await.get(name) {
                let _ = server.client.disconnect().await;
            }
            return Err(e);
        }

        info!(server = %name, "mcp server started");
        Ok(())
    }

    pub async fn stop_client(&self, name: &str) -> Result<(), ManagerError> {
        if let Some(server) = self.active.write().await.remove(name) {
            server.client.disconnect().await?;
        }
        let _ = self.refresh_tool_mapping().await;
        Ok(())
    }

    pub async fn add_or_update_server(&self, config: ServerConfig) -> Result<(), ManagerError> {
        let name = config.name.clone();
        let is_active = self.active.read().await.contains_key(&name);
        if is_active && !*self.auto_reconnect.read().await {
            return Err(ManagerError::AutoReconnectDisabled(name));
        }

        let previous = self.servers_config.write().await.insert(name.clone(), config);
        if is_active {
            if let Err(e) = self.stop_client(&name).await {
                warn!(server = %name, error = %e, "failed to stop server before reconnect");
            }
            if let Err(e) = self.start_client(&name).await {
                // Roll back the config so the bad update doesn't stick.
                let mut cfg = self.servers_config.write().await;
                match previous {
                    Some(previous) => {
                        cfg.insert(name.clone(), previous);
                    }
                    None => {
                        cfg.remove(&name);
                    }
                }
                return Err(e);
            }
        } else if *self.auto_reconnect.read().await {
            if let Err(e) = self.start_client(&name).await {
                if !matches!(e, ManagerError::ServerDisabled(_)) {
                    let mut cfg = self.servers_config.write().await;
                    match previous {
                        Some(previous) => {
                            cfg.insert(name.clone(), previous);
                        }
                        None => {
                            cfg.remove(&name);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub async fn remove_server(&self, name: &str) -> Result<(), ManagerError> {
        if self.servers_config.write().await.remove(name).is_none() {
            return Err(ManagerError::UnknownServer(name.to_string()));
        }
        self.stop_client(name).await
    }

    pub fn server_status(&self) -> ServerStatusQuery<'_> {
        ServerStatusQuery { manager: self }
    }

    pub async fn server_configs(&self) -> Vec<ServerConfig> {
        self.servers_config.read().await.values().cloned().collect()
    }

    /// Rebuilds `tool_mapping`/`alias_mapping`/`disabled_tools` from every
    /// active server's current tool list. First writer wins: the first
    /// server (in active-map iteration order) to claim a name keeps it,
    /// and any later claim is a [`ManagerError::ToolNameDuplicated`].
    async fn refresh_tool_mapping(&self) -> Result<(), ManagerError> {
        let active = self.active.read().await;
        let configs = self.servers_config.read().await;

        let mut tool_mapping = HashMap::new();
        let mut alias_mapping = HashMap::new();
        let mut disabled_tools = HashSet::new();

        for (server_name, server) in active.iter() {
            let config = configs.get(server_name);
            let tools = server.client.list_tools().await?;
            for tool in tools {
                let meta = config.map(|c| c.tool_meta_for(&tool.name)).unwrap_or_default();
                let public_name = meta.alias.clone().unwrap_or_else(|| tool.name.clone());

                if let Some(existing) = tool_mapping.get(&public_name) {
                    return Err(ManagerError::ToolNameDuplicated {
                        tool: public_name,
                        existing: existing.clone(),
                        incoming: server_name.clone(),
                    });
                }
                tool_mapping.insert(public_name.clone(), server_name.clone());
                if meta.alias.is_some() {
                    alias_mapping.insert(public_name, (server_name.clone(), tool.name.clone()));
                }

                if let Some(config) = config {
                    if config.forbidden_tools.contains(&tool.name) {
                        disabled_tools.insert(tool.name.clone());
                    }
                }
            }
        }

        drop(active);
        drop(configs);
        *self.tool_mapping.write().await = tool_mapping;
        *self.alias_mapping.write().await = alias_mapping;
        *self.disabled_tools.write().await = disabled_tools;
        Ok(())
    }

    /// Lists every tool visible across active servers, with [`ToolMeta`]
    /// injected under `meta.a2c_tool_meta` for callers (the facade, the
    /// signaling hub) that need to forward `auto_apply` etc. to an agent.
    pub async fn available_tools(&self) -> Vec<ToolInfo> {
        let active = self.active.read().await;
        let configs = self.servers_config.read().await;
        let mut out = Vec::new();
        for (server_name, server) in active.iter() {
            let Ok(tools) = server.client.list_tools().await else { continue };
            for mut tool in tools {
                if let Some(config) = configs.get(server_name) {
                    let meta = config.tool_meta_for(&tool.name);
                    inject_tool_meta(&mut tool, &meta);
                }
                out.push(tool);
            }
        }
        out
    }

    /// Resolves a public tool name (which may be an alias) to the
    /// `(server, real_tool_name)` it should be dispatched as, enforcing the
    /// disabled-tool and routing-table invariants.
    async fn resolve_tool(&self, tool_name: &str) -> Result<(String, String), ManagerError> {
        if self.disabled_tools.read().await.contains(tool_name) {
            return Err(ManagerError::ToolDisabled(tool_name.to_string()));
        }
        if let Some((server, real_name)) = self.alias_mapping.read().await.get(tool_name).cloned() {
            return Ok((server, real_name));
        }
        match self.tool_mapping.read().await.get(tool_name).cloned() {
            Some(server) => Ok((server, tool_name.to_string())),
            None => Err(ManagerError::UnknownTool(tool_name.to_string())),
        }
    }

    /// Executes a tool addressed by its public name (post alias/forbidden
    /// resolution), applying the owning server's VRL transform and
    /// [`ToolMeta`] injection to the result.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<CallToolOutcome, ManagerError> {
        let (server_name, real_name) = self.resolve_tool(tool_name).await?;
        self.call_tool(&server_name, &real_name, params, timeout).await
    }

    /// Executes a tool directly on a named server, bypassing alias/forbidden
    /// resolution. Used by callers that already know the target server
    /// (config validation, the facade's direct-dispatch path).
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<CallToolOutcome, ManagerError> {
        let active = self.active.read().await;
        let server = active
            .get(server_name)
            .ok_or_else(|| ManagerError::ServerNotActive(server_name.to_string()))?;
        let client = Arc::clone(&server.client);
        let vrl = server.vrl.clone();
        drop(active);

        let mut result = match client.call_tool(tool_name, Some(params.clone()), timeout).await {
            Ok(r) => r,
            Err(ClientError::Timeout) => return Err(ManagerError::Timeout),
            Err(e) => return Err(ManagerError::Client(e)),
        };

        if let Some(vrl) = vrl {
            let context = tool_call_context(tool_name, &params);
            match vrl.run(context) {
                Ok(transformed) => {
                    let mut meta = result.meta.take().unwrap_or(serde_json::Value::Object(Default::default()));
                    if let serde_json::Value::Object(map) = &mut meta {
                        map.insert(
                            A2C_VRL_TRANSFORMED.to_string(),
                            serde_json::Value::String(transformed.to_string()),
                        );
                    }
                    result.meta = Some(meta);
                }
                Err(e) => warn!(server = %server_name, tool = %tool_name, error = %e, "vrl transform failed"),
            }
        }

        let configs = self.servers_config.read().await;
        if let Some(config) = configs.get(server_name) {
            let meta = config.tool_meta_for(tool_name);
            inject_outcome_meta(&mut result, &meta);
        }

        Ok(result)
    }

    /// Collects every active server's `window://` resources and their
    /// detail, as raw material for [`crate::desktop::organize_desktop`].
    pub async fn windows_details(&self, focus_uri: Option<&str>) -> Vec<RawWindow> {
        let active = self.active.read().await;
        let mut out = Vec::new();
        for (name, server) in active.iter() {
            let windows = server.client.list_windows().await;
            for uri in windows {
                if let Some(focus) = focus_uri {
                    if uri.to_string() != focus {
                        continue;
                    }
                }
                let detail = server.client.get_window_detail(&uri).await;
                out.push((name.clone(), uri.to_string(), detail));
            }
        }
        out
    }

    pub async fn list_windows_on(&self, server_name: &str) -> Vec<WindowUri> {
        match self.active.read().await.get(server_name) {
            Some(server) => server.client.list_windows().await,
            None => Vec::new(),
        }
    }
}

fn inject_tool_meta(tool: &mut ToolInfo, meta: &ToolMeta) {
    let original = tool.annotations.take();
    let mut obj = serde_json::Map::new();
    obj.insert(A2C_TOOL_META.to_string(), serde_json::to_value(meta).unwrap_or(serde_json::Value::Null));
    if let Some(original) = original {
        obj.insert(MCP_TOOL_ANNOTATION.to_string(), original);
    }
    tool.annotations = Some(serde_json::Value::Object(obj));
}

fn inject_outcome_meta(outcome: &mut CallToolOutcome, meta: &ToolMeta) {
    let mut map = match outcome.meta.take() {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert(A2C_TOOL_META.to_string(), serde_json::to_value(meta).unwrap_or(serde_json::Value::Null));
    if let Some(ret_meta) = &meta.ret_meta {
        if let serde_json::Value::Object(extra) = ret_meta {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }
    }
    outcome.meta = Some(serde_json::Value::Object(map));
}

pub struct ServerStatusQuery<'a> {
    manager: &'a MCPServerManager,
}

impl ServerStatusQuery<'_> {
    pub async fn collect(&self) -> Vec<(String, bool, String)> {
        let configs = self.manager.servers_config.read().await;
        let active = self.manager.active.read().await;
        let mut out = Vec::new();
        for (name, _config) in configs.iter() {
            match active.get(name) {
                Some(server) => out.push((name.clone(), true, server.client.state().await.to_string())),
                None => out.push((name.clone(), false, "pending".to_string())),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_tool_meta_preserves_server_annotations() {
        let mut tool = ToolInfo {
            name: "t".to_string(),
            description: None,
            input_schema: serde_json::json!({}),
            output_schema: None,
            annotations: Some(serde_json::json!({"title": "Server Tool"})),
        };
        let meta = ToolMeta { auto_apply: Some(true), ..Default::default() };
        inject_tool_meta(&mut tool, &meta);

        let annotations = tool.annotations.expect("annotations");
        assert_eq!(annotations[MCP_TOOL_ANNOTATION], serde_json::json!({"title": "Server Tool"}));
        assert_eq!(annotations[A2C_TOOL_META]["auto_apply"], serde_json::json!(true));
    }

    #[test]
    fn inject_tool_meta_without_server_annotations_omits_the_key() {
        let mut tool = ToolInfo { name: "t".to_string(), description: None, input_schema: serde_json::json!({}), output_schema: None, annotations: None };
        inject_tool_meta(&mut tool, &ToolMeta::default());

        let annotations = tool.annotations.expect("annotations");
        assert!(annotations.get(MCP_TOOL_ANNOTATION).is_none());
    }
}
