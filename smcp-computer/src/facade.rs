//! The C6 Computer Facade: the single object an embedding application talks
//! to. Owns the manager and the input resolver, gates tool execution behind
//! an optional confirmation callback, and keeps a bounded call-history ring
//! buffer the desktop aggregator uses for server recency ordering.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use smcp_inputs::Resolver;
use smcp_mcp_client::CallToolOutcome;
use smcp_mcp_client::ContentBlock;
use smcp_mcp_client::ServerNotification;
use smcp_window_uri::WindowUri;

use crate::config::ServerConfig;
use crate::desktop::organize_desktop;
use crate::desktop::HistoryEntry;
use crate::manager::MCPServerManager;
use crate::manager::ManagerError;

const HISTORY_CAPACITY: usize = 10;

/// Notified when the facade's state changes in a way an attached signaling
/// client should relay to a room (`notify:update_tool_list`,
/// `notify:update_desktop`). Held as a [`Weak`] so the facade never keeps a
/// signaling client alive past its own lifetime.
pub trait DesktopNotifier: Send + Sync {
    fn tool_list_changed(&self);
    fn desktop_changed(&self);
}

/// Gates a tool call that is not marked `auto_apply`. Returning `false`
/// rejects the call with a structured error result rather than executing it.
#[async_trait]
pub trait ConfirmCallback: Send + Sync {
    async fn confirm(&self, tool_name: &str, params: &serde_json::Value) -> bool;
}

pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmCallback for AlwaysConfirm {
    async fn confirm(&self, _tool_name: &str, _params: &serde_json::Value) -> bool {
        true
    }
}

pub struct Computer {
    name: String,
    manager: Arc<MCPServerManager>,
    resolver: Arc<Resolver>,
    confirm: Arc<dyn ConfirmCallback>,
    notifier: RwLock<Option<Weak<dyn DesktopNotifier>>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    /// The window URIs seen on the last desktop-changed emission, compared
    /// against a freshly collected set to compute the "window-set delta"
    /// that gates a real `resource-list-changed`/`resource-updated`
    /// notification from firing a redundant desktop refresh.
    window_cache: Mutex<HashSet<String>>,
}

impl Computer {
    pub fn new(name: impl Into<String>, resolver: Arc<Resolver>) -> Self {
        Self {
            name: name.into(),
            manager: Arc::new(MCPServerManager::new()),
            resolver,
            confirm: Arc::new(AlwaysConfirm),
            notifier: RwLock::new(None),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            window_cache: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmCallback>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manager(&self) -> &Arc<MCPServerManager> {
        &self.manager
    }

    pub async fn attach_notifier(&self, notifier: Weak<dyn DesktopNotifier>) {
        *self.notifier.write().await = Some(notifier);
    }

    async fn notify_tool_list_changed(&self) {
        if let Some(notifier) = self.notifier.read().await.as_ref().and_then(Weak::upgrade) {
            notifier.tool_list_changed();
        }
    }

    async fn notify_desktop_changed(&self) {
        if let Some(notifier) = self.notifier.read().await.as_ref().and_then(Weak::upgrade) {
            notifier.desktop_changed();
        }
    }

    /// Installs the Manager-level notification relay (spec §4.4's
    /// "Notification fan-in"): real server-pushed notifications, not just
    /// this Computer's own mutating calls, now drive `tool_list_changed`/
    /// `desktop_changed`. Requires the caller to hold `self` in an `Arc`
    /// already, since the relay must outlive any single call and is only
    /// ever installed once, right after construction.
    pub async fn install_notifications(self: &Arc<Self>) {
        let computer = Arc::downgrade(self);
        self.manager.set_notification_handler(Arc::new(move |notification| {
            let Some(computer) = computer.upgrade() else { return };
            tokio::spawn(async move {
                computer.handle_server_notification(notification).await;
            });
        }));
    }

    async fn handle_server_notification(&self, notification: ServerNotification) {
        match notification {
            ServerNotification::ToolListChanged => self.notify_tool_list_changed().await,
            ServerNotification::ResourceListChanged => self.refresh_window_cache_and_notify().await,
            ServerNotification::ResourceUpdated { uri } => {
                if uri.parse::<WindowUri>().is_ok() {
                    self.refresh_window_cache_and_notify().await;
                }
            }
            // No desktop/tool-list surface reacts to prompts in this system.
            ServerNotification::PromptListChanged => {}
        }
    }

    /// Recomputes the current window-URI set across every active server and
    /// emits `desktop_changed` only if it differs from the cached set — the
    /// spec's window-set delta, so an unrelated resource push doesn't spam a
    /// refresh for a desktop that hasn't actually changed.
    async fn refresh_window_cache_and_notify(&self) {
        let windows = self.manager.windows_details(None).await;
        let current: HashSet<String> = windows.into_iter().map(|(_, uri, _)| uri).collect();

        let mut cache = self.window_cache.lock().await;
        if *cache == current {
            return;
        }
        *cache = current;
        drop(cache);
        self.notify_desktop_changed().await;
    }

    /// Registers and starts every configured server. A server that fails to
    /// start is logged and skipped rather than aborting the whole boot.
    pub async fn boot_up(&self, servers: Vec<ServerConfig>) {
        self.manager.initialize(servers).await;
        if let Err(e) = self.manager.start_all().await {
            warn!(computer = %self.name, error = %e, "one or more servers failed to start during boot");
        }
        self.notify_tool_list_changed().await;
    }

    pub async fn add_or_update_server(&self, config: ServerConfig) -> Result<(), ManagerError> {
        self.manager.add_or_update_server(config).await?;
        self.notify_tool_list_changed().await;
        Ok(())
    }

    pub async fn remove_server(&self, name: &str) -> Result<(), ManagerError> {
        self.manager.remove_server(name).await?;
        self.notify_tool_list_changed().await;
        Ok(())
    }

    /// Renders `${input:ID}` placeholders in a tool call's parameters before
    /// dispatch, then gates non-`auto_apply` tools behind the confirmation
    /// callback, then dispatches and records call history.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        auto_apply_override: Option<bool>,
        timeout: Option<Duration>,
    ) -> CallToolOutcome {
        let rendered = smcp_inputs::render(&params, &self.resolver, None).await;

        let needs_confirm = !auto_apply_override.unwrap_or(false);
        if needs_confirm && !self.confirm.confirm(tool_name, &rendered).await {
            return error_outcome(format!("tool call to '{tool_name}' was not confirmed"));
        }

        match self.manager.execute_tool(tool_name, rendered, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(computer = %self.name, tool = %tool_name, error = %e, "tool execution failed");
                error_outcome(e.to_string())
            }
        }
    }

    /// Collects and organizes the current desktop view. Records the touched
    /// servers into the bounded call-history ring buffer so subsequent
    /// `get_desktop` calls favor recently active servers.
    pub async fn get_desktop(&self, size: Option<usize>, window_uri: Option<&str>) -> Vec<String> {
        let windows = self.manager.windows_details(window_uri).await;
        let touched: Vec<String> = windows.iter().map(|(server, _, _)| server.clone()).collect();

        let history_snapshot = {
            let mut history = self.history.lock().await;
            for server in touched {
                if history.len() == HISTORY_CAPACITY {
                    history.pop_front();
                }
                history.push_back(HistoryEntry { server });
            }
            history.iter().cloned().collect::<Vec<_>>()
        };

        organize_desktop(windows, size, &history_snapshot).await
    }

    pub async fn server_status(&self) -> Vec<(String, bool, String)> {
        self.manager.server_status().collect().await
    }

    /// The recency-ordered server touch history the desktop aggregator uses,
    /// most recent last.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.iter().cloned().collect()
    }
}

fn error_outcome(message: String) -> CallToolOutcome {
    info!(error = %message, "returning structured tool-call error");
    CallToolOutcome { content: vec![ContentBlock::Text { text: message }], is_error: true, meta: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    #[async_trait]
    impl ConfirmCallback for DenyAll {
        async fn confirm(&self, _tool_name: &str, _params: &serde_json::Value) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn unconfirmed_tool_call_returns_structured_error() {
        let resolver = Arc::new(Resolver::new(vec![], Arc::new(smcp_inputs::NullPrompter)));
        let computer = Computer::new("test", resolver).with_confirm(Arc::new(DenyAll));
        let outcome = computer.execute_tool("anything", serde_json::json!({}), None, None).await;
        assert!(outcome.is_error);
    }

    #[tokio::test]
    async fn desktop_with_no_servers_is_empty() {
        let resolver = Arc::new(Resolver::new(vec![], Arc::new(smcp_inputs::NullPrompter)));
        let computer = Computer::new("test", resolver);
        let desktop = computer.get_desktop(None, None).await;
        assert!(desktop.is_empty());
    }

    struct RecordingNotifier {
        tool_list: std::sync::atomic::AtomicUsize,
        desktop: std::sync::atomic::AtomicUsize,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self { tool_list: std::sync::atomic::AtomicUsize::new(0), desktop: std::sync::atomic::AtomicUsize::new(0) }
        }
    }

    impl DesktopNotifier for RecordingNotifier {
        fn tool_list_changed(&self) {
            self.tool_list.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        fn desktop_changed(&self) {
            self.desktop.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn tool_list_changed_notification_is_relayed_upstream() {
        let resolver = Arc::new(Resolver::new(vec![], Arc::new(smcp_inputs::NullPrompter)));
        let computer = Arc::new(Computer::new("test", resolver));
        computer.install_notifications().await;

        let notifier = Arc::new(RecordingNotifier::new());
        let dyn_notifier: Arc<dyn DesktopNotifier> = notifier.clone();
        computer.attach_notifier(Arc::downgrade(&dyn_notifier)).await;

        computer.handle_server_notification(ServerNotification::ToolListChanged).await;
        assert_eq!(notifier.tool_list.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(notifier.desktop.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resource_updated_on_non_window_uri_is_ignored() {
        let resolver = Arc::new(Resolver::new(vec![], Arc::new(smcp_inputs::NullPrompter)));
        let computer = Arc::new(Computer::new("test", resolver));
        let notifier = Arc::new(RecordingNotifier::new());
        let dyn_notifier: Arc<dyn DesktopNotifier> = notifier.clone();
        computer.attach_notifier(Arc::downgrade(&dyn_notifier)).await;

        computer
            .handle_server_notification(ServerNotification::ResourceUpdated { uri: "not-a-window-uri".to_string() })
            .await;
        assert_eq!(notifier.desktop.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resource_list_changed_with_no_servers_is_not_a_genuine_delta() {
        // With no active servers the collected window set is always empty,
        // matching the cache's initial state, so no desktop refresh fires.
        let resolver = Arc::new(Resolver::new(vec![], Arc::new(smcp_inputs::NullPrompter)));
        let computer = Arc::new(Computer::new("test", resolver));
        let notifier = Arc::new(RecordingNotifier::new());
        let dyn_notifier: Arc<dyn DesktopNotifier> = notifier.clone();
        computer.attach_notifier(Arc::downgrade(&dyn_notifier)).await;

        computer.handle_server_notification(ServerNotification::ResourceListChanged).await;
        assert_eq!(notifier.desktop.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
