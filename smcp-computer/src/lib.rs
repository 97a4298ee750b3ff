//! MCP client manager, desktop aggregation, and the Computer facade that
//! ties them together with the input resolver.

pub mod config;
pub mod desktop;
pub mod facade;
pub mod manager;
pub mod vrl_transform;

pub use config::expand_vars;
pub use config::load_servers_from_toml;
pub use config::ConfigError;
pub use config::ServerConfig;
pub use config::ToolMeta;
pub use desktop::organize_desktop;
pub use desktop::HistoryEntry;
pub use facade::AlwaysConfirm;
pub use facade::Computer;
pub use facade::ConfirmCallback;
pub use facade::DesktopNotifier;
pub use manager::MCPServerManager;
pub use manager::ManagerError;
pub use vrl_transform::CompiledVrl;
pub use vrl_transform::VrlError;
