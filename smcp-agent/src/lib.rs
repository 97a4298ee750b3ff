//! The C8 Agent Client: a thin signaling-hub peer that enforces direction
//! rules locally and fans notifications out to user-registered handlers.

pub mod client;
pub mod error;
pub mod handlers;
pub mod pending;

pub use client::AgentClient;
pub use client::ToolCallOutcome;
pub use error::AgentError;
pub use handlers::AgentHandlers;
pub use handlers::NullHandlers;
