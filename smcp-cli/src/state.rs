//! Shared REPL state: the local [`Computer`] facade, the tracked input
//! definitions (the [`Resolver`] itself has no "list definitions" getter, so
//! the CLI is the source of truth for that list), and an optional attached
//! [`ComputerSocket`].

use std::sync::Arc;

use smcp_computer::Computer;
use smcp_inputs::InputDefinition;
use smcp_inputs::NullPrompter;
use smcp_inputs::Resolver;
use tokio::sync::Mutex;

use crate::socket::ComputerSocket;

pub struct AppState {
    pub computer: Arc<Computer>,
    pub resolver: Arc<Resolver>,
    pub definitions: Mutex<Vec<InputDefinition>>,
    pub socket: Mutex<Option<Arc<ComputerSocket>>>,
}

impl AppState {
    pub async fn new(computer_name: impl Into<String>) -> Self {
        let resolver = Arc::new(Resolver::new(Vec::new(), Arc::new(NullPrompter)));
        let computer = Arc::new(Computer::new(computer_name, Arc::clone(&resolver)));
        computer.install_notifications().await;
        Self { computer, resolver, definitions: Mutex::new(Vec::new()), socket: Mutex::new(None) }
    }

    pub async fn connected_socket(&self) -> anyhow::Result<Arc<ComputerSocket>> {
        self.socket.lock().await.clone().ok_or_else(|| anyhow::anyhow!("not connected; run `socket connect` first"))
    }
}
