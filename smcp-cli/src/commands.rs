//! REPL command grammar and dispatch. Each line typed at the prompt is
//! tokenized (honoring quotes) and parsed as a [`ReplArgs`] with `clap`'s
//! derive API in no-binary-name mode, the same way a subcommand-driven CLI
//! parses `std::env::args()` — just fed from readline instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use smcp_computer::Computer;
use smcp_computer::ServerConfig;
use smcp_inputs::InputDefinition;
use smcp_window_uri::WindowUri;

use crate::args::parse_json_arg;
use crate::socket::ComputerSocket;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "", no_binary_name = true, disable_help_flag = true)]
pub struct ReplArgs {
    #[command(subcommand)]
    pub cmd: ReplCommand,
}

#[derive(Subcommand, Debug)]
#[command(disable_help_subcommand = true)]
pub enum ReplCommand {
    /// Manage configured MCP servers.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Starts one server by name, or every configured server if `target` is "all".
    Start { target: String },
    /// Stops one server by name, or every active server if `target` is "all".
    Stop { target: String },
    /// Shows each configured server's live connection state.
    Status,
    /// Lists every tool visible across active servers.
    Tools,
    /// Lists configured MCP servers and their transport.
    Mcp,
    /// Manage `${input:ID}` definitions and their cached answers.
    Inputs {
        #[command(subcommand)]
        action: InputsAction,
    },
    /// Manage the signaling-hub WebSocket connection.
    Socket {
        #[command(subcommand)]
        action: SocketAction,
    },
    /// Broadcasts `server:update_config` to the current office.
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
    /// Executes a local tool call: `{"tool": "...", "params": {...}, "timeout": secs}`.
    Tc { payload: String },
    /// Renders `${input:ID}` placeholders through a JSON config tree.
    Render { payload: String },
    /// Shows the server-touch history the desktop aggregator uses for ordering.
    History,
    /// Shows the current desktop view.
    Desktop {
        size: Option<usize>,
        window: Option<String>,
    },
    /// Prints the command summary.
    Help,
    /// Exits the shell.
    Exit,
}

#[derive(Subcommand, Debug)]
pub enum ServerAction {
    Add { payload: String },
    Rm { name: String },
    /// Loads `[[server]]` entries from a TOML file, expanding `${VAR}` /
    /// `${VAR:-default}` against the process environment first.
    Load { path: String },
}

#[derive(Subcommand, Debug)]
pub enum InputsAction {
    Add { payload: String },
    Update { payload: String },
    Rm { id: String },
    Get { id: String },
    List,
    Load { path: String },
    Value {
        #[command(subcommand)]
        action: InputsValueAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum InputsValueAction {
    Set { id: String, payload: String },
    Get { id: String },
    Rm { id: String },
    Clear,
    List,
}

#[derive(Subcommand, Debug)]
pub enum SocketAction {
    Connect {
        url: Option<String>,
        auth: Option<String>,
        headers: Option<String>,
    },
    Join { office: String, name: String },
    Leave,
}

#[derive(Subcommand, Debug)]
pub enum NotifyAction {
    Update,
}

const DEFAULT_URL: &str = "ws://127.0.0.1:8000/socket.io";

/// Runs one already-parsed command. Returns `Ok(true)` when the shell should
/// keep looping, `Ok(false)` when `exit` was invoked.
pub async fn dispatch(state: &Arc<AppState>, cmd: ReplCommand) -> Result<bool> {
    match cmd {
        ReplCommand::Server { action } => run_server(state, action).await?,
        ReplCommand::Start { target } => run_start(state, &target).await?,
        ReplCommand::Stop { target } => run_stop(state, &target).await?,
        ReplCommand::Status => run_status(&state.computer).await,
        ReplCommand::Tools => run_tools(&state.computer).await,
        ReplCommand::Mcp => run_mcp(&state.computer).await,
        ReplCommand::Inputs { action } => run_inputs(state, action).await?,
        ReplCommand::Socket { action } => run_socket(state, action).await?,
        ReplCommand::Notify { action: NotifyAction::Update } => run_notify_update(state).await?,
        ReplCommand::Tc { payload } => run_tc(&state.computer, &payload).await?,
        ReplCommand::Render { payload } => run_render(state, &payload).await?,
        ReplCommand::History => run_history(&state.computer).await,
        ReplCommand::Desktop { size, window } => run_desktop(&state.computer, size, window).await,
        ReplCommand::Help => println!("{}", help_text()),
        ReplCommand::Exit => return Ok(false),
    }
    Ok(true)
}

async fn run_server(state: &Arc<AppState>, action: ServerAction) -> Result<()> {
    match action {
        ServerAction::Add { payload } => {
            let config: ServerConfig = serde_json::from_value(parse_json_arg(&payload)?).context("parsing server config")?;
            state.computer.add_or_update_server(config).await?;
            println!("server added");
        }
        ServerAction::Rm { name } => {
            state.computer.remove_server(&name).await?;
            println!("server {name} removed");
        }
        ServerAction::Load { path } => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let servers = smcp_computer::load_servers_from_toml(&text, &path)?;
            let count = servers.len();
            for config in servers {
                state.computer.add_or_update_server(config).await?;
            }
            println!("loaded {count} server(s) from {path}");
        }
    }
    Ok(())
}

async fn run_start(state: &Arc<AppState>, target: &str) -> Result<()> {
    if target.eq_ignore_ascii_case("all") {
        state.computer.manager().start_all().await?;
    } else {
        state.computer.manager().start_client(target).await?;
    }
    println!("started {target}");
    Ok(())
}

async fn run_stop(state: &Arc<AppState>, target: &str) -> Result<()> {
    if target.eq_ignore_ascii_case("all") {
        for (name, active, _) in state.computer.server_status().await {
            if active {
                state.computer.manager().stop_client(&name).await?;
            }
        }
    } else {
        state.computer.manager().stop_client(target).await?;
    }
    println!("stopped {target}");
    Ok(())
}

async fn run_status(computer: &Computer) {
    for (name, active, detail) in computer.server_status().await {
        println!("{name}\t{}\t{detail}", if active { "active" } else { "inactive" });
    }
}

async fn run_tools(computer: &Computer) {
    for tool in computer.manager().available_tools().await {
        println!("{}\t{}", tool.name, tool.description.unwrap_or_default());
    }
}

async fn run_mcp(computer: &Computer) {
    for config in computer.manager().server_configs().await {
        println!(
            "{}\t{}\t{}",
            config.name,
            config.transport.type_name(),
            if config.disabled { "disabled" } else { "enabled" }
        );
    }
}

async fn run_inputs(state: &Arc<AppState>, action: InputsAction) -> Result<()> {
    match action {
        InputsAction::Add { payload } => {
            let def: InputDefinition = serde_json::from_value(parse_json_arg(&payload)?).context("parsing input definition")?;
            let mut defs = state.definitions.lock().await;
            defs.retain(|d| d.id() != def.id());
            defs.push(def);
            state.resolver.update_definitions(defs.clone()).await;
            println!("input added");
        }
        InputsAction::Update { payload } => {
            let def: InputDefinition = serde_json::from_value(parse_json_arg(&payload)?).context("parsing input definition")?;
            let mut defs = state.definitions.lock().await;
            defs.retain(|d| d.id() != def.id());
            defs.push(def);
            state.resolver.update_definitions(defs.clone()).await;
            println!("input updated");
        }
        InputsAction::Rm { id } => {
            let mut defs = state.definitions.lock().await;
            defs.retain(|d| d.id() != id.as_str());
            state.resolver.update_definitions(defs.clone()).await;
            println!("input {id} removed");
        }
        InputsAction::Get { id } => {
            let defs = state.definitions.lock().await;
            match defs.iter().find(|d| d.id() == id.as_str()) {
                Some(def) => println!("{}", serde_json::to_string_pretty(def).unwrap_or_default()),
                None => println!("no input definition with id `{id}`"),
            }
        }
        InputsAction::List => {
            let defs = state.definitions.lock().await;
            for def in defs.iter() {
                println!("{}", def.id());
            }
        }
        InputsAction::Load { path } => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let loaded: Vec<InputDefinition> = serde_json::from_str(&text).context("parsing input definitions file")?;
            let mut defs = state.definitions.lock().await;
            *defs = loaded;
            state.resolver.update_definitions(defs.clone()).await;
            println!("loaded {} input definitions", defs.len());
        }
        InputsAction::Value { action } => run_inputs_value(state, action).await?,
    }
    Ok(())
}

async fn run_inputs_value(state: &Arc<AppState>, action: InputsValueAction) -> Result<()> {
    match action {
        InputsValueAction::Set { id, payload } => {
            let value = parse_json_arg(&payload)?;
            state.resolver.set_cached(&id, value).await;
            println!("cached value for `{id}` set");
        }
        InputsValueAction::Get { id } => match state.resolver.get_cached(&id).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
            None => println!("no cached value for `{id}`"),
        },
        InputsValueAction::Rm { id } => {
            state.resolver.invalidate(&id).await;
            println!("invalidated `{id}`");
        }
        InputsValueAction::Clear => {
            state.resolver.invalidate_all().await;
            println!("cache cleared");
        }
        InputsValueAction::List => {
            for id in state.resolver.cached_ids().await {
                println!("{id}");
            }
        }
    }
    Ok(())
}

async fn run_socket(state: &Arc<AppState>, action: SocketAction) -> Result<()> {
    match action {
        SocketAction::Connect { url, auth, headers } => {
            if state.socket.lock().await.is_some() {
                anyhow::bail!("already connected; run `socket leave` and reconnect if you need a new session");
            }
            let url = url.unwrap_or_else(|| DEFAULT_URL.to_string());
            let headers = headers.as_deref().map(parse_json_arg).transpose()?;
            let socket = ComputerSocket::connect(&url, auth.as_deref(), headers.as_ref(), Arc::clone(&state.computer)).await?;
            state.computer.attach_notifier(Arc::downgrade(&socket)).await;
            *state.socket.lock().await = Some(socket);
            println!("connected to {url}");
        }
        SocketAction::Join { office, name } => {
            let socket = state.connected_socket().await?;
            socket.join_office(&office, &name).await?;
            println!("joined office {office} as {name}");
        }
        SocketAction::Leave => {
            let socket = state.connected_socket().await?;
            if let Some(office) = socket.office_id().await {
                socket.leave_office(&office).await?;
            }
            println!("left office");
        }
    }
    Ok(())
}

async fn run_notify_update(state: &Arc<AppState>) -> Result<()> {
    let socket = state.connected_socket().await?;
    socket.notify_update_config().await?;
    println!("update_config notified");
    Ok(())
}

#[derive(serde::Deserialize)]
struct ToolCallPayload {
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default)]
    timeout: Option<f64>,
}

async fn run_tc(computer: &Computer, payload: &str) -> Result<()> {
    let req: ToolCallPayload = serde_json::from_value(parse_json_arg(payload)?).context("parsing tool-call payload")?;
    let timeout = req.timeout.map(Duration::from_secs_f64);
    let outcome = computer.execute_tool(&req.tool, req.params, None, timeout).await;
    println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());
    Ok(())
}

async fn run_render(state: &Arc<AppState>, payload: &str) -> Result<()> {
    let config = parse_json_arg(payload)?;
    let rendered = smcp_inputs::render(&config, &state.resolver, None).await;
    println!("{}", serde_json::to_string_pretty(&rendered).unwrap_or_default());
    Ok(())
}

async fn run_history(computer: &Computer) {
    for entry in computer.history().await {
        println!("{}", entry.server);
    }
}

async fn run_desktop(computer: &Computer, size: Option<usize>, window: Option<String>) {
    let uri = match window.as_deref().map(WindowUri::parse) {
        Some(Ok(uri)) => Some(uri.to_string()),
        Some(Err(e)) => {
            println!("invalid window URI: {e}");
            return;
        }
        None => None,
    };
    for line in computer.get_desktop(size, uri.as_deref()).await {
        println!("{line}");
    }
}

pub fn help_text() -> &'static str {
    "commands: server add|rm|load, start, stop, status, tools, mcp, inputs ..., \
socket connect|join|leave, notify update, tc, render, history, desktop, exit"
}
