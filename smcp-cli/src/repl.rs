//! The interactive shell: a `rustyline` read loop feeding tokenized lines
//! through clap's derive parser, one [`ReplArgs`] at a time.

use std::sync::Arc;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;

use crate::args::tokenize;
use crate::commands::dispatch;
use crate::commands::help_text;
use crate::commands::ReplArgs;
use crate::state::AppState;

const PROMPT: &str = "smcp> ";

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("{}", help_text());

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                let tokens = match tokenize(line) {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        println!("error: {e}");
                        continue;
                    }
                };

                let args = match ReplArgs::try_parse_from(tokens) {
                    Ok(args) => args,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };

                match dispatch(&state, args.cmd).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "readline failed");
                break;
            }
        }
    }
    Ok(())
}
