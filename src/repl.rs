//! Interactive chat session.
//!
//! Holds the process open across many request/response exchanges. Each
//! exchange still runs synchronously to completion — classification,
//! assembly, the model call, and the context update — before the next
//! prompt is shown; no two model calls ever overlap. Responses stream to
//! the terminal fragment-by-fragment.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::classify::classify_mode;
use crate::gateway::ChatGateway;
use crate::handler::dispatch;
use crate::models::Mode;
use crate::store::ContextStore;

const PROMPT: &str = "ai> ";

/// Run the interactive loop until EOF or an exit word.
///
/// A gateway failure ends the current exchange with a printed error but
/// keeps the session alive; the caller persists the store once after the
/// loop returns.
pub async fn run_repl(
    gateway: &dyn ChatGateway,
    store: &mut ContextStore,
    forced_mode: Option<Mode>,
) -> Result<()> {
    let mut editor = DefaultEditor::new()?;

    println!("AI Terminal — interactive session (type 'exit' to quit)");

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit" | "q") {
            break;
        }

        let _ = editor.add_history_entry(input);

        let mode = forced_mode.unwrap_or_else(|| classify_mode(input, None));
        tracing::info!("Handling interactive input in {} mode", mode);

        match dispatch(mode, gateway, input, store, true).await {
            Ok(response) => {
                if !response.streamed {
                    println!("{}", response.text);
                }
                store.record_exchange(input, Some(&response.text), mode);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    println!("Bye.");
    Ok(())
}
