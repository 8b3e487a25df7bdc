//! `datachat run`: one-shot extraction and execution.
//!
//! Extracts the code in a markdown file, executes every runnable entry once
//! against the configured backend and prints the outputs.  Useful for
//! scripting and for checking a backend end to end.

use std::sync::Arc;

use dc_domain::code::{ExecutionOutput, OutputKind};
use dc_domain::config::Config;
use dc_domain::message::Message;

use crate::bootstrap;

/// Returns `false` when any entry produced an error output or could not run.
pub async fn run(
    config: Arc<Config>,
    file: String,
    session_id: String,
    json_output: bool,
) -> anyhow::Result<bool> {
    let source = super::read_source(&file)?;

    // 1. Boot the runtime (without background tasks).
    let state = bootstrap::build_app_state(config.clone(), &session_id).await?;

    // 2. Put the file on the canvas without auto-running it.
    let entries = state.coordinator.extract(&[Message::assistant(source)]);
    if entries.is_empty() {
        eprintln!("no code blocks found in {file}");
        return Ok(true);
    }

    // 3. Execute each runnable entry in order.
    let mut passed = true;
    let mut collected: Vec<serde_json::Value> = Vec::new();
    for entry in &entries {
        if !config.canvas.is_executable(&entry.language) {
            if !json_output {
                eprintln!("skipping {} ({} is display-only)", entry.id, entry.language);
            }
            continue;
        }

        match state.coordinator.execute(&entry.id).await {
            Ok(outputs) => {
                passed &= !outputs.iter().any(ExecutionOutput::is_error);
                if json_output {
                    collected.push(serde_json::json!({
                        "entry_id": entry.id,
                        "run_state": state.coordinator.run_state(&entry.id),
                        "outputs": outputs,
                    }));
                } else {
                    print_outputs(&entry.title, &outputs);
                }
            }
            Err(e) => {
                passed = false;
                if json_output {
                    collected.push(serde_json::json!({
                        "entry_id": entry.id,
                        "error": e.to_string(),
                        "code": e.code(),
                    }));
                } else {
                    eprintln!("error: {}: {e}", entry.id);
                }
            }
        }
    }

    if json_output {
        let json = serde_json::to_string_pretty(&collected)
            .map_err(|e| anyhow::anyhow!("serializing outputs: {e}"))?;
        println!("{json}");
    }

    // 4. Flush the store before exit.
    if let Err(e) = state.store.flush() {
        tracing::warn!(error = %e, "session store flush on exit failed");
    }

    Ok(passed)
}

fn print_outputs(title: &str, outputs: &[ExecutionOutput]) {
    println!("── {title} ──");
    for out in outputs {
        match out.kind {
            OutputKind::Output => print!("{}", out.text().unwrap_or_default()),
            OutputKind::Error => eprintln!("{}", out.text().unwrap_or_default()),
            OutputKind::Chart => println!("[chart]"),
        }
    }
    println!();
}
