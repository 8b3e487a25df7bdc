//! `datachat extract`: print the code entries a markdown file yields.
//!
//! Runs entirely offline: no backend, no store.

use dc_canvas::CodeBlockExtractor;
use dc_domain::code::CodeEntry;
use dc_domain::config::Config;
use dc_domain::message::Message;

/// Extract entries from `source` the way the canvas would from a single
/// assistant message.
pub fn entries_for(config: &Config, source: &str) -> Vec<CodeEntry> {
    let extractor = CodeBlockExtractor::new(config.canvas.chart_language.clone());
    extractor
        .extract_latest(&[Message::assistant(source)])
        .map(|(_, entries)| entries)
        .unwrap_or_default()
}

pub fn run(config: &Config, file: &str, json_output: bool) -> anyhow::Result<()> {
    let source = super::read_source(file)?;
    let entries = entries_for(config, &source);

    if json_output {
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| anyhow::anyhow!("serializing entries: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("no code blocks found in {file}");
        return Ok(());
    }
    for entry in &entries {
        let runnable = if config.canvas.is_executable(&entry.language) {
            "runnable"
        } else {
            "display-only"
        };
        println!("── {} [{}] ({runnable}) ──", entry.title, entry.id);
        println!("{}", entry.code);
        println!();
    }
    Ok(())
}
