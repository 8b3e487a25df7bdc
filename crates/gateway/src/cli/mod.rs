pub mod config;
pub mod credits;
pub mod extract;
pub mod run;

use clap::{Parser, Subcommand};

use dc_domain::config::Config;

/// DataChat: code canvas and execution gateway for the chat UI.
#[derive(Debug, Parser)]
#[command(name = "datachat", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/SSE server (default when no subcommand is given).
    Serve,
    /// Print the code entries a markdown file yields.
    Extract {
        /// Markdown file to read ("-" for stdin).
        file: String,
        /// Output the entries as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Extract the code in a markdown file and execute it once.
    Run {
        /// Markdown file to read ("-" for stdin).
        file: String,
        /// Session id sent to the execution backend.
        #[arg(long, default_value = "cli:run")]
        session: String,
        /// Output the outputs as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print the current credit balance.
    Credits {
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `DC_CONFIG` (or
/// `datachat.toml` by default).  A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("DC_CONFIG").unwrap_or_else(|_| "datachat.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}

/// Read a markdown source named on the command line.
pub fn read_source(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| anyhow::anyhow!("reading stdin: {e}"))?;
        return Ok(buf);
    }
    std::fs::read_to_string(file).map_err(|e| anyhow::anyhow!("reading {file}: {e}"))
}
