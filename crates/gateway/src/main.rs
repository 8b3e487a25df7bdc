use std::sync::Arc;

use clap::Parser;

use dc_gateway::bootstrap;
use dc_gateway::cli::{self, Cli, Command, ConfigCommand};
use dc_gateway::state::DEFAULT_SESSION;
use dc_gateway::telemetry::Telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand means serve.
        None | Some(Command::Serve) => {
            let (config, config_path) = cli::load_config()?;
            let telemetry = Telemetry::for_server(&config);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %config_path,
                "DataChat starting"
            );
            let state = bootstrap::build_app_state(Arc::new(config), DEFAULT_SESSION).await?;
            bootstrap::spawn_background_tasks(&state);
            dc_gateway::server::serve(state, telemetry).await
        }
        Some(Command::Extract { file, json }) => {
            let _telemetry = Telemetry::for_cli();
            let (config, _) = cli::load_config()?;
            cli::extract::run(&config, &file, json)
        }
        Some(Command::Run { file, session, json }) => {
            let _telemetry = Telemetry::for_cli();
            let (config, _) = cli::load_config()?;
            if !cli::run::run(Arc::new(config), file, session, json).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Credits { json }) => {
            let _telemetry = Telemetry::for_cli();
            let (config, _) = cli::load_config()?;
            cli::credits::run(Arc::new(config), json).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("datachat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
