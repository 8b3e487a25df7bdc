//! `datachat credits`: print the credit balance for the configured user.

use std::sync::Arc;

use dc_domain::config::Config;

use crate::bootstrap;
use crate::state::DEFAULT_SESSION;

pub async fn run(config: Arc<Config>, json_output: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config, DEFAULT_SESSION).await?;
    // Replays debits a previous run could only apply locally.
    state.credits.reconcile().await?;
    let status = state.credits.status();

    if json_output {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| anyhow::anyhow!("serializing credits: {e}"))?;
        println!("{json}");
    } else if status.unlimited {
        println!("{}: unlimited ({:?})", status.user_id, status.tier);
    } else {
        println!(
            "{}: {} of {} credits remaining ({:?})",
            status.user_id, status.remaining, status.total, status.tier
        );
        if let Some(reset) = status.reset_date {
            println!("resets {reset}");
        }
    }

    if let Err(e) = state.store.flush() {
        tracing::warn!(error = %e, "session store flush on exit failed");
    }
    Ok(())
}
