use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::gate::CreditGate;

/// Reconcile `gate` against the remote ledger every `period`.
///
/// The first tick fires immediately, so a freshly started process loads its
/// balance without waiting a full period.  Failures are logged and retried on
/// the next tick.
pub fn spawn_reconciler(gate: Arc<CreditGate>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match gate.reconcile().await {
                Ok(ledger) => tracing::debug!(
                    user_id = %gate.user_id(),
                    remaining = ledger.remaining(),
                    "credits reconciled"
                ),
                Err(e) => tracing::warn!(
                    user_id = %gate.user_id(),
                    error = %e,
                    "credit reconciliation failed"
                ),
            }
        }
    })
}
