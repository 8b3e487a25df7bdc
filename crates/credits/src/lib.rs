//! `dc-credits`: credit balance and subscription-tier gate.
//!
//! [`CreditGate`] caches a user's [`CreditLedger`](dc_domain::credit::CreditLedger),
//! answers affordability and tier questions, and deducts optimistically.
//! [`spawn_reconciler`] keeps the cache in step with the remote ledger.

pub mod gate;
pub mod reconcile;

pub use gate::{CreditGate, CreditStatus, DeductOutcome};
pub use reconcile::spawn_reconciler;
