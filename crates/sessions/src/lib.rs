//! Session-scoped state for DataChat.
//!
//! A small typed key/value store: every key is a Rust type that fixes the
//! value type and the TTL, values are scoped by a string (a chat session id
//! or a user id), and the whole store can be persisted to one JSON file.
//! Components hand state to each other through the keys defined in
//! [`keys`] instead of sharing ad-hoc global caches.

pub mod keys;
pub mod store;

pub use keys::{
    pending_fix_scope, ActiveMessageKey, CreditSnapshotKey, PendingFix, PendingFixKey, StoreKey,
};
pub use store::SessionStore;
