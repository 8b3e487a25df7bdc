//! Typed, scope-keyed store with TTLs.
//!
//! Values live in memory behind a `RwLock` and, when `store.path` is set,
//! are flushed to a single JSON file (write to a temp file, then rename).
//! Expired values are never returned; they are evicted lazily on read and
//! in bulk by [`SessionStore::prune_expired`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use dc_domain::config::StoreConfig;
use dc_domain::error::{Error, Result};

use crate::keys::StoreKey;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored value
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: serde_json::Value,
    stored_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    config: StoreConfig,
    path: Option<PathBuf>,
    /// `"{scope}/{key name}"` → value.
    values: RwLock<HashMap<String, StoredValue>>,
    dirty: AtomicBool,
}

impl SessionStore {
    /// Load the store from `config.path` (if set and present) or start empty.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let path = config.path.clone();
        let values = match &path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p).map_err(Error::Io)?;
                serde_json::from_str(&raw).unwrap_or_else(|e| {
                    tracing::warn!(
                        error = %e,
                        path = %p.display(),
                        "session store file unreadable, starting empty"
                    );
                    HashMap::new()
                })
            }
            _ => HashMap::new(),
        };

        if let Some(p) = &path {
            tracing::info!(
                values = values.len(),
                path = %p.display(),
                "session store loaded"
            );
        }

        Ok(Self {
            config,
            path,
            values: RwLock::new(values),
            dirty: AtomicBool::new(false),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self {
            config: StoreConfig {
                path: None,
                ..config
            },
            path: None,
            values: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store `value` under key `K` for `scope`, replacing any previous value.
    pub fn put<K: StoreKey>(&self, scope: &str, value: &K::Value) -> Result<()> {
        let now = Utc::now();
        let stored = StoredValue {
            value: serde_json::to_value(value)?,
            stored_at: now,
            expires_at: K::ttl(&self.config).map(|ttl| now + ttl),
        };
        self.values.write().insert(slot::<K>(scope), stored);
        self.mark_dirty();
        Ok(())
    }

    /// Read the live value for `K` in `scope`.  Expired or undecodable values
    /// are evicted and read as `None`.
    pub fn get<K: StoreKey>(&self, scope: &str) -> Option<K::Value> {
        let key = slot::<K>(scope);
        let now = Utc::now();
        {
            let values = self.values.read();
            match values.get(&key) {
                None => return None,
                Some(stored) if !stored.is_expired(now) => {
                    match serde_json::from_value(stored.value.clone()) {
                        Ok(v) => return Some(v),
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "dropping undecodable store value");
                        }
                    }
                }
                Some(_) => {}
            }
        }
        if self.values.write().remove(&key).is_some() {
            self.mark_dirty();
        }
        None
    }

    /// Read and remove.
    pub fn take<K: StoreKey>(&self, scope: &str) -> Option<K::Value> {
        let value = self.get::<K>(scope);
        self.remove::<K>(scope);
        value
    }

    pub fn remove<K: StoreKey>(&self, scope: &str) -> bool {
        let removed = self.values.write().remove(&slot::<K>(scope)).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Live values of `K` whose scope sits under `parent` (scopes of the
    /// form `"{parent}/{child}"`), keyed by child.
    pub fn list_under<K: StoreKey>(&self, parent: &str) -> Vec<(String, K::Value)> {
        let now = Utc::now();
        let values = self.values.read();
        values
            .iter()
            .filter(|(_, stored)| !stored.is_expired(now))
            .filter_map(|(key, stored)| {
                let child = child_scope::<K>(key, parent)?;
                let value = serde_json::from_value(stored.value.clone()).ok()?;
                Some((child.to_owned(), value))
            })
            .collect()
    }

    /// Drop every value of `K` scoped under `parent`.  Returns how many
    /// were removed.
    pub fn remove_under<K: StoreKey>(&self, parent: &str) -> usize {
        let mut values = self.values.write();
        let before = values.len();
        values.retain(|key, _| child_scope::<K>(key, parent).is_none());
        let removed = before - values.len();
        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    /// Evict every expired value.  Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut values = self.values.write();
        let before = values.len();
        values.retain(|_, v| !v.is_expired(now));
        let removed = before - values.len();
        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Persist to disk if a path is configured and something changed.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let json = {
            let values = self.values.read();
            serde_json::to_string_pretty(&*values)
                .map_err(|e| Error::Other(format!("serializing session store: {e}")))?
        };

        if let Err(e) = write_atomic(path, &json) {
            // Leave the store dirty so the next flush retries.
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

fn slot<K: StoreKey>(scope: &str) -> String {
    format!("{scope}/{}", K::NAME)
}

/// `child` when `key` is the slot of `K` for scope `"{parent}/{child}"`.
fn child_scope<'a, K: StoreKey>(key: &'a str, parent: &str) -> Option<&'a str> {
    let scope = key.strip_suffix(K::NAME)?.strip_suffix('/')?;
    let child = scope.strip_prefix(parent)?.strip_prefix('/')?;
    (!child.is_empty()).then_some(child)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(Error::Io)?;
    std::fs::rename(&tmp, path).map_err(Error::Io)?;
    Ok(())
}
