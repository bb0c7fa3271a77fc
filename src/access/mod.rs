//! The allow-list gate deciding who may use the service.
//!
//! Authentication proves an identity; this gate decides whether that
//! identity is welcome. The list lives in memory as an immutable snapshot
//! behind an atomic pointer: reads are lock-free, updates build a complete
//! replacement set and publish it in one swap. Readers observe either the
//! old set or the new one, never a mixture.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Process-wide, hot-swappable set of authorized addresses.
///
/// Absent entries are denied; a fresh gate authorizes nobody.
pub struct AccessGate {
    entries: ArcSwap<HashSet<String>>,
}

impl AccessGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// Case-insensitive lookup against the snapshot active at call time.
    #[must_use]
    pub fn is_authorized(&self, email: &str) -> bool {
        self.entries
            .load()
            .contains(&email.trim().to_lowercase())
    }

    /// Replace the whole list with a normalized snapshot of `addresses`.
    pub fn replace<I>(&self, addresses: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let snapshot: HashSet<String> = addresses
            .into_iter()
            .map(|address| address.as_ref().trim().to_lowercase())
            .filter(|address| !address.is_empty())
            .collect();
        info!(entries = snapshot.len(), "access list replaced");
        self.entries.store(Arc::new(snapshot));
    }

    /// Replace the list from a serialized JSON array of addresses.
    ///
    /// A payload that does not parse leaves the previous snapshot active and
    /// is only logged; a bad update must never lock everyone out or crash
    /// the process.
    pub fn replace_from_json(&self, raw: &str) {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(addresses) => self.replace(addresses),
            Err(err) => {
                error!("ignoring malformed access list update: {err}");
            }
        }
    }

    /// Replace the list from a JSON file on disk.
    ///
    /// Read failures behave like parse failures: logged, previous snapshot
    /// retained.
    pub fn replace_from_file(&self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(raw) => self.replace_from_json(&raw),
            Err(err) => {
                error!(path = %path.display(), "ignoring unreadable access list file: {err}");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new()
    }
}
