//! # Encryption Mappings
//!
//! Per-address send and receive keys, looked up for every packet in both
//! directions.
//!
//! ## Features
//! - **Fixed capacity**: the table is allocated once; lookups never allocate
//! - **Idle expiry**: a mapping not used for longer than the timeout is treated
//!   as absent and evicted lazily, on the lookup that notices it
//! - **Overwrite on duplicate**: adding a mapping for an address that already
//!   has one replaces its keys, so a reconnecting peer never gets stuck behind
//!   a stale entry
//! - **Zeroized keys**: key material is wiped when a mapping is dropped
//!
//! Time is the transport's logical time in seconds, supplied by the caller.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, trace};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::utils::crypto::Key;

/// Keys for one remote address
#[derive(Zeroize, ZeroizeOnDrop)]
struct EncryptionEntry {
    send_key: Key,
    receive_key: Key,
    #[zeroize(skip)]
    last_access_time: f64,
}

impl EncryptionEntry {
    #[inline]
    fn is_expired(&self, now: f64, timeout: f64) -> bool {
        now - self.last_access_time > timeout
    }
}

/// Fixed-capacity, time-aware directory of per-address keys
pub struct EncryptionManager {
    entries: HashMap<SocketAddr, EncryptionEntry>,
    max_entries: usize,
    timeout: f64,
}

impl EncryptionManager {
    /// Create a directory holding at most `max_entries` live mappings
    pub fn new(max_entries: usize, timeout: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries),
            max_entries,
            timeout: timeout.as_secs_f64(),
        }
    }

    /// Map `address` to a key pair at time `now`.
    ///
    /// Returns false only when the directory is full of live mappings.
    pub fn add_encryption_mapping(
        &mut self,
        address: SocketAddr,
        send_key: &Key,
        receive_key: &Key,
        now: f64,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.send_key = *send_key;
            entry.receive_key = *receive_key;
            entry.last_access_time = now;
            debug!(%address, "Encryption mapping replaced");
            return true;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_expired(now);
            if self.entries.len() >= self.max_entries {
                debug!(%address, max = self.max_entries, "Encryption mapping table full");
                return false;
            }
        }

        self.entries.insert(
            address,
            EncryptionEntry {
                send_key: *send_key,
                receive_key: *receive_key,
                last_access_time: now,
            },
        );
        trace!(%address, mappings = self.entries.len(), "Encryption mapping added");
        true
    }

    /// Remove the mapping for `address`; false if none is live
    pub fn remove_encryption_mapping(&mut self, address: &SocketAddr, now: f64) -> bool {
        match self.entries.remove(address) {
            Some(entry) if !entry.is_expired(now, self.timeout) => {
                trace!(%address, "Encryption mapping removed");
                true
            }
            Some(_) => {
                debug!(%address, "Removed encryption mapping had already expired");
                false
            }
            None => false,
        }
    }

    /// Drop every mapping
    pub fn reset_encryption_mappings(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            debug!(cleared_count = count, "Encryption mappings reset");
        }
    }

    /// Send key for `address`, refreshing its access time
    pub fn send_key(&mut self, address: &SocketAddr, now: f64) -> Option<&Key> {
        self.touch(address, now).map(|entry| &entry.send_key)
    }

    /// Receive key for `address`, refreshing its access time
    pub fn receive_key(&mut self, address: &SocketAddr, now: f64) -> Option<&Key> {
        self.touch(address, now).map(|entry| &entry.receive_key)
    }

    /// Number of stored mappings, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    fn touch(&mut self, address: &SocketAddr, now: f64) -> Option<&EncryptionEntry> {
        let expired = self.entries.get(address)?.is_expired(now, self.timeout);
        if expired {
            self.entries.remove(address);
            debug!(%address, "Encryption mapping expired");
            return None;
        }

        let entry = self.entries.get_mut(address)?;
        entry.last_access_time = now;
        Some(entry)
    }

    fn evict_expired(&mut self, now: f64) {
        let before = self.entries.len();
        let timeout = self.timeout;
        self.entries.retain(|_, entry| !entry.is_expired(now, timeout));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(
                removed_count = removed,
                remaining_count = self.entries.len(),
                "Expired encryption mappings evicted"
            );
        }
    }
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("mappings", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("timeout", &self.timeout)
            .finish()
    }
}
