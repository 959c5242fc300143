//! Identifiers used across the broker and topology manager.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, non-pointer identity of a publisher, carried as the topic prefix
/// on every published frame.
///
/// This is the Rust-native replacement for "prepending a raw pointer as a
/// topic prefix" (see SPEC_FULL.md ยง9): a monotonically increasing counter
/// assigned when a module record is attached to the broker, stable for the
/// life of that record and never a memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleTag(u64);

impl ModuleTag {
    /// Allocate the next tag from a process-wide monotonic counter.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag-{}", self.0)
    }
}

/// A per-worker random sentinel used to unblock a broker worker's receive
/// loop on shutdown (see SPEC_FULL.md ยง4.1, "Shutdown handshake").
///
/// Unique per module record: cross-module wake-ups are impossible because
/// no two records ever share a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuitToken([u8; 16]);

impl QuitToken {
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for QuitToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random local-IPC channel identifier, used when a configuration
/// entry omits `message.id` (SPEC_FULL.md ยง6).
pub fn random_channel_id() -> String {
    Uuid::new_v4().simple().to_string()
}
