//! Internal broker bookkeeping types.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::module::NativeModule;
use crate::util::{ModuleTag, QuitToken};

/// A frame carried on the single shared publish channel.
///
/// This is the Rust-native "shared publish socket": every attached module's
/// worker holds its own `broadcast::Receiver`, and filters frames itself by
/// `source` (SPEC_FULL.md ยง4.1, "Subscription model").
#[derive(Clone)]
pub enum Frame {
    Publish { source: ModuleTag, bytes: Arc<[u8]> },
    /// Sentinel used to unblock exactly one worker's receive loop
    /// (SPEC_FULL.md ยง4.1, "Shutdown handshake"). Every worker sees every
    /// quit frame and ignores those whose token isn't its own.
    Quit(QuitToken),
}

/// Bookkeeping the broker keeps for one attached module.
pub(crate) struct ModuleRecord {
    pub name: String,
    pub tag: ModuleTag,
    /// Exact-match set of source tags this module is subscribed to
    /// (SPEC_FULL.md ยง4.1, "Subscription model"). Mutated under the
    /// broker's modules lock; read by the worker task on every frame.
    pub filter: Arc<SyncRwLock<HashSet<ModuleTag>>>,
    pub quit_token: QuitToken,
    pub state: Arc<AsyncMutex<Box<dyn NativeModule>>>,
    pub worker: SyncMutex<Option<JoinHandle<()>>>,
}
