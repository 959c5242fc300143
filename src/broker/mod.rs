//! The pub/sub core (SPEC_FULL.md ยง4.1).
//!
//! `Broker` is a cheap, `Clone`-able handle around a reference-counted inner
//! state (`Arc<BrokerInner>`); cloning is the Rust-native "inc-ref" and the
//! last `Drop` is "dec-ref reaches zero, destroy the broker" โ there is no
//! separate counter to manage by hand.

pub mod error;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

pub use error::BrokerError;
use types::{Frame, ModuleRecord};

use crate::message::Message;
use crate::module::NativeModule;
use crate::util::{ModuleTag, QuitToken};

/// Broadcast channel capacity: bounds how far a slow worker may lag behind
/// the publish stream before frames are dropped for it (SPEC_FULL.md ยง4.1,
/// "Failure semantics").
const PUBLISH_CHANNEL_CAPACITY: usize = 1024;

struct BrokerInner {
    modules: parking_lot::RwLock<HashMap<String, Arc<ModuleRecord>>>,
    tx: broadcast::Sender<Frame>,
}

/// Handle to the message broker. Clone to inc-ref; drop the last clone to
/// dec-ref to zero and tear the broker down.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Create a new broker with refcount 1.
    pub fn create() -> Self {
        let (tx, _rx) = broadcast::channel(PUBLISH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BrokerInner {
                modules: parking_lot::RwLock::new(HashMap::new()),
                tx,
            }),
        }
    }

    /// Attach `instance` under `name` with the tag reserved for it
    /// (`ModuleTag::next()`), spawning its dedicated worker task.
    pub fn add_module(
        &self,
        name: impl Into<String>,
        tag: ModuleTag,
        instance: Box<dyn NativeModule>,
    ) -> Result<(), BrokerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument);
        }

        let mut modules = self.inner.modules.write();
        if modules.contains_key(&name) {
            return Err(BrokerError::Duplicate(name));
        }

        let filter = Arc::new(parking_lot::RwLock::new(HashSet::new()));
        let quit_token = QuitToken::new();
        let state = Arc::new(AsyncMutex::new(instance));
        let rx = self.inner.tx.subscribe();

        let worker = tokio::spawn(run_worker(
            name.clone(),
            tag,
            quit_token,
            Arc::clone(&filter),
            Arc::clone(&state),
            rx,
        ));

        modules.insert(
            name.clone(),
            Arc::new(ModuleRecord {
                name,
                tag,
                filter,
                quit_token,
                state,
                worker: parking_lot::Mutex::new(Some(worker)),
            }),
        );
        Ok(())
    }

    /// Detach the module named `name`: send its quit token, abort its
    /// worker as a fallback, and await the join (SPEC_FULL.md ยง4.1,
    /// "Shutdown handshake").
    pub async fn remove_module(&self, name: &str) -> Result<(), BrokerError> {
        let record = {
            let mut modules = self.inner.modules.write();
            modules
                .remove(name)
                .ok_or_else(|| BrokerError::NotFound(name.to_string()))?
        };

        let _ = self.inner.tx.send(Frame::Quit(record.quit_token));

        let handle = record.worker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(module = %record.name, error = %err, "broker worker task panicked");
                }
            }
        }
        record.state.lock().await.destroy().await;
        debug!(module = %record.name, "module detached from broker");
        Ok(())
    }

    /// Subscribe `sink` to `source`'s publications.
    pub fn add_link(&self, source: &str, sink: &str) -> Result<(), BrokerError> {
        let modules = self.inner.modules.read();
        let source_tag = modules
            .get(source)
            .ok_or_else(|| BrokerError::NotFound(source.to_string()))?
            .tag;
        let sink_record = modules
            .get(sink)
            .ok_or_else(|| BrokerError::NotFound(sink.to_string()))?;

        let mut filter = sink_record.filter.write();
        if !filter.insert(source_tag) {
            return Err(BrokerError::DuplicateLink(
                source.to_string(),
                sink.to_string(),
            ));
        }
        Ok(())
    }

    /// Unsubscribe `sink` from `source`'s publications.
    pub fn remove_link(&self, source: &str, sink: &str) -> Result<(), BrokerError> {
        let modules = self.inner.modules.read();
        let source_tag = modules
            .get(source)
            .ok_or_else(|| BrokerError::NotFound(source.to_string()))?
            .tag;
        let sink_record = modules
            .get(sink)
            .ok_or_else(|| BrokerError::NotFound(sink.to_string()))?;

        let mut filter = sink_record.filter.write();
        if !filter.remove(&source_tag) {
            return Err(BrokerError::LinkNotFound(
                source.to_string(),
                sink.to_string(),
            ));
        }
        Ok(())
    }

    /// Publish `message` on behalf of `source` (SPEC_FULL.md ยง4.1, "Publish
    /// path"). A publish with no attached modules at all is not an error:
    /// there is simply no one it could have been lost from.
    pub fn publish(&self, source: ModuleTag, message: Message) -> Result<(), BrokerError> {
        let bytes: Arc<[u8]> = Arc::from(message.to_bytes());
        match self.inner.tx.send(Frame::Publish { source, bytes }) {
            Ok(_) | Err(_) => Ok(()),
        }
    }

    /// Resolve a module's tag by name, used by the topology manager when
    /// wiring wildcard-source links.
    pub fn tag_of(&self, name: &str) -> Option<ModuleTag> {
        self.inner.modules.read().get(name).map(|r| r.tag)
    }

    /// Names of every currently attached module.
    pub fn module_names(&self) -> Vec<String> {
        self.inner.modules.read().keys().cloned().collect()
    }

    /// Invoke the `start` hook on the named module, if attached.
    pub async fn start_module(&self, name: &str) -> Result<(), BrokerError> {
        let record = {
            let modules = self.inner.modules.read();
            modules
                .get(name)
                .cloned()
                .ok_or_else(|| BrokerError::NotFound(name.to_string()))?
        };
        record.state.lock().await.start().await;
        Ok(())
    }
}

async fn run_worker(
    name: String,
    tag: ModuleTag,
    quit_token: QuitToken,
    filter: Arc<parking_lot::RwLock<HashSet<ModuleTag>>>,
    state: Arc<AsyncMutex<Box<dyn NativeModule>>>,
    mut rx: broadcast::Receiver<Frame>,
) {
    trace!(module = %name, tag = %tag, "broker worker started");
    loop {
        let frame = match rx.recv().await {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(module = %name, skipped, "worker lagged behind the publish stream");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match frame {
            Frame::Quit(token) if token == quit_token => break,
            Frame::Quit(_) => continue,
            Frame::Publish { source, bytes } => {
                if !filter.read().contains(&source) {
                    continue;
                }
                match Message::from_bytes(&bytes) {
                    Ok(message) => state.lock().await.receive(message).await,
                    Err(err) => warn!(module = %name, error = %err, "dropped malformed frame"),
                }
            }
        }
    }
    trace!(module = %name, "broker worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        received: Arc<StdMutex<Vec<Message>>>,
    }

    #[async_trait]
    impl NativeModule for Recorder {
        async fn receive(&mut self, message: Message) {
            self.received.lock().expect("lock").push(message);
        }
    }

    fn attach(broker: &Broker, name: &str) -> (ModuleTag, Arc<StdMutex<Vec<Message>>>) {
        let tag = ModuleTag::next();
        let received = Arc::new(StdMutex::new(Vec::new()));
        broker
            .add_module(name, tag, Box::new(Recorder { received: received.clone() }))
            .expect("add_module");
        (tag, received)
    }

    #[tokio::test]
    async fn single_echo_delivers_exactly_once() {
        let broker = Broker::create();
        let (a_tag, _a_recv) = attach(&broker, "A");
        let (_b_tag, b_recv) = attach(&broker, "B");
        broker.add_link("A", "B").expect("add_link");

        broker
            .publish(a_tag, Message::new(vec![1, 2]))
            .expect("publish");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(b_recv.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unlinked_source_is_not_delivered() {
        let broker = Broker::create();
        let (_a_tag, _a_recv) = attach(&broker, "A");
        let (b_tag, b_recv) = attach(&broker, "B");

        broker.publish(b_tag, Message::new(vec![9])).expect("publish");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(b_recv.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn duplicate_module_name_rejected() {
        let broker = Broker::create();
        attach(&broker, "A");
        let tag = ModuleTag::next();
        let err = broker
            .add_module(
                "A",
                tag,
                Box::new(Recorder {
                    received: Arc::new(StdMutex::new(Vec::new())),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, BrokerError::Duplicate(_)));
    }

    #[tokio::test]
    async fn duplicate_link_rejected_and_single_subscription_remains() {
        let broker = Broker::create();
        attach(&broker, "A");
        attach(&broker, "B");
        broker.add_link("A", "B").expect("first add_link");
        let err = broker.add_link("A", "B").unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateLink(_, _)));
    }

    #[tokio::test]
    async fn remove_module_stops_delivery() {
        let broker = Broker::create();
        let (a_tag, _) = attach(&broker, "A");
        let (_b_tag, b_recv) = attach(&broker, "B");
        broker.add_link("A", "B").expect("add_link");

        broker.remove_module("B").await.expect("remove B");
        let _ = broker.publish(a_tag, Message::new(vec![1]));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(b_recv.lock().expect("lock").is_empty());
    }
}
