//! Transactional module/link CRUD and the named event system
//! (SPEC_FULL.md ยง4.2, ยง4.5).

pub mod error;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

pub use error::TopologyError;
pub use types::{EventCallback, EventKind, ModuleHandle, ModuleInfo, TopologyEvent};

use crate::broker::Broker;
use crate::config::{GatewayConfig, LinkEntry, LoaderType, ModuleEntry};
use crate::module::{ModuleFactory, NativeModule, PublishHandle};
use crate::transport::{
    ipc_pair, ActivationType, OutOfProcessEntrypoint, OutOfProcessModule, TransportError,
};
use crate::util::ModuleTag;

/// The reserved sink name meaning "every currently- and future-attached
/// module" as a source (SPEC_FULL.md ยง4.2, "Wildcard-source links").
const WILDCARD_SOURCE: &str = "*";

struct LinkRecord {
    source: String,
    sink: String,
}

/// Owns one broker and every module/link built against it.
pub struct Topology {
    broker: Broker,
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
    loader_types: HashMap<String, LoaderType>,
    module_order: Vec<String>,
    modules: HashMap<String, ModuleTag>,
    links: Vec<LinkRecord>,
    supervisor: crate::transport::ChildSupervisor,
    events: HashMap<EventKind, Vec<EventCallback>>,
}

impl Topology {
    /// Build the broker-backed topology described by `config`, if any.
    ///
    /// `factories` supplies the `ModuleFactory` for every loader named with
    /// type `native-dynamic` in `config.loaders` (the Rust-native stand-in
    /// for "load the library, obtain the API table" — this crate has no
    /// dynamic-library loader of its own; see SPEC_FULL.md ยง9 note on
    /// `ModuleFactory`). Failure rolls back every module and link already
    /// built (SPEC_FULL.md ยง4.2, "Create is transactional").
    pub async fn create(
        broker: Broker,
        config: Option<GatewayConfig>,
        factories: HashMap<String, Arc<dyn ModuleFactory>>,
    ) -> Result<Self, TopologyError> {
        let loader_types = config
            .as_ref()
            .map(|c| {
                c.loaders
                    .iter()
                    .map(|l| (l.name.clone(), l.loader_type))
                    .collect()
            })
            .unwrap_or_default();

        let mut topology = Self {
            broker,
            factories,
            loader_types,
            module_order: Vec::new(),
            modules: HashMap::new(),
            links: Vec::new(),
            supervisor: crate::transport::ChildSupervisor::new(),
            events: HashMap::new(),
        };

        if let Some(config) = config {
            if let Err(err) = topology.apply(&config).await {
                topology.destroy().await;
                return Err(err);
            }
        }

        topology.emit(EventKind::Created, None, None);
        Ok(topology)
    }

    async fn apply(&mut self, config: &GatewayConfig) -> Result<(), TopologyError> {
        for entry in &config.modules {
            self.add_module(entry.clone()).await?;
        }
        for link in &config.links {
            self.add_link(link.clone()).await?;
        }
        Ok(())
    }

    /// Remove every link, then every module, continuing past individual
    /// failures (SPEC_FULL.md ยง4.2, "Destroy is best-effort").
    pub async fn destroy(mut self) {
        let link_names: Vec<(String, String)> = self
            .links
            .iter()
            .map(|l| (l.source.clone(), l.sink.clone()))
            .collect();
        for (source, sink) in link_names {
            if let Err(err) = self.remove_link_internal(&source, &sink) {
                error!(source = %source, sink = %sink, error = %err, "failed to remove link during shutdown");
            }
        }

        let names = self.module_order.clone();
        for name in names {
            if let Err(err) = self.broker.remove_module(&name).await {
                error!(module = %name, error = %err, "failed to remove module during shutdown");
            }
        }

        self.supervisor.shutdown().await;
        self.emit(EventKind::Destroyed, None, None);
    }

    /// Reject if a module with that name already exists, or the reserved
    /// name `"*"`. Attach the built instance to the broker and wire it into
    /// every existing wildcard-sink link (SPEC_FULL.md ยง4.2, "add-module").
    pub async fn add_module(&mut self, entry: ModuleEntry) -> Result<ModuleHandle, TopologyError> {
        if entry.name.is_empty() || entry.name == WILDCARD_SOURCE {
            return Err(TopologyError::InvalidArgument);
        }
        if self.modules.contains_key(&entry.name) {
            return Err(TopologyError::Duplicate(entry.name));
        }

        let loader_type = *self
            .loader_types
            .get(&entry.loader)
            .ok_or_else(|| TopologyError::NotFound(entry.loader.clone()))?;
        let tag = ModuleTag::next();
        let instance = self.build_instance(loader_type, &entry, tag).await?;

        self.broker.add_module(entry.name.clone(), tag, instance)?;
        self.modules.insert(entry.name.clone(), tag);
        self.module_order.push(entry.name.clone());

        // Fan the new module into every wildcard-source link already
        // present, excluding self-delivery (SPEC_FULL.md ยง4.2, decision on
        // the corpus's self-delivery ambiguity).
        let wildcard_sinks: Vec<String> = self
            .links
            .iter()
            .filter(|l| l.source == WILDCARD_SOURCE)
            .map(|l| l.sink.clone())
            .collect();
        for sink in wildcard_sinks {
            if sink != entry.name {
                self.broker.add_link(&entry.name, &sink)?;
            }
        }

        self.emit(EventKind::ModuleListChanged, Some(entry.name), None);
        Ok(ModuleHandle(tag))
    }

    async fn build_instance(
        &mut self,
        loader_type: LoaderType,
        entry: &ModuleEntry,
        tag: ModuleTag,
    ) -> Result<Box<dyn NativeModule>, TopologyError> {
        match loader_type {
            LoaderType::NativeDynamic => {
                let factory = Arc::clone(
                    self.factories
                        .get(&entry.loader)
                        .ok_or_else(|| TopologyError::NotFound(entry.loader.clone()))?,
                );
                let publish = PublishHandle::new(Arc::new(self.broker.clone()), tag);
                let args = serde_json::to_vec(&entry.args).unwrap_or_default();
                factory
                    .create(&args, publish)
                    .await
                    .map_err(|e| TopologyError::ModuleCreateFailed(entry.name.clone(), e.to_string()))
            }
            LoaderType::OutOfProcess => {
                let entrypoint = OutOfProcessEntrypoint::from_json(&entry.entrypoint)?;
                if entrypoint.activation == ActivationType::Launch {
                    let spec = entrypoint.launch.as_ref().ok_or_else(|| {
                        TopologyError::ModuleCreateFailed(
                            entry.name.clone(),
                            "activation.type = launch requires a launch.path".to_string(),
                        )
                    })?;
                    self.supervisor.launch(&entry.name, spec)?;
                }
                let (control_local, _control_remote) =
                    ipc_pair().map_err(|e| TransportError::Io("control", e))?;
                let (message_local, _message_remote) =
                    ipc_pair().map_err(|e| TransportError::Io("message", e))?;
                let publish = PublishHandle::new(Arc::new(self.broker.clone()), tag);
                let args = serde_json::to_vec(&entry.args).unwrap_or_default();
                let proxy = OutOfProcessModule::connect(
                    control_local,
                    message_local,
                    &entrypoint,
                    &args,
                    publish,
                )
                .await?;
                Ok(Box::new(proxy) as Box<dyn NativeModule>)
            }
        }
    }

    /// Detach the module from every wildcard-sink link, remove every
    /// regular link mentioning it, detach it from the broker, and drop its
    /// record (SPEC_FULL.md ยง4.2, "remove-module").
    pub async fn remove_module_by_name(&mut self, name: &str) -> Result<(), TopologyError> {
        if !self.modules.contains_key(name) {
            return Err(TopologyError::NotFound(name.to_string()));
        }

        let affected: Vec<(String, String)> = self
            .links
            .iter()
            .filter(|l| l.source == name || l.sink == name || l.source == WILDCARD_SOURCE)
            .map(|l| (l.source.clone(), l.sink.clone()))
            .collect();
        for (source, sink) in &affected {
            let concrete_source = if source == WILDCARD_SOURCE { name } else { source };
            if concrete_source == name || sink == name {
                let _ = self.broker.remove_link(concrete_source, sink);
            }
        }
        self.links
            .retain(|l| !(l.source == name || l.sink == name));

        self.broker.remove_module(name).await?;
        self.modules.remove(name);
        self.module_order.retain(|m| m != name);

        self.emit(EventKind::ModuleListChanged, Some(name.to_string()), None);
        Ok(())
    }

    pub async fn remove_module(&mut self, handle: ModuleHandle) -> Result<(), TopologyError> {
        let name = self
            .modules
            .iter()
            .find(|(_, tag)| **tag == handle.0)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| TopologyError::NotFound(format!("{}", handle.0)))?;
        self.remove_module_by_name(&name).await
    }

    /// Reject duplicates and references to unknown modules. For a wildcard
    /// source, install one subscription from every currently-known other
    /// module to the sink (SPEC_FULL.md ยง4.2, "add-link").
    pub async fn add_link(&mut self, link: LinkEntry) -> Result<(), TopologyError> {
        if link.sink == WILDCARD_SOURCE {
            return Err(TopologyError::InvalidArgument);
        }
        if !self.modules.contains_key(&link.sink) {
            return Err(TopologyError::NotFound(link.sink.clone()));
        }
        if self
            .links
            .iter()
            .any(|l| l.source == link.source && l.sink == link.sink)
        {
            return Err(TopologyError::Duplicate(format!(
                "{} -> {}",
                link.source, link.sink
            )));
        }

        if link.is_wildcard_source() {
            for name in self.module_order.clone() {
                if name != link.sink {
                    self.broker.add_link(&name, &link.sink)?;
                }
            }
        } else {
            if !self.modules.contains_key(&link.source) {
                return Err(TopologyError::NotFound(link.source.clone()));
            }
            self.broker.add_link(&link.source, &link.sink)?;
        }

        self.links.push(LinkRecord {
            source: link.source.clone(),
            sink: link.sink.clone(),
        });
        self.emit(
            EventKind::ModuleListChanged,
            None,
            Some((link.source, link.sink)),
        );
        Ok(())
    }

    pub async fn remove_link(&mut self, link: LinkEntry) -> Result<(), TopologyError> {
        self.remove_link_internal(&link.source, &link.sink)?;
        self.emit(
            EventKind::ModuleListChanged,
            None,
            Some((link.source, link.sink)),
        );
        Ok(())
    }

    fn remove_link_internal(&mut self, source: &str, sink: &str) -> Result<(), TopologyError> {
        let position = self
            .links
            .iter()
            .position(|l| l.source == source && l.sink == sink)
            .ok_or_else(|| TopologyError::NotFound(format!("{source} -> {sink}")))?;

        if source == WILDCARD_SOURCE {
            for name in self.module_order.clone() {
                if name != sink {
                    let _ = self.broker.remove_link(&name, sink);
                }
            }
        } else {
            self.broker.remove_link(source, sink)?;
        }

        self.links.remove(position);
        Ok(())
    }

    /// Invoke every module's start hook in insertion order
    /// (SPEC_FULL.md ยง4.2, "start").
    pub async fn start(&mut self) -> Result<(), TopologyError> {
        for name in self.module_order.clone() {
            self.broker.start_module(&name).await?;
        }
        self.emit(EventKind::Started, None, None);
        Ok(())
    }

    pub async fn start_module(&mut self, handle: ModuleHandle) -> Result<(), TopologyError> {
        let name = self
            .modules
            .iter()
            .find(|(_, tag)| **tag == handle.0)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| TopologyError::NotFound(format!("{}", handle.0)))?;
        self.broker.start_module(&name).await?;
        Ok(())
    }

    /// Snapshot every module's name and source list; a module targeted by a
    /// wildcard-source link reports `sources: None` (SPEC_FULL.md ยง4.2,
    /// "list-modules").
    pub fn list_modules(&self) -> Vec<ModuleInfo> {
        self.module_order
            .iter()
            .map(|name| {
                let has_wildcard = self
                    .links
                    .iter()
                    .any(|l| l.source == WILDCARD_SOURCE && l.sink == *name);
                let sources = if has_wildcard {
                    None
                } else {
                    Some(
                        self.links
                            .iter()
                            .filter(|l| l.sink == *name)
                            .map(|l| l.source.clone())
                            .collect(),
                    )
                };
                ModuleInfo {
                    name: name.clone(),
                    sources,
                }
            })
            .collect()
    }

    /// Register a callback fired synchronously, in registration order,
    /// every time `event` is emitted (SPEC_FULL.md ยง4.5).
    pub fn add_event_callback(&mut self, event: EventKind, callback: EventCallback) {
        self.events.entry(event).or_default().push(callback);
    }

    fn emit(&self, kind: EventKind, module: Option<String>, link: Option<(String, String)>) {
        let event = TopologyEvent { kind, module, link };
        info!(?kind, module = ?event.module, link = ?event.link, "topology event");
        if let Some(callbacks) = self.events.get(&kind) {
            for callback in callbacks {
                callback(&event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::config::LinkEntry;
    use crate::message::Message;
    use crate::module::ModuleError;

    struct Recorder {
        received: Arc<StdMutex<Vec<Message>>>,
    }

    #[async_trait]
    impl NativeModule for Recorder {
        async fn receive(&mut self, message: Message) {
            self.received.lock().expect("lock").push(message);
        }
    }

    struct RecorderFactory {
        received: Arc<StdMutex<Vec<Message>>>,
    }

    #[async_trait]
    impl ModuleFactory for RecorderFactory {
        async fn create(
            &self,
            _config: &[u8],
            _publish: PublishHandle,
        ) -> Result<Box<dyn NativeModule>, ModuleError> {
            Ok(Box::new(Recorder {
                received: self.received.clone(),
            }))
        }
    }

    fn module_entry(name: &str) -> ModuleEntry {
        ModuleEntry {
            name: name.to_string(),
            loader: "native".to_string(),
            entrypoint: serde_json::Value::Null,
            args: serde_json::Value::Null,
        }
    }

    async fn topology_with_native_loader() -> (Topology, Arc<StdMutex<Vec<Message>>>) {
        let received = Arc::new(StdMutex::new(Vec::new()));
        let mut factories: HashMap<String, Arc<dyn ModuleFactory>> = HashMap::new();
        factories.insert(
            "native".to_string(),
            Arc::new(RecorderFactory {
                received: received.clone(),
            }),
        );
        let mut config = GatewayConfig {
            loaders: Vec::new(),
            modules: Vec::new(),
            links: Vec::new(),
        };
        config.loaders.push(crate::config::LoaderEntry {
            name: "native".to_string(),
            loader_type: LoaderType::NativeDynamic,
            configuration: serde_json::Value::Null,
        });
        let topology = Topology::create(Broker::create(), Some(config), factories)
            .await
            .expect("builds");
        (topology, received)
    }

    #[tokio::test]
    async fn wildcard_fan_in_delivers_from_every_other_module() {
        let (mut topology, received) = topology_with_native_loader().await;
        topology.add_module(module_entry("A")).await.expect("add A");
        topology.add_module(module_entry("B")).await.expect("add B");
        topology.add_module(module_entry("C")).await.expect("add C");
        topology
            .add_link(LinkEntry {
                source: "*".to_string(),
                sink: "C".to_string(),
            })
            .await
            .expect("add wildcard link");

        let a_tag = *topology.modules.get("A").expect("A exists");
        let b_tag = *topology.modules.get("B").expect("B exists");
        topology
            .broker
            .publish(a_tag, Message::new(vec![1]))
            .expect("publish from A");
        topology
            .broker
            .publish(b_tag, Message::new(vec![2]))
            .expect("publish from B");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(received.lock().expect("lock").len(), 2);

        topology.destroy().await;
    }

    #[tokio::test]
    async fn late_joining_module_is_wired_into_existing_wildcard_link() {
        let (mut topology, received) = topology_with_native_loader().await;
        topology.add_module(module_entry("C")).await.expect("add C");
        topology
            .add_link(LinkEntry {
                source: "*".to_string(),
                sink: "C".to_string(),
            })
            .await
            .expect("add wildcard link");
        topology.add_module(module_entry("D")).await.expect("add D");

        let d_tag = *topology.modules.get("D").expect("D exists");
        topology
            .broker
            .publish(d_tag, Message::new(vec![9]))
            .expect("publish from D");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(received.lock().expect("lock").len(), 1);

        topology.destroy().await;
    }

    #[tokio::test]
    async fn self_delivery_via_wildcard_is_never_installed() {
        let (mut topology, received) = topology_with_native_loader().await;
        topology
            .add_link(LinkEntry {
                source: "*".to_string(),
                sink: "C".to_string(),
            })
            .await
            .unwrap_err(); // C does not exist yet

        topology.add_module(module_entry("C")).await.expect("add C");
        topology
            .add_link(LinkEntry {
                source: "*".to_string(),
                sink: "C".to_string(),
            })
            .await
            .expect("add wildcard link after C exists");

        let c_tag = *topology.modules.get("C").expect("C exists");
        topology
            .broker
            .publish(c_tag, Message::new(vec![1]))
            .expect("publish from C");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(received.lock().expect("lock").is_empty());

        topology.destroy().await;
    }

    #[tokio::test]
    async fn duplicate_module_and_link_are_rejected() {
        let (mut topology, _received) = topology_with_native_loader().await;
        topology.add_module(module_entry("A")).await.expect("add A");
        topology.add_module(module_entry("B")).await.expect("add B");

        let err = topology.add_module(module_entry("A")).await.unwrap_err();
        assert!(matches!(err, TopologyError::Duplicate(_)));

        topology
            .add_link(LinkEntry {
                source: "A".to_string(),
                sink: "B".to_string(),
            })
            .await
            .expect("first link");
        let err = topology
            .add_link(LinkEntry {
                source: "A".to_string(),
                sink: "B".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::Duplicate(_)));

        assert_eq!(
            topology
                .list_modules()
                .into_iter()
                .find(|m| m.name == "B")
                .unwrap()
                .sources,
            Some(vec!["A".to_string()])
        );

        topology.destroy().await;
    }

    #[tokio::test]
    async fn destroy_leaves_no_modules_attached() {
        let (mut topology, _received) = topology_with_native_loader().await;
        topology.add_module(module_entry("A")).await.expect("add A");
        assert_eq!(topology.broker.module_names().len(), 1);
        topology.destroy().await;
    }
}
