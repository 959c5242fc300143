//! Integration tests for the topology manager's transactional CRUD and
//! event system, plus the out-of-process transport's graceful shutdown path.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gwrt::broker::Broker;
use gwrt::config::{GatewayConfig, LoaderEntry, LoaderType, ModuleEntry};
use gwrt::module::{ModuleError, ModuleFactory, NativeModule, PublishHandle};
use gwrt::topology::{EventKind, Topology};
use gwrt::transport::{ipc_pair, ChildSupervisor, LaunchSpec, OutOfProcessModule, OutOfProcessEntrypoint, RemoteModuleHost};

struct NoOp;

#[async_trait]
impl NativeModule for NoOp {
    async fn receive(&mut self, _message: gwrt::message::Message) {}
}

struct NoOpFactory;

#[async_trait]
impl ModuleFactory for NoOpFactory {
    async fn create(
        &self,
        _config: &[u8],
        _publish: PublishHandle,
    ) -> Result<Box<dyn NativeModule>, ModuleError> {
        Ok(Box::new(NoOp))
    }
}

fn single_loader_config() -> GatewayConfig {
    GatewayConfig {
        loaders: vec![LoaderEntry {
            name: "native".to_string(),
            loader_type: LoaderType::NativeDynamic,
            configuration: serde_json::Value::Null,
        }],
        modules: Vec::new(),
        links: Vec::new(),
    }
}

#[tokio::test]
async fn lifecycle_events_fire_for_create_module_start_and_destroy() {
    let mut factories: HashMap<String, Arc<dyn ModuleFactory>> = HashMap::new();
    factories.insert("native".to_string(), Arc::new(NoOpFactory));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut topology = Topology::create(Broker::create(), Some(single_loader_config()), factories)
        .await
        .expect("builds");

    for kind in [
        EventKind::Created,
        EventKind::Destroyed,
        EventKind::Started,
        EventKind::ModuleListChanged,
    ] {
        let seen = Arc::clone(&seen);
        topology.add_event_callback(
            kind,
            Box::new(move |event| seen.lock().expect("lock").push(event.kind)),
        );
    }

    topology
        .add_module(ModuleEntry {
            name: "A".to_string(),
            loader: "native".to_string(),
            entrypoint: serde_json::Value::Null,
            args: serde_json::Value::Null,
        })
        .await
        .expect("add A");
    topology.start().await.expect("start");
    topology.destroy().await;

    let seen = seen.lock().expect("lock");
    assert!(seen.contains(&EventKind::ModuleListChanged));
    assert!(seen.contains(&EventKind::Started));
    assert!(seen.contains(&EventKind::Destroyed));
}

#[tokio::test]
async fn create_rolls_back_every_module_when_a_later_link_is_invalid() {
    let mut factories: HashMap<String, Arc<dyn ModuleFactory>> = HashMap::new();
    factories.insert("native".to_string(), Arc::new(NoOpFactory));

    let mut config = single_loader_config();
    config.modules.push(ModuleEntry {
        name: "A".to_string(),
        loader: "native".to_string(),
        entrypoint: serde_json::Value::Null,
        args: serde_json::Value::Null,
    });
    config.links.push(gwrt::config::LinkEntry {
        source: "A".to_string(),
        sink: "ghost".to_string(),
    });

    let result = Topology::create(Broker::create(), Some(config), factories).await;
    assert!(result.is_err());
    assert!(matches!(
        result.err().expect("checked is_err above"),
        gwrt::topology::TopologyError::NotFound(_)
    ));
}

#[tokio::test]
async fn out_of_process_destroy_sends_destroy_frame_before_the_grace_period_signal() {
    let (control_local, control_remote) = ipc_pair().expect("control pair");
    let (message_local, message_remote) = ipc_pair().expect("message pair");
    let host = RemoteModuleHost::spawn(control_remote, message_remote, Arc::new(NoOpFactory));

    let entrypoint = OutOfProcessEntrypoint::from_json(&serde_json::json!({
        "activation.type": "none",
        "control.id": "shutdown-test",
    }))
    .expect("parses");

    let broker = Broker::create();
    let tag = gwrt::util::ModuleTag::next();
    let publish = PublishHandle::new(Arc::new(broker.clone()), tag);
    let mut proxy = OutOfProcessModule::connect(control_local, message_local, &entrypoint, b"{}", publish)
        .await
        .expect("handshake succeeds");

    // The remote side's `run` loop exits on receiving DESTROY; if the
    // gateway never sent it, `host.join()` would have to abort a live task.
    proxy.destroy().await;
    host.join().await;
}

#[tokio::test]
async fn child_supervisor_signals_a_long_running_child_after_its_grace_period() {
    let mut supervisor = ChildSupervisor::new();
    supervisor
        .launch(
            "sleeper",
            &LaunchSpec {
                path: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), "sleep 30".to_string()],
                grace_period_ms: 300,
            },
        )
        .expect("spawns");

    let started = tokio::time::Instant::now();
    supervisor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}
