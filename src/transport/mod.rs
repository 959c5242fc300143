//! Out-of-process module transport (SPEC_FULL.md ยง4.4).

pub mod entrypoint;
pub mod error;
mod framing;
pub mod proxy;
pub mod remote;
pub mod supervisor;

pub use entrypoint::{ActivationType, CreationMode, LaunchSpec, OutOfProcessEntrypoint};
pub use error::TransportError;
pub use proxy::{ipc_pair, OutOfProcessModule};
pub use remote::RemoteModuleHost;
pub use supervisor::ChildSupervisor;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::broker::Broker;
    use crate::message::Message;
    use crate::module::{ModuleError, ModuleFactory, NativeModule, PublishHandle};
    use crate::util::ModuleTag;

    struct EchoModule {
        publish: PublishHandle,
    }

    #[async_trait]
    impl NativeModule for EchoModule {
        async fn receive(&mut self, message: Message) {
            let _ = self.publish.publish(message);
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl ModuleFactory for EchoFactory {
        async fn create(
            &self,
            _config: &[u8],
            publish: PublishHandle,
        ) -> Result<Box<dyn NativeModule>, ModuleError> {
            Ok(Box::new(EchoModule { publish }))
        }
    }

    #[tokio::test]
    async fn out_of_process_round_trip_delivers_to_broker() {
        let broker = Broker::create();
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let received_clone = received.clone();

        struct Recorder {
            received: Arc<AsyncMutex<Vec<Message>>>,
        }
        #[async_trait]
        impl NativeModule for Recorder {
            async fn receive(&mut self, message: Message) {
                self.received.lock().await.push(message);
            }
        }

        let sink_tag = ModuleTag::next();
        broker
            .add_module(
                "sink",
                sink_tag,
                Box::new(Recorder {
                    received: received_clone,
                }),
            )
            .expect("add sink");

        let origin_tag = ModuleTag::next();
        struct NoOpModule;
        #[async_trait]
        impl NativeModule for NoOpModule {
            async fn receive(&mut self, _message: Message) {}
        }
        broker
            .add_module("origin", origin_tag, Box::new(NoOpModule))
            .expect("add origin");

        let proxy_tag = ModuleTag::next();
        let (control_local, control_remote) = ipc_pair().expect("control pair");
        let (message_local, message_remote) = ipc_pair().expect("message pair");

        let host = RemoteModuleHost::spawn(control_remote, message_remote, Arc::new(EchoFactory));

        let entrypoint = OutOfProcessEntrypoint::from_json(&serde_json::json!({
            "activation.type": "none",
            "control.id": "test-chan",
        }))
        .expect("parses");

        let publish = PublishHandle::new(Arc::new(broker.clone()), proxy_tag);
        let proxy = OutOfProcessModule::connect(control_local, message_local, &entrypoint, b"{}", publish)
            .await
            .expect("handshake succeeds");

        broker
            .add_module("proxy", proxy_tag, Box::new(proxy))
            .expect("add proxy");
        broker.add_link("origin", "proxy").expect("link origin to proxy");
        broker.add_link("proxy", "sink").expect("link proxy to sink");

        // origin -> proxy.receive() forwards to the remote echo module,
        // which republishes it; the proxy's message poller republishes
        // that under its own identity, so the linked sink sees exactly one
        // delivery.
        broker
            .publish(origin_tag, Message::new(vec![1, 2, 3]))
            .expect("publish reaches the proxy");

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(received.lock().await.len(), 1);

        broker.remove_module("proxy").await.expect("remove proxy");
        host.join().await;
        broker.remove_module("sink").await.expect("remove sink");
        broker.remove_module("origin").await.expect("remove origin");
    }
}
