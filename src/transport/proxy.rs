//! The gateway-side half of an out-of-process module (SPEC_FULL.md ยง4.4).
//!
//! `OutOfProcessModule` implements [`NativeModule`] exactly like any
//! in-process instance, so the broker and topology manager never special-case
//! it; only its own `receive`/`destroy` bodies know they are talking to a
//! socket instead of running local logic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::entrypoint::{CreationMode, OutOfProcessEntrypoint};
use super::error::TransportError;
use super::framing;
use crate::control::ControlMessage;
use crate::message::Message;
use crate::module::{NativeModule, PublishHandle};

/// Build the local ends of the two channels a proxy needs. Realized as
/// `tokio::net::UnixStream::pair()` (SPEC_FULL.md ยง4.4, "Channels") — the
/// in-process-simulated remote used by tests and by [`super::remote`];
/// deployments fronting a truly separate process bind these at a named path
/// instead, which this helper does not need to know about.
pub fn ipc_pair() -> std::io::Result<(UnixStream, UnixStream)> {
    UnixStream::pair()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    Pending,
    Created,
    Detached,
}

/// Represents a remote module to the broker.
pub struct OutOfProcessModule {
    state: Arc<SyncMutex<ProxyState>>,
    cancelled: Arc<SyncMutex<bool>>,
    control_write: Arc<AsyncMutex<OwnedWriteHalf>>,
    message_write: Arc<AsyncMutex<OwnedWriteHalf>>,
    control_task: SyncMutex<Option<JoinHandle<()>>>,
    message_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl OutOfProcessModule {
    /// Run the creation handshake over `control`/`message` and, once ready,
    /// start the steady-state pollers.
    pub async fn connect(
        control: UnixStream,
        message: UnixStream,
        entrypoint: &OutOfProcessEntrypoint,
        args: &[u8],
        publish: PublishHandle,
    ) -> Result<Self, TransportError> {
        let (mut control_read, mut control_write) = control.into_split();
        let (message_read, message_write) = message.into_split();

        let create = ControlMessage::Create {
            gateway_message_version: 0,
            uri_type: 0,
            uri: entrypoint.message_uri(),
            args: String::from_utf8_lossy(args).into_owned(),
        };
        framing::write_control(&mut control_write, &create).await?;

        let state = Arc::new(SyncMutex::new(ProxyState::Pending));

        if entrypoint.lifecycle == CreationMode::Synchronous {
            let reply = tokio::time::timeout(
                Duration::from_millis(entrypoint.timeout_ms),
                framing::read_control(&mut control_read),
            )
            .await
            .map_err(|_| TransportError::Timeout)??;
            match reply {
                ControlMessage::Reply { status: 0 } => *state.lock() = ProxyState::Created,
                ControlMessage::Reply { status } => return Err(TransportError::RemoteRejected(status)),
                _ => {
                    return Err(TransportError::InvalidEntrypoint(
                        "expected a Reply frame".to_string(),
                    ))
                }
            }
        }

        let cancelled = Arc::new(SyncMutex::new(false));
        let control_task = tokio::spawn(run_control_task(
            control_read,
            Arc::clone(&state),
            Arc::clone(&cancelled),
        ));
        let message_task = tokio::spawn(run_message_task(
            message_read,
            publish,
            Arc::clone(&state),
            Arc::clone(&cancelled),
        ));

        Ok(Self {
            state,
            cancelled,
            control_write: Arc::new(AsyncMutex::new(control_write)),
            message_write: Arc::new(AsyncMutex::new(message_write)),
            control_task: SyncMutex::new(Some(control_task)),
            message_task: SyncMutex::new(Some(message_task)),
        })
    }

    fn is_ready(&self) -> bool {
        *self.state.lock() == ProxyState::Created
    }

    /// Serialize `message` onto the message channel for the remote to
    /// consume. Dropped, not buffered, while the proxy isn't `Created`
    /// (SPEC_FULL.md ยง9, "Publishes from a detached proxy").
    pub async fn forward(&self, message: &Message) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        let mut write = self.message_write.lock().await;
        framing::write_message(&mut write, message).await
    }
}

#[async_trait]
impl NativeModule for OutOfProcessModule {
    async fn receive(&mut self, message: Message) {
        if let Err(err) = self.forward(&message).await {
            warn!(error = %err, "dropped publish bound for out-of-process module");
        }
    }

    async fn destroy(&mut self) {
        *self.cancelled.lock() = true;

        let mut write = self.control_write.lock().await;
        if let Err(err) = framing::write_control(&mut write, &ControlMessage::Destroy).await {
            warn!(error = %err, "failed to send Destroy to remote, shutting down anyway");
        }
        let _ = write.shutdown().await;
        drop(write);

        let control_handle = self.control_task.lock().take();
        if let Some(handle) = control_handle {
            handle.abort();
            let _ = handle.await;
        }
        let message_handle = self.message_task.lock().take();
        if let Some(handle) = message_handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn run_control_task(
    mut control_read: OwnedReadHalf,
    state: Arc<SyncMutex<ProxyState>>,
    cancelled: Arc<SyncMutex<bool>>,
) {
    loop {
        if *cancelled.lock() {
            break;
        }
        match framing::read_control(&mut control_read).await {
            Ok(ControlMessage::Reply { status: 0 }) => *state.lock() = ProxyState::Created,
            Ok(ControlMessage::Reply { status }) => {
                warn!(status, "remote reported a failure, marking proxy detached");
                *state.lock() = ProxyState::Detached;
            }
            Ok(_) => {}
            Err(err) => {
                if !*cancelled.lock() {
                    warn!(error = %err, "control channel closed, marking proxy detached");
                }
                *state.lock() = ProxyState::Detached;
                break;
            }
        }
    }
}

async fn run_message_task(
    mut message_read: OwnedReadHalf,
    publish: PublishHandle,
    state: Arc<SyncMutex<ProxyState>>,
    cancelled: Arc<SyncMutex<bool>>,
) {
    loop {
        if *cancelled.lock() {
            break;
        }
        match framing::read_message(&mut message_read).await {
            Ok(message) => {
                if let Err(err) = publish.publish(message) {
                    warn!(error = %err, "failed to publish message received from remote");
                }
            }
            Err(err) => {
                if !*cancelled.lock() {
                    warn!(error = %err, "message channel closed, marking proxy detached");
                    *state.lock() = ProxyState::Detached;
                }
                break;
            }
        }
    }
}
