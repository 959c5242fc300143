//! The remote-side mirror of the transport (SPEC_FULL.md ยง4.4, "Remote side
//! (proxy gateway)").
//!
//! `RemoteModuleHost` binds its end of the control/message channel pair and
//! hosts a module built from a [`ModuleFactory`], exactly as a real detached
//! process would: `CREATE` runs the factory, `START` runs the start hook,
//! `DESTROY` runs the destroy hook. A publish from the hosted module is
//! serialized onto the message channel instead of reaching a local broker.

use std::sync::Arc;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::framing;
use crate::broker::BrokerError;
use crate::control::ControlMessage;
use crate::message::Message;
use crate::module::{ModuleFactory, NativeModule, PublishHandle, PublishSink};
use crate::util::ModuleTag;

/// A [`PublishSink`] that forwards a hosted module's publishes across the
/// message channel back to the gateway, instead of into a local broker.
struct RemoteSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl PublishSink for RemoteSink {
    fn publish(&self, _source: ModuleTag, message: Message) -> Result<(), BrokerError> {
        self.tx
            .send(message)
            .map_err(|_| BrokerError::ResourceExhausted)
    }
}

/// Runs the remote side of one out-of-process module until `DESTROY` or a
/// channel error ends it.
pub struct RemoteModuleHost {
    task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl RemoteModuleHost {
    pub fn spawn(control: UnixStream, message: UnixStream, factory: Arc<dyn ModuleFactory>) -> Self {
        let (control_read, control_write) = control.into_split();
        let (message_read, mut message_write) = message.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(err) = framing::write_message(&mut message_write, &message).await {
                    warn!(error = %err, "remote host failed to forward a publish");
                    break;
                }
            }
        });

        let task = tokio::spawn(run(control_read, control_write, message_read, factory, tx));
        Self {
            task: Some(task),
            writer_task: Some(writer_task),
        }
    }

    /// Wait for the host's tasks to finish (normally driven by a `DESTROY`
    /// frame from the gateway side). Aborts rather than waits forever if the
    /// gateway side never sends one.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(writer) = self.writer_task.take() {
            writer.abort();
            let _ = writer.await;
        }
    }
}

async fn run(
    mut control_read: tokio::net::unix::OwnedReadHalf,
    mut control_write: tokio::net::unix::OwnedWriteHalf,
    mut message_read: tokio::net::unix::OwnedReadHalf,
    factory: Arc<dyn ModuleFactory>,
    tx: mpsc::UnboundedSender<Message>,
) {
    let mut module: Option<Box<dyn NativeModule>> = None;

    loop {
        tokio::select! {
            ctrl = framing::read_control(&mut control_read) => {
                match ctrl {
                    Ok(ControlMessage::Create { args, .. }) => {
                        if module.is_some() {
                            let _ = framing::write_control(&mut control_write, &ControlMessage::Reply { status: 1 }).await;
                            continue;
                        }
                        let publish = PublishHandle::new(Arc::new(RemoteSink { tx: tx.clone() }), ModuleTag::next());
                        match factory.create(args.as_bytes(), publish).await {
                            Ok(instance) => {
                                module = Some(instance);
                                let _ = framing::write_control(&mut control_write, &ControlMessage::Reply { status: 0 }).await;
                            }
                            Err(err) => {
                                warn!(error = %err, "remote factory rejected Create");
                                let _ = framing::write_control(&mut control_write, &ControlMessage::Reply { status: 1 }).await;
                            }
                        }
                    }
                    Ok(ControlMessage::Start) => {
                        if let Some(instance) = module.as_mut() {
                            instance.start().await;
                        }
                    }
                    Ok(ControlMessage::Destroy) => {
                        if let Some(mut instance) = module.take() {
                            instance.destroy().await;
                        }
                        break;
                    }
                    Ok(ControlMessage::Reply { .. }) => {}
                    Err(_) => break,
                }
            }
            msg = framing::read_message(&mut message_read) => {
                match msg {
                    Ok(message) => {
                        if let Some(instance) = module.as_mut() {
                            instance.receive(message).await;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
