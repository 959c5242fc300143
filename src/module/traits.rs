//! The module capability trait and its factory (SPEC_FULL.md ยง3, "Module
//! instance").
//!
//! The source's "lifecycle hook table of nullable function pointers" is
//! re-expressed here as two traits: [`NativeModule`] carries the required
//! `receive` hook plus optional `start`/`destroy` hooks with default (no-op)
//! bodies. [`ModuleFactory`] stands in for the unspecified shared-library
//! loader of SPEC_FULL.md ยง2 โ a process that would otherwise `dlopen` a
//! `.so` and look up its `create` symbol instead registers a boxed factory
//! value.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ModuleError;
use crate::broker::{Broker, BrokerError};
use crate::message::Message;
use crate::util::ModuleTag;

/// Where a [`PublishHandle`] actually delivers a publish.
///
/// An in-process module's handle targets the broker directly; an
/// out-of-process proxy's *hosted* module (on the remote side of the wire)
/// targets the message socket instead, so the same `NativeModule`/
/// `ModuleFactory` pair works unmodified on both ends of the transport
/// (SPEC_FULL.md ยง4.4, "Remote side").
pub trait PublishSink: Send + Sync {
    fn publish(&self, source: ModuleTag, message: Message) -> Result<(), BrokerError>;
}

impl PublishSink for Broker {
    fn publish(&self, source: ModuleTag, message: Message) -> Result<(), BrokerError> {
        Broker::publish(self, source, message)
    }
}

/// A handle a module instance uses to publish messages back through the
/// broker under its own identity.
///
/// This is the Rust-native stand-in for the `BROKER_HANDLE` a module stores
/// at creation time in the source implementation.
#[derive(Clone)]
pub struct PublishHandle {
    sink: Arc<dyn PublishSink>,
    source: ModuleTag,
}

impl PublishHandle {
    pub fn new(sink: Arc<dyn PublishSink>, source: ModuleTag) -> Self {
        Self { sink, source }
    }

    /// Publish `message` as this module's identity.
    pub fn publish(&self, message: Message) -> Result<(), BrokerError> {
        self.sink.publish(self.source, message)
    }
}

/// The per-instance logic of an attached module.
///
/// `create` is the `ModuleFactory::create` call that produced this value;
/// there is no explicit trait method for it. `destroy` is a required async
/// hook rather than left to `Drop` alone, since an out-of-process proxy
/// needs to run a socket handshake before teardown and `Drop` cannot
/// `.await` (SPEC_FULL.md ยง9, "Lifecycle hook table of nullable function
/// pointers"). The broker invokes it once, just before the module's record
/// is discarded; plain in-process modules can leave it at its no-op
/// default and rely on `Drop` for synchronous cleanup.
#[async_trait]
pub trait NativeModule: Send + 'static {
    /// Invoked by the module's broker worker for every message delivered to
    /// it (SPEC_FULL.md ยง4.1, "Worker task").
    async fn receive(&mut self, message: Message);

    /// Invoked once by `Topology::start`/`start_module`. Optional: most
    /// modules have no start-time behavior.
    async fn start(&mut self) {}

    /// Invoked once by `Broker::remove_module`, before the instance is
    /// dropped. Optional: most modules have no teardown handshake.
    async fn destroy(&mut self) {}
}

/// Stands in for "module shared-library loading" (SPEC_FULL.md ยง1, explicit
/// external collaborator): given the module's opaque configuration blob and
/// a handle to publish through, produce a boxed [`NativeModule`].
#[async_trait]
pub trait ModuleFactory: Send + Sync + 'static {
    async fn create(
        &self,
        config: &[u8],
        publish: PublishHandle,
    ) -> Result<Box<dyn NativeModule>, ModuleError>;
}
