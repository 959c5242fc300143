//! # gwrt - Gateway Runtime
//!
//! A gateway runtime hosting pluggable modules connected through a message
//! broker. Modules run either in-process (as native `NativeModule`
//! implementations) or out-of-process (as a proxy over a local IPC channel);
//! the broker treats both uniformly.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use gwrt::broker::Broker;
//! use gwrt::config::GatewayConfig;
//! use gwrt::topology::Topology;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_json(include_str!("gateway.json"))?;
//!     let mut topology = Topology::create(Broker::create(), Some(config), HashMap::new()).await?;
//!     topology.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`message`] - The wire-level `Message` envelope (property bag + content)
//! - [`control`] - Binary control-channel codec for proxy lifecycle frames
//! - [`module`] - `NativeModule`/`ModuleFactory` traits and the publish handle
//! - [`broker`] - The pub/sub core: attach/detach modules, link/unlink, publish
//! - [`topology`] - Transactional module/link CRUD and the named event system
//! - [`transport`] - Out-of-process module proxy and child process supervision
//! - [`config`] - Declarative gateway configuration (JSON)
//! - [`util`] - Identifiers shared across the crate

pub mod broker;
pub mod config;
pub mod control;
pub mod message;
pub mod module;
pub mod topology;
pub mod transport;
pub mod util;

pub use broker::{Broker, BrokerError};
pub use config::{ConfigError, GatewayConfig};
pub use control::{ControlCodecError, ControlMessage};
pub use message::{Message, MessageError};
pub use module::{ModuleError, ModuleFactory, NativeModule, PublishHandle, PublishSink};
pub use topology::{Topology, TopologyError};
pub use util::{random_channel_id, ModuleTag, QuitToken};
