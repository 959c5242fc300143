//! Topology-manager errors (SPEC_FULL.md ยง4.2, ยง7).

use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::module::ModuleError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("module name must not be empty or the reserved name \"*\"")]
    InvalidArgument,

    #[error("no module or loader named {0} is known to the topology")]
    NotFound(String),

    #[error("a module named {0} already exists")]
    Duplicate(String),

    #[error("module {0} failed to start: {1}")]
    ModuleCreateFailed(String, String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
