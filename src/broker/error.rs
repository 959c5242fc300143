//! Broker-level errors (SPEC_FULL.md ยง4.1, ยง7).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("module name must not be empty")]
    InvalidArgument,

    #[error("no module named {0} is attached to the broker")]
    NotFound(String),

    #[error("a module named {0} is already attached to the broker")]
    Duplicate(String),

    #[error("link {0} -> {1} already exists")]
    DuplicateLink(String, String),

    #[error("link {0} -> {1} does not exist")]
    LinkNotFound(String, String),

    #[error("publish failed: no worker is listening and the channel is closed")]
    ResourceExhausted,
}
