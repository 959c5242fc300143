//! Out-of-process transport errors (SPEC_FULL.md ยง4.4, ยง7).

use thiserror::Error;

use crate::control::ControlCodecError;
use crate::message::MessageError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io error on {0} channel: {1}")]
    Io(&'static str, std::io::Error),

    #[error("control codec error: {0}")]
    Codec(#[from] ControlCodecError),

    #[error("malformed message on the message channel: {0}")]
    Decode(#[from] MessageError),

    #[error("remote rejected the request with status {0}")]
    RemoteRejected(u8),

    #[error("timed out waiting for a reply on the control channel")]
    Timeout,

    #[error("proxy is not ready: creation has not completed")]
    NotReady,

    #[error("proxy is detached from its remote")]
    Detached,

    #[error("out-of-process entrypoint is invalid: {0}")]
    InvalidEntrypoint(String),

    #[error("child process {0} could not be launched: {1}")]
    SpawnFailed(String, std::io::Error),
}
