//! Errors for the `Message` wire format.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("failed to decode message: {0}")]
    Decode(String),
}
