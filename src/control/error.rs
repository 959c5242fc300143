//! Errors for the control-message wire codec (SPEC_FULL.md ยง4.3).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlCodecError {
    #[error("frame is {actual} bytes, shorter than the minimum {minimum} for this type")]
    TooShort { actual: usize, minimum: usize },

    #[error("magic bytes do not match a control message")]
    BadMagic,

    #[error("unknown control message version {0}")]
    UnknownVersion(u8),

    #[error("unknown control message type {0}")]
    UnknownType(u8),

    #[error("inner length field would read past the declared frame size")]
    LengthOverflow,

    #[error("declared total size {declared} disagrees with buffer length {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("declared total size {declared} exceeds the maximum frame size {max}")]
    TooLarge { declared: usize, max: usize },

    #[error("output buffer of {given} bytes is smaller than the required {required} bytes")]
    BufferTooSmall { given: usize, required: usize },
}
