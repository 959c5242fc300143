//! Control-channel wire codec for out-of-process module lifecycle frames.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, encode, encode_into, encoded_size};
pub use error::ControlCodecError;
pub use types::{ControlMessage, ControlMessageType};
