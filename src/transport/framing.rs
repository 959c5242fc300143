//! Byte-stream framing shared by the control and message channels.
//!
//! Control frames are already self-sized (SPEC_FULL.md ยง4.3: bytes 4..8 are
//! the frame's own total length), so reading one only needs the header
//! peeked first. Message-channel frames carry an opaque [`Message`] and get
//! a plain 4-byte big-endian length prefix.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::control::types::{BASE_FRAME_SIZE, MAX_FRAME_SIZE};
use crate::control::{codec, ControlCodecError, ControlMessage};
use crate::message::Message;

use super::error::TransportError;

pub async fn write_control(
    out: &mut OwnedWriteHalf,
    message: &ControlMessage,
) -> Result<(), TransportError> {
    let bytes = codec::encode(message)?;
    out.write_all(&bytes)
        .await
        .map_err(|e| TransportError::Io("control", e))
}

pub async fn read_control(input: &mut OwnedReadHalf) -> Result<ControlMessage, TransportError> {
    let mut header = [0u8; BASE_FRAME_SIZE];
    input
        .read_exact(&mut header)
        .await
        .map_err(|e| TransportError::Io("control", e))?;
    let total = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if total < BASE_FRAME_SIZE {
        return Err(TransportError::Codec(ControlCodecError::TooShort {
            actual: total,
            minimum: BASE_FRAME_SIZE,
        }));
    }
    if total > MAX_FRAME_SIZE {
        return Err(TransportError::Codec(ControlCodecError::TooLarge {
            declared: total,
            max: MAX_FRAME_SIZE,
        }));
    }
    let mut frame = vec![0u8; total];
    frame[..header.len()].copy_from_slice(&header);
    input
        .read_exact(&mut frame[header.len()..])
        .await
        .map_err(|e| TransportError::Io("control", e))?;
    Ok(codec::decode(&frame)?)
}

pub async fn write_message(out: &mut OwnedWriteHalf, message: &Message) -> Result<(), TransportError> {
    let bytes = message.to_bytes();
    let len = (bytes.len() as u32).to_be_bytes();
    out.write_all(&len)
        .await
        .map_err(|e| TransportError::Io("message", e))?;
    out.write_all(&bytes)
        .await
        .map_err(|e| TransportError::Io("message", e))
}

pub async fn read_message(input: &mut OwnedReadHalf) -> Result<Message, TransportError> {
    let mut len_buf = [0u8; 4];
    input
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TransportError::Io("message", e))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    input
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::Io("message", e))?;
    Ok(Message::from_bytes(&body)?)
}
