//! Encode/decode control-channel lifecycle frames (SPEC_FULL.md ยง4.3).
//!
//! Wire format, network byte order:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 1    | magic low    |
//! | 1      | 1    | magic high   |
//! | 2      | 1    | version      |
//! | 3      | 1    | type         |
//! | 4      | 4    | total size   |
//!
//! followed by a per-type payload (see [`ControlMessage`]).

use super::error::ControlCodecError;
use super::types::{
    ControlMessage, ControlMessageType, BASE_CREATE_SIZE, BASE_FRAME_SIZE, BASE_REPLY_SIZE, MAGIC,
    VERSION_CURRENT,
};

/// Number of bytes [`encode_into`] will write for `message`.
///
/// The source's encoder refuses to serialize its `CONTROL_MESSAGE_TYPE_ERROR`
/// sentinel; here that refusal is free, since `ControlMessage` simply has no
/// variant for it.
pub fn encoded_size(message: &ControlMessage) -> usize {
    let payload_len = match message {
        ControlMessage::Create { uri, args, .. } => {
            1 + 1 + 4 + (uri.len() + 1) + 4 + (args.len() + 1)
        }
        ControlMessage::Reply { .. } => 1,
        ControlMessage::Start | ControlMessage::Destroy => 0,
    };
    BASE_FRAME_SIZE + payload_len
}

/// Serialize `message` into `buf`.
///
/// Mirrors the source's `ControlMessage_ToByteArray`: if `buf` is empty, no
/// bytes are written and the required size is returned so the caller can
/// size its allocation; otherwise `buf` must be at least that large.
pub fn encode_into(message: &ControlMessage, buf: &mut [u8]) -> Result<usize, ControlCodecError> {
    let required = encoded_size(message);

    if buf.is_empty() {
        return Ok(required);
    }
    if buf.len() < required {
        return Err(ControlCodecError::BufferTooSmall {
            given: buf.len(),
            required,
        });
    }

    buf[0] = MAGIC[0];
    buf[1] = MAGIC[1];
    buf[2] = VERSION_CURRENT;
    buf[3] = message.message_type() as u8;
    buf[4..8].copy_from_slice(&(required as u32).to_be_bytes());

    let mut pos = BASE_FRAME_SIZE;
    match message {
        ControlMessage::Create {
            gateway_message_version,
            uri_type,
            uri,
            args,
        } => {
            buf[pos] = *gateway_message_version;
            pos += 1;
            buf[pos] = *uri_type;
            pos += 1;
            write_chunk(buf, &mut pos, uri.as_bytes());
            write_chunk(buf, &mut pos, args.as_bytes());
        }
        ControlMessage::Reply { status } => {
            buf[pos] = *status;
            pos += 1;
        }
        ControlMessage::Start | ControlMessage::Destroy => {}
    }
    debug_assert_eq!(pos, required);

    Ok(required)
}

/// Write a nul-terminated chunk (4-byte big-endian length, including the
/// terminator, followed by the bytes and the terminator).
fn write_chunk(buf: &mut [u8], pos: &mut usize, bytes: &[u8]) {
    let chunk_len = (bytes.len() + 1) as u32;
    buf[*pos..*pos + 4].copy_from_slice(&chunk_len.to_be_bytes());
    *pos += 4;
    buf[*pos..*pos + bytes.len()].copy_from_slice(bytes);
    *pos += bytes.len();
    buf[*pos] = 0;
    *pos += 1;
}

/// Convenience wrapper around [`encode_into`] that allocates its own buffer.
pub fn encode(message: &ControlMessage) -> Result<Vec<u8>, ControlCodecError> {
    let size = encoded_size(message);
    let mut buf = vec![0u8; size];
    encode_into(message, &mut buf)?;
    Ok(buf)
}

/// Read a big-endian `u32` length field at `pos`, failing if it would read
/// past `bytes`.
fn read_u32(bytes: &[u8], pos: usize) -> Result<u32, ControlCodecError> {
    let slice = bytes
        .get(pos..pos + 4)
        .ok_or(ControlCodecError::LengthOverflow)?;
    let mut array = [0u8; 4];
    array.copy_from_slice(slice);
    Ok(u32::from_be_bytes(array))
}

/// Read a length-prefixed, nul-terminated chunk at `pos`. Returns the chunk
/// with its terminator stripped and the number of bytes consumed (length
/// field + chunk).
fn read_chunk(bytes: &[u8], pos: usize) -> Result<(String, usize), ControlCodecError> {
    let chunk_len = read_u32(bytes, pos)? as usize;
    let start = pos + 4;
    let end = start
        .checked_add(chunk_len)
        .ok_or(ControlCodecError::LengthOverflow)?;
    let raw = bytes
        .get(start..end)
        .ok_or(ControlCodecError::LengthOverflow)?;
    let trimmed = raw.strip_suffix(&[0u8]).unwrap_or(raw);
    let text = String::from_utf8_lossy(trimmed).into_owned();
    Ok((text, 4 + chunk_len))
}

/// Decode a byte slice produced by [`encode`]/[`encode_into`].
pub fn decode(bytes: &[u8]) -> Result<ControlMessage, ControlCodecError> {
    if bytes.len() < BASE_FRAME_SIZE {
        return Err(ControlCodecError::TooShort {
            actual: bytes.len(),
            minimum: BASE_FRAME_SIZE,
        });
    }
    if bytes[0] != MAGIC[0] || bytes[1] != MAGIC[1] {
        return Err(ControlCodecError::BadMagic);
    }
    let version = bytes[2];
    if version != VERSION_CURRENT {
        return Err(ControlCodecError::UnknownVersion(version));
    }
    let raw_type = bytes[3];
    let message_type =
        ControlMessageType::from_u8(raw_type).ok_or(ControlCodecError::UnknownType(raw_type))?;
    let declared_size = read_u32(bytes, 4)? as usize;
    if declared_size != bytes.len() {
        return Err(ControlCodecError::SizeMismatch {
            declared: declared_size,
            actual: bytes.len(),
        });
    }

    let mut pos = BASE_FRAME_SIZE;
    let message = match message_type {
        ControlMessageType::Create => {
            if bytes.len() < BASE_CREATE_SIZE {
                return Err(ControlCodecError::TooShort {
                    actual: bytes.len(),
                    minimum: BASE_CREATE_SIZE,
                });
            }
            let gateway_message_version = *bytes.get(pos).ok_or(ControlCodecError::LengthOverflow)?;
            pos += 1;
            let uri_type = *bytes.get(pos).ok_or(ControlCodecError::LengthOverflow)?;
            pos += 1;
            let (uri, consumed) = read_chunk(bytes, pos)?;
            pos += consumed;
            let (args, consumed) = read_chunk(bytes, pos)?;
            pos += consumed;
            ControlMessage::Create {
                gateway_message_version,
                uri_type,
                uri,
                args,
            }
        }
        ControlMessageType::Reply => {
            if bytes.len() < BASE_REPLY_SIZE {
                return Err(ControlCodecError::TooShort {
                    actual: bytes.len(),
                    minimum: BASE_REPLY_SIZE,
                });
            }
            let status = bytes[pos];
            pos += 1;
            ControlMessage::Reply { status }
        }
        ControlMessageType::Start => ControlMessage::Start,
        ControlMessageType::Destroy => ControlMessage::Destroy,
    };

    if pos != bytes.len() {
        return Err(ControlCodecError::SizeMismatch {
            declared: pos,
            actual: bytes.len(),
        });
    }

    Ok(message)
}
