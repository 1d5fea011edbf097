//! # Stream Framing
//!
//! `[u32 big-endian length][payload]` framing over a byte stream.
//!
//! [`FrameDecoder`] accumulates raw socket reads and only yields a batch once
//! the whole frame has arrived, so both the length prefix and the payload may
//! be split across any number of reads.

use crate::error::{CodecError, CodecResult};
use crate::message::Message;
use crate::wire::{decode_messages, encode_messages};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a batch of messages as one complete frame
pub fn encode_frame(messages: &[Message]) -> CodecResult<Bytes> {
    let mut frame = BytesMut::new();
    write_frame(messages, &mut frame)?;
    Ok(frame.freeze())
}

/// Append one complete frame to `dst`; nothing is written on error
pub fn write_frame(messages: &[Message], dst: &mut BytesMut) -> CodecResult<()> {
    let mut payload = BytesMut::new();
    encode_messages(messages, &mut payload)?;
    if payload.len() > u32::MAX as usize {
        return Err(CodecError::frame_too_large(payload.len(), u32::MAX as usize));
    }
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(&payload);
    Ok(())
}

/// Incremental frame decoder for one connection
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Buffer to read into directly, avoids a copy for socket reads
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of buffered bytes not yet consumed by a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame, `Ok(None)` if more bytes are needed
    ///
    /// Any error leaves the stream unusable; callers tear the connection down.
    pub fn decode_next(&mut self) -> CodecResult<Option<Vec<Message>>> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_SIZE]);
        let size = u32::from_be_bytes(prefix) as usize;
        if size > self.max_frame_size {
            return Err(CodecError::frame_too_large(size, self.max_frame_size));
        }
        if self.buffer.len() < LENGTH_PREFIX_SIZE + size {
            self.buffer.reserve(LENGTH_PREFIX_SIZE + size - self.buffer.len());
            return Ok(None);
        }
        self.buffer.advance(LENGTH_PREFIX_SIZE);
        let payload = self.buffer.split_to(size);
        decode_messages(&payload).map(Some)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Value;

    #[test]
    fn test_prefix_split_across_reads() {
        let frame = encode_frame(&[Message::Reply {
            match_id: 3,
            args: vec![Value::from("done")],
        }])
        .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame[..2]);
        assert_eq!(decoder.decode_next().unwrap(), None);
        decoder.extend(&frame[2..5]);
        assert_eq!(decoder.decode_next().unwrap(), None);
        decoder.extend(&frame[5..]);
        let messages = decoder.decode_next().unwrap().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].match_id(), 3);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_frame_is_rejected_before_payload_arrives() {
        let mut decoder = FrameDecoder::with_max_frame_size(8);
        decoder.extend(&64u32.to_be_bytes());
        assert_eq!(
            decoder.decode_next(),
            Err(CodecError::FrameTooLarge { size: 64, limit: 8 })
        );
    }
}
