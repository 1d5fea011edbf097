//! # Payload Serialization
//!
//! Pure functions converting a batch of [`Message`] values to and from one
//! frame payload. All integers are big-endian.
//!
//! ## Layout
//!
//! ```text
//! payload  := count:u32 message*
//! message  := tag:u8 match_id:i32 body
//! Send     := quiet:u8 to:str from:str values
//! Service  := quiet:u8 service:str control:str from:str values
//! Reply    := values
//! Error    := values
//! System   := type:str value
//! values   := count:u32 value*
//! str      := len:u32 utf8[len]
//! ```
//!
//! Values are tagged with one byte: 0 Empty, 1 Bool, 2 Int (i64),
//! 3 Number (f64 bits), 4 Text, 5 Bytes, 6 Array, 7 Map, 8 Address,
//! 9 Component, 10 Error (kind, message). `Reference` values never leave the
//! process and fail encoding with [`CodecError::UnsupportedValue`].
//!
//! Arrays and Maps nest at most [`MAX_NESTING_DEPTH`] levels. Deeper values
//! fail both encoding and decoding with [`CodecError::NestingTooDeep`].

use crate::error::{CodecError, CodecResult};
use crate::message::Message;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{ComponentAddress, ControlAddress, ErrorValue, Value};

const VALUE_EMPTY: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_NUMBER: u8 = 3;
const VALUE_TEXT: u8 = 4;
const VALUE_BYTES: u8 = 5;
const VALUE_ARRAY: u8 = 6;
const VALUE_MAP: u8 = 7;
const VALUE_ADDRESS: u8 = 8;
const VALUE_COMPONENT: u8 = 9;
const VALUE_ERROR: u8 = 10;

/// Deepest Array/Map nesting accepted on either side of the wire
pub const MAX_NESTING_DEPTH: usize = 64;

fn check_depth(depth: usize) -> CodecResult<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(CodecError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    Ok(())
}

/// Serialize a batch of messages as one payload, appending to `dst`
///
/// On error nothing is appended.
pub fn encode_messages(messages: &[Message], dst: &mut BytesMut) -> CodecResult<()> {
    let mut payload = BytesMut::new();
    payload.put_u32(messages.len() as u32);
    for message in messages {
        encode_message(message, &mut payload)?;
    }
    dst.extend_from_slice(&payload);
    Ok(())
}

/// Check that a message can be serialized without producing any bytes
pub fn validate(message: &Message) -> CodecResult<()> {
    message_len(message).map(drop)
}

/// Payload length [`encode_messages`] would produce, without encoding
///
/// Fails exactly when encoding would fail.
pub fn encoded_len(messages: &[Message]) -> CodecResult<usize> {
    let mut total = 4;
    for message in messages {
        total += message_len(message)?;
    }
    Ok(total)
}

fn str_len(s: &str) -> usize {
    4 + s.len()
}

fn message_len(message: &Message) -> CodecResult<usize> {
    let body = match message {
        Message::Send { to, from, args, .. } => {
            1 + str_len(&to.to_string()) + str_len(&from.to_string()) + values_len(args, 0)?
        }
        Message::Service {
            service,
            control,
            from,
            args,
            ..
        } => {
            1 + str_len(service) + str_len(control) + str_len(&from.to_string()) + values_len(args, 0)?
        }
        Message::Reply { args, .. } | Message::Error { args, .. } => values_len(args, 0)?,
        Message::System { kind, data, .. } => str_len(kind) + value_len(data, 0)?,
    };
    Ok(1 + 4 + body)
}

fn values_len(values: &[Value], depth: usize) -> CodecResult<usize> {
    let mut total = 4;
    for value in values {
        total += value_len(value, depth)?;
    }
    Ok(total)
}

fn value_len(value: &Value, depth: usize) -> CodecResult<usize> {
    let body = match value {
        Value::Empty => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Number(_) => 8,
        Value::Text(s) => str_len(s),
        Value::Bytes(b) => 4 + b.len(),
        Value::Array(values) => {
            check_depth(depth)?;
            values_len(values, depth + 1)?
        }
        Value::Map(map) => {
            check_depth(depth)?;
            let mut total = 4;
            for (key, v) in map.iter() {
                total += str_len(key) + value_len(v, depth + 1)?;
            }
            total
        }
        Value::Address(addr) => str_len(&addr.to_string()),
        Value::Component(addr) => str_len(&addr.to_string()),
        Value::Error(err) => str_len(err.kind()) + str_len(err.message()),
        Value::Reference(_) => {
            return Err(CodecError::UnsupportedValue {
                type_name: value.type_name(),
            })
        }
    };
    Ok(1 + body)
}

fn encode_message(message: &Message, dst: &mut BytesMut) -> CodecResult<()> {
    dst.put_u8(message.tag());
    dst.put_i32(message.match_id());
    match message {
        Message::Send {
            quiet,
            to,
            from,
            args,
            ..
        } => {
            dst.put_u8(*quiet as u8);
            put_str(dst, &to.to_string());
            put_str(dst, &from.to_string());
            put_values(dst, args, 0)
        }
        Message::Service {
            quiet,
            service,
            control,
            from,
            args,
            ..
        } => {
            dst.put_u8(*quiet as u8);
            put_str(dst, service);
            put_str(dst, control);
            put_str(dst, &from.to_string());
            put_values(dst, args, 0)
        }
        Message::Reply { args, .. } | Message::Error { args, .. } => put_values(dst, args, 0),
        Message::System { kind, data, .. } => {
            put_str(dst, kind);
            put_value(dst, data, 0)
        }
    }
}

fn put_str(dst: &mut BytesMut, s: &str) {
    dst.put_u32(s.len() as u32);
    dst.put_slice(s.as_bytes());
}

fn put_values(dst: &mut BytesMut, values: &[Value], depth: usize) -> CodecResult<()> {
    dst.put_u32(values.len() as u32);
    values.iter().try_for_each(|v| put_value(dst, v, depth))
}

fn put_value(dst: &mut BytesMut, value: &Value, depth: usize) -> CodecResult<()> {
    match value {
        Value::Empty => dst.put_u8(VALUE_EMPTY),
        Value::Bool(b) => {
            dst.put_u8(VALUE_BOOL);
            dst.put_u8(*b as u8);
        }
        Value::Int(i) => {
            dst.put_u8(VALUE_INT);
            dst.put_i64(*i);
        }
        Value::Number(n) => {
            dst.put_u8(VALUE_NUMBER);
            dst.put_f64(*n);
        }
        Value::Text(s) => {
            dst.put_u8(VALUE_TEXT);
            put_str(dst, s);
        }
        Value::Bytes(b) => {
            dst.put_u8(VALUE_BYTES);
            dst.put_u32(b.len() as u32);
            dst.put_slice(b);
        }
        Value::Array(values) => {
            check_depth(depth)?;
            dst.put_u8(VALUE_ARRAY);
            put_values(dst, values, depth + 1)?;
        }
        Value::Map(map) => {
            check_depth(depth)?;
            dst.put_u8(VALUE_MAP);
            dst.put_u32(map.len() as u32);
            for (key, v) in map.iter() {
                put_str(dst, key);
                put_value(dst, v, depth + 1)?;
            }
        }
        Value::Address(addr) => {
            dst.put_u8(VALUE_ADDRESS);
            put_str(dst, &addr.to_string());
        }
        Value::Component(addr) => {
            dst.put_u8(VALUE_COMPONENT);
            put_str(dst, &addr.to_string());
        }
        Value::Error(err) => {
            dst.put_u8(VALUE_ERROR);
            put_str(dst, err.kind());
            put_str(dst, err.message());
        }
        Value::Reference(_) => {
            return Err(CodecError::UnsupportedValue {
                type_name: value.type_name(),
            })
        }
    }
    Ok(())
}

/// Decode one complete frame payload into the messages it carries, in order
pub fn decode_messages(payload: &[u8]) -> CodecResult<Vec<Message>> {
    let mut reader = Reader::new(payload);
    let count = reader.u32("message count")? as usize;
    let mut messages = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        messages.push(reader.message()?);
    }
    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes {
            remaining: reader.remaining(),
            messages: messages.len(),
        });
    }
    Ok(messages)
}

/// Bounds-checked cursor over a payload
struct Reader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn need(&self, n: usize, context: &str) -> CodecResult<()> {
        if self.buf.remaining() < n {
            return Err(CodecError::truncated(n, self.buf.remaining(), context));
        }
        Ok(())
    }

    fn u8(&mut self, context: &str) -> CodecResult<u8> {
        self.need(1, context)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self, context: &str) -> CodecResult<u32> {
        self.need(4, context)?;
        Ok(self.buf.get_u32())
    }

    fn i32(&mut self, context: &str) -> CodecResult<i32> {
        self.need(4, context)?;
        Ok(self.buf.get_i32())
    }

    fn i64(&mut self, context: &str) -> CodecResult<i64> {
        self.need(8, context)?;
        Ok(self.buf.get_i64())
    }

    fn f64(&mut self, context: &str) -> CodecResult<f64> {
        self.need(8, context)?;
        Ok(self.buf.get_f64())
    }

    fn bytes(&mut self, context: &str) -> CodecResult<&'a [u8]> {
        let len = self.u32(context)? as usize;
        self.need(len, context)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self, context: &str) -> CodecResult<String> {
        let raw = self.bytes(context)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8 {
                context: context.to_string(),
            })
    }

    fn control_address(&mut self, context: &str) -> CodecResult<ControlAddress> {
        let text = self.string(context)?;
        ControlAddress::parse(&text).map_err(|e| CodecError::invalid_address(text, e))
    }

    fn message(&mut self) -> CodecResult<Message> {
        let offset = self.offset();
        let tag = self.u8("message tag")?;
        let match_id = self.i32("match id")?;
        let message = match tag {
            Message::TAG_SEND => Message::Send {
                match_id,
                quiet: self.u8("quiet flag")? != 0,
                to: self.control_address("Send.to")?,
                from: self.control_address("Send.from")?,
                args: self.values(0)?,
            },
            Message::TAG_SERVICE => Message::Service {
                match_id,
                quiet: self.u8("quiet flag")? != 0,
                service: self.string("Service.service")?,
                control: self.string("Service.control")?,
                from: self.control_address("Service.from")?,
                args: self.values(0)?,
            },
            Message::TAG_REPLY => Message::Reply {
                match_id,
                args: self.values(0)?,
            },
            Message::TAG_ERROR => Message::Error {
                match_id,
                args: self.values(0)?,
            },
            Message::TAG_SYSTEM => Message::System {
                match_id,
                kind: self.string("System.type")?,
                data: self.value(0)?,
            },
            tag => return Err(CodecError::UnknownMessageTag { tag, offset }),
        };
        Ok(message)
    }

    fn values(&mut self, depth: usize) -> CodecResult<Vec<Value>> {
        let count = self.u32("value count")? as usize;
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            values.push(self.value(depth)?);
        }
        Ok(values)
    }

    /// `depth` counts the Arrays and Maps enclosing this value
    fn value(&mut self, depth: usize) -> CodecResult<Value> {
        let offset = self.offset();
        let value = match self.u8("value tag")? {
            VALUE_EMPTY => Value::Empty,
            VALUE_BOOL => Value::Bool(self.u8("Bool")? != 0),
            VALUE_INT => Value::Int(self.i64("Int")?),
            VALUE_NUMBER => Value::Number(self.f64("Number")?),
            VALUE_TEXT => Value::Text(self.string("Text")?.into()),
            VALUE_BYTES => Value::Bytes(self.bytes("Bytes")?.into()),
            VALUE_ARRAY => {
                check_depth(depth)?;
                Value::Array(self.values(depth + 1)?.into())
            }
            VALUE_MAP => {
                check_depth(depth)?;
                let count = self.u32("map size")? as usize;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let key = self.string("map key")?;
                    map.insert(key, self.value(depth + 1)?);
                }
                Value::Map(Arc::new(map))
            }
            VALUE_ADDRESS => Value::Address(self.control_address("Address")?),
            VALUE_COMPONENT => {
                let text = self.string("Component")?;
                let addr = ComponentAddress::parse(&text)
                    .map_err(|e| CodecError::invalid_address(text, e))?;
                Value::Component(addr)
            }
            VALUE_ERROR => {
                let kind = self.string("Error.kind")?;
                let message = self.string("Error.message")?;
                Value::Error(ErrorValue::new(kind, message))
            }
            tag => return Err(CodecError::UnknownValueTag { tag, offset }),
        };
        Ok(value)
    }
}
