// src/core/heartbeat/codec.rs

//! The character encoder/decoder pair and the line-framed codec used by heartbeat
//! sessions. Pings are written exactly as configured; replies are single lines
//! terminated by `\n` (an optional preceding `\r` is stripped).

use crate::core::errors::HeartbeatError;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::str::FromStr;
use tokio_util::codec::{Decoder, Encoder};

/// The character sets a heartbeat session can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
    Latin1,
}

impl Charset {
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Ascii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Appends `text` to `dst`, failing on the first character the charset cannot represent.
    pub fn encode(&self, text: &str, dst: &mut BytesMut) -> Result<(), HeartbeatError> {
        match self {
            Charset::Utf8 => {
                dst.extend_from_slice(text.as_bytes());
            }
            Charset::Ascii | Charset::Latin1 => {
                let limit = if *self == Charset::Ascii { 0x7F } else { 0xFF };
                dst.reserve(text.len());
                for ch in text.chars() {
                    if ch as u32 > limit {
                        return Err(HeartbeatError::Unencodable {
                            charset: self.name(),
                            ch,
                        });
                    }
                    dst.put_u8(ch as u8);
                }
            }
        }
        Ok(())
    }

    /// Decodes `bytes`. Malformed input is replaced rather than rejected: a garbled
    /// reply is still a reply.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

impl FromStr for Charset {
    type Err = HeartbeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            other => Err(HeartbeatError::Config(format!("unsupported charset '{other}'"))),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `tokio_util::codec` implementation for ping messages and their reply lines.
#[derive(Debug, Clone)]
pub struct PingCodec {
    charset: Charset,
    /// The longest reply line accepted, terminator included.
    max_line: usize,
}

impl PingCodec {
    pub fn new(charset: Charset, max_line: usize) -> Self {
        Self { charset, max_line }
    }
}

impl Encoder<String> for PingCodec {
    type Error = HeartbeatError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.charset.encode(&item, dst)
    }
}

impl Decoder for PingCodec {
    type Item = String;
    type Error = HeartbeatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() >= self.max_line {
                return Err(HeartbeatError::LineTooLong(self.max_line));
            }
            return Ok(None);
        };
        if pos + 1 > self.max_line {
            return Err(HeartbeatError::LineTooLong(self.max_line));
        }

        let line = src.split_to(pos + 1);
        let mut end = line.len() - 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        let reply = self.charset.decode(&line[..end]);
        Ok(Some(reply))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // A peer that closes mid-line has not answered.
                buf.advance(buf.len());
                Ok(None)
            }
        }
    }
}
