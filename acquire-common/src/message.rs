//! Line-oriented record codec for the method protocol.
//!
//! Both pipe directions carry newline-delimited key/value blocks:
//!
//! ```text
//! 201 URI Done
//! URI: http://example.org/pool/x.deb
//! SHA256-Hash: 9f86d08...
//!
//! ```
//!
//! The first line is a three-digit status code followed by a free-text
//! reason; every following line is a `Key: Value` pair; a blank line ends
//! the record. Continuation lines (leading whitespace) extend the previous
//! value. Tag lookup is case-insensitive on the key.
//!
//! Decoding is incremental: an incomplete record stays in the partial
//! buffer until more bytes arrive, so the codec never blocks the pump.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Errors raised while decoding records off the wire.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The status line did not start with a decimal code.
    #[error("invalid status line from method: {0:?}")]
    InvalidStatusLine(String),

    #[error("i/o error while framing records")]
    Io(#[from] std::io::Error),
}

/// Parse the relaxed boolean syntax used by the wire protocol and the
/// configuration tree. Returns `None` for anything unrecognised.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" | "with" | "enable" => Some(true),
        "0" | "no" | "false" | "off" | "without" | "disable" => Some(false),
        _ => None,
    }
}

/// One protocol record: status code, reason phrase and ordered tags.
///
/// Tags keep their arrival order and may repeat (`Config-Item` does);
/// [`Record::get`] returns the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    code: u16,
    reason: String,
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            fields: Vec::new(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Append a tag, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a tag in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// First value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Like [`Record::get`] but with a fallback.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Boolean tag with the protocol's relaxed syntax.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(parse_bool).unwrap_or(default)
    }

    /// Unsigned numeric tag; unparseable values fall back to `default`.
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Render the record to wire format, including the terminating blank
    /// line. Values containing newlines become continuation lines.
    pub fn encode_to(&self, dst: &mut BytesMut) {
        dst.put_slice(self.code.to_string().as_bytes());
        if !self.reason.is_empty() {
            dst.put_u8(b' ');
            dst.put_slice(self.reason.as_bytes());
        }
        dst.put_u8(b'\n');
        for (key, value) in &self.fields {
            let mut lines = value.split('\n');
            dst.put_slice(key.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(lines.next().unwrap_or("").as_bytes());
            dst.put_u8(b'\n');
            for continuation in lines {
                dst.put_u8(b' ');
                dst.put_slice(continuation.as_bytes());
                dst.put_u8(b'\n');
            }
        }
        dst.put_u8(b'\n');
    }

    /// Convenience wrapper around [`Record::encode_to`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf);
        buf.to_vec()
    }

    fn parse(block: &str) -> Result<Self, RecordError> {
        let mut lines = block.lines();
        let status = lines.next().unwrap_or("");
        let digits: String = status.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(RecordError::InvalidStatusLine(status.to_string()));
        }
        let code: u16 = digits
            .parse()
            .map_err(|_| RecordError::InvalidStatusLine(status.to_string()))?;
        let reason = status[digits.len()..].trim_start().to_string();

        let mut fields: Vec<(String, String)> = Vec::new();
        for line in lines {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of the previous value.
                if let Some((_, value)) = fields.last_mut() {
                    value.push('\n');
                    value.push_str(line.trim_start());
                }
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                // Methods are allowed to emit free-form noise; skip it.
                continue;
            };
            fields.push((key.trim().to_string(), value.trim_start().to_string()));
        }
        Ok(Self {
            code,
            reason,
            fields,
        })
    }
}

/// Incremental record framer over a byte stream.
///
/// Records are delimited by a blank line, so the decoder only needs to
/// scan for `\n\n`; everything before it is one complete record.
#[derive(Debug, Default)]
pub struct RecordCodec {
    scanned: usize,
}

impl RecordCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = RecordError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>, RecordError> {
        let start = self.scanned.saturating_sub(1);
        if let Some(pos) = src[start..]
            .windows(2)
            .position(|w| w == b"\n\n")
            .map(|p| p + start)
        {
            self.scanned = 0;
            let block = src.split_to(pos + 2);
            let text = String::from_utf8_lossy(&block);
            return Record::parse(text.trim_end_matches('\n')).map(Some);
        }
        self.scanned = src.len();
        Ok(None)
    }
}

impl Encoder<&Record> for RecordCodec {
    type Error = RecordError;

    fn encode(&mut self, item: &Record, dst: &mut BytesMut) -> Result<(), RecordError> {
        item.encode_to(dst);
        Ok(())
    }
}
