use bytes::{BufMut, BytesMut};

use super::length::BerLength;
use super::tag::TagId;
use crate::Result;

/// Definite-length BER writer.
///
/// Constructed values are written by serializing their children into a
/// scratch writer first, so the aggregate length is known before the header.
#[derive(Debug, Default)]
pub struct BerWriter {
    buf: BytesMut,
}

impl BerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    fn write_header(&mut self, tag: TagId, length: usize) {
        tag.write_to(&mut self.buf);
        BerLength::write_definite(&mut self.buf, length);
    }

    pub fn write_primitive(&mut self, tag: TagId, content: &[u8]) {
        self.write_header(tag, content.len());
        self.buf.put_slice(content);
    }

    pub fn write_octet_string(&mut self, tag: TagId, value: &[u8]) {
        self.write_primitive(tag, value);
    }

    /// Writes INTEGER/ENUMERATED content in minimal two's complement form.
    pub fn write_integer(&mut self, tag: TagId, value: i64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.write_primitive(tag, &bytes[start..]);
    }

    pub fn write_boolean(&mut self, tag: TagId, value: bool) {
        self.write_primitive(tag, &[if value { 0xff } else { 0x00 }]);
    }

    pub fn write_null(&mut self, tag: TagId) {
        self.write_primitive(tag, &[]);
    }

    /// Writes a constructed element whose children are produced by `body`.
    pub fn write_constructed<F>(&mut self, tag: TagId, body: F) -> Result<()>
    where
        F: FnOnce(&mut BerWriter) -> Result<()>,
    {
        let mut inner = BerWriter::new();
        body(&mut inner)?;
        self.write_header(tag, inner.len());
        self.buf.put(inner.buf);
        Ok(())
    }
}

/// Decodes INTEGER/ENUMERATED content octets.
pub fn decode_integer(content: &[u8]) -> Option<i64> {
    if content.is_empty() || content.len() > 8 {
        return None;
    }
    let negative = content[0] & 0x80 != 0;
    let init = if negative { -1i64 } else { 0 };
    Some(
        content
            .iter()
            .fold(init, |acc, &b| (acc << 8) | b as i64),
    )
}

/// Decodes BOOLEAN content octets; any non-zero octet is TRUE.
pub fn decode_boolean(content: &[u8]) -> Option<bool> {
    match content {
        [b] => Some(*b != 0),
        _ => None,
    }
}
