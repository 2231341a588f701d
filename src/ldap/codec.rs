//! Codec entry points and `tokio_util` stream framing.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::decoder::{decode_pdu, LdapDecoder};
use super::encoder::encode_pdu;
use super::protocol::LdapMessage;
use super::rules::LdapGrammar;
use super::transform::{to_domain, to_wire};
use crate::config::CodecConfig;
use crate::{LdapCodecError, Result};

/// Decodes one complete PDU into a domain message. `bytes` must hold exactly
/// one LDAPMessage.
pub fn decode(grammar: &Arc<LdapGrammar>, bytes: &[u8]) -> Result<LdapMessage> {
    let pdu = decode_pdu(grammar, bytes)?;
    let message = to_domain(pdu)?;
    debug!(
        message_id = message.message_id,
        op = message.protocol_op.name(),
        "Decoded LDAP message"
    );
    Ok(message)
}

pub fn encode(message: &LdapMessage) -> Result<BytesMut> {
    let bytes = encode_pdu(&to_wire(message)?)?;
    debug!(
        message_id = message.message_id,
        op = message.protocol_op.name(),
        len = bytes.len(),
        "Encoded LDAP message"
    );
    Ok(bytes)
}

/// Streaming LDAP codec for `Framed`/`FramedRead`.
///
/// Bytes are handed to the BER engine as they arrive and removed from the
/// read buffer once processed, so a large PDU is never held in the buffer
/// as a whole.
#[derive(Debug)]
pub struct LdapCodec {
    decoder: LdapDecoder,
}

impl LdapCodec {
    pub fn new(grammar: Arc<LdapGrammar>) -> Self {
        Self {
            decoder: LdapDecoder::new(grammar),
        }
    }

    pub fn with_config(config: &CodecConfig) -> Result<Self> {
        Ok(Self::new(LdapGrammar::build(config)?))
    }

    pub fn grammar(&self) -> &Arc<LdapGrammar> {
        self.decoder.grammar()
    }
}

impl Decoder for LdapCodec {
    type Item = LdapMessage;
    type Error = LdapCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        let (consumed, pdu) = self.decoder.feed(&src[..])?;
        src.advance(consumed);

        let Some(pdu) = pdu else {
            return Ok(None);
        };

        let message = to_domain(pdu)?;
        debug!(
            message_id = message.message_id,
            op = message.protocol_op.name(),
            "Received LDAP message"
        );
        Ok(Some(message))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if self.decoder.is_idle() && buf.is_empty() => Ok(None),
            None => {
                let needed = self.decoder.remaining_hint();
                self.decoder.reset();
                buf.clear();
                Err(LdapCodecError::TruncatedInput { needed })
            }
        }
    }
}

impl Encoder<LdapMessage> for LdapCodec {
    type Error = LdapCodecError;

    fn encode(&mut self, item: LdapMessage, dst: &mut BytesMut) -> Result<()> {
        let bytes = encode(&item)?;
        dst.reserve(bytes.len());
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
