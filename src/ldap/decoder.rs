//! Decoder binding the streaming BER engine to the LDAP rule set.

use std::sync::Arc;

use tracing::{trace, warn};

use super::rules::{LdapGrammar, Rule, FILTER_TAGS};
use super::stack::ConstructionStack;
use super::wire::LdapMessagePdu;
use crate::ber::{BerEngine, BerLength, BerVisitor, Progress, TagId, Visit};
use crate::{LdapCodecError, Result};

/// Incremental decoder for one LDAPMessage at a time.
///
/// The decoder owns its engine and construction stack; only the grammar is
/// shared. After a message completes or an error is returned the decoder is
/// reset and ready for the next message.
#[derive(Debug)]
pub struct LdapDecoder {
    grammar: Arc<LdapGrammar>,
    engine: BerEngine,
    stack: ConstructionStack,
    value: Vec<u8>,
    output: Option<LdapMessagePdu>,
}

impl LdapDecoder {
    pub fn new(grammar: Arc<LdapGrammar>) -> Self {
        let config = grammar.config();
        let engine = BerEngine::new(config.engine_limits());
        let stack = ConstructionStack::new(config.empty_filter_sets);
        Self {
            grammar,
            engine,
            stack,
            value: Vec::new(),
            output: None,
        }
    }

    pub fn grammar(&self) -> &Arc<LdapGrammar> {
        &self.grammar
    }

    /// Feeds the next chunk of input. Returns the number of octets consumed
    /// and the message if this chunk completed one. Octets after a completed
    /// message are left unconsumed.
    pub fn feed(&mut self, input: &[u8]) -> Result<(usize, Option<LdapMessagePdu>)> {
        let result = {
            let mut visitor = RuleVisitor {
                grammar: &self.grammar,
                stack: &mut self.stack,
                value: &mut self.value,
                output: &mut self.output,
            };
            self.engine.feed(input, &mut visitor)
        };

        match result {
            Ok((consumed, Progress::NeedMore)) => Ok((consumed, None)),
            Ok((consumed, Progress::Complete)) => {
                let message = self.output.take();
                self.reset();
                match message {
                    Some(message) => Ok((consumed, Some(message))),
                    None => Err(LdapCodecError::StructuralMismatch(
                        "top-level element produced no message".to_string(),
                    )),
                }
            }
            Err(e) => {
                trace!(error = %e, "discarding partial decode state");
                self.reset();
                Err(e)
            }
        }
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.stack.clear();
        self.value.clear();
        self.output = None;
    }

    /// True when no octet of a message is pending.
    pub fn is_idle(&self) -> bool {
        self.engine.is_idle()
    }

    /// Octets still missing from the message in progress, when known.
    pub fn remaining_hint(&self) -> Option<usize> {
        self.engine.remaining_hint()
    }
}

struct RuleVisitor<'a> {
    grammar: &'a LdapGrammar,
    stack: &'a mut ConstructionStack,
    value: &'a mut Vec<u8>,
    output: &'a mut Option<LdapMessagePdu>,
}

impl RuleVisitor<'_> {
    fn collects_value(rules: &[Rule]) -> bool {
        rules.iter().any(|rule| matches!(rule, Rule::Set(_)))
    }

    fn unmatched(&self, path: &[TagId]) -> Result<Visit> {
        let tag = path.last().copied();

        if path.len() == 1 {
            return Err(LdapCodecError::StructuralMismatch(format!(
                "expected an LDAPMessage SEQUENCE, found {}",
                tag.map(|t| t.to_string()).unwrap_or_default()
            )));
        }

        if let (Some(tag), Some(top)) = (tag, self.stack.peek()) {
            if top.expects_filter() {
                if FILTER_TAGS.contains(&tag) {
                    return Err(LdapCodecError::NestingTooDeep(
                        self.grammar.config().max_filter_depth,
                    ));
                }
                return Err(LdapCodecError::UnsupportedFilterChoice(tag.to_string()));
            }
        }

        warn!(path = ?path, "Skipping unrecognized element");
        Ok(Visit::Skip)
    }
}

impl BerVisitor for RuleVisitor<'_> {
    fn on_tag(&mut self, path: &[TagId]) -> Result<Visit> {
        let rules = self.grammar.rules_for(path);
        if rules.is_empty() {
            return self.unmatched(path);
        }

        for rule in rules {
            match rule {
                Rule::Push(shape) => self.stack.push(*shape),
                Rule::MarkReferral => self.stack.mark_referral()?,
                Rule::Set(_) => self.value.clear(),
                Rule::Pop | Rule::Descend => {}
            }
        }
        Ok(Visit::Enter)
    }

    fn on_length(&mut self, path: &[TagId], length: BerLength) -> Result<()> {
        if let Some(len) = length.definite() {
            if Self::collects_value(self.grammar.rules_for(path)) {
                // The engine rejects any element ending past max_pdu_size
                self.value.reserve(len as usize);
            }
        }
        Ok(())
    }

    fn on_value(&mut self, path: &[TagId], chunk: &[u8]) -> Result<()> {
        if Self::collects_value(self.grammar.rules_for(path)) {
            self.value.extend_from_slice(chunk);
        }
        Ok(())
    }

    fn on_finish(&mut self, path: &[TagId]) -> Result<()> {
        for rule in self.grammar.rules_for(path) {
            match rule {
                Rule::Set(field) => self.stack.apply(*field, self.value.as_slice())?,
                Rule::Pop => {
                    if let Some(message) = self.stack.pop()? {
                        *self.output = Some(message);
                    }
                }
                Rule::Push(_) | Rule::Descend | Rule::MarkReferral => {}
            }
        }
        Ok(())
    }
}

/// Decodes exactly one complete LDAPMessage from `bytes`.
pub fn decode_pdu(grammar: &Arc<LdapGrammar>, bytes: &[u8]) -> Result<LdapMessagePdu> {
    let mut decoder = LdapDecoder::new(Arc::clone(grammar));
    let (consumed, message) = decoder.feed(bytes)?;
    match message {
        Some(message) if consumed == bytes.len() => Ok(message),
        Some(_) => Err(LdapCodecError::TrailingData(bytes.len() - consumed)),
        None => Err(LdapCodecError::TruncatedInput {
            needed: decoder.remaining_hint(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodecConfig, EmptyFilterSets};
    use crate::ldap::wire::*;

    fn grammar() -> Arc<LdapGrammar> {
        LdapGrammar::build(&CodecConfig::default()).unwrap()
    }

    // messageID 1, DelRequest "cn=x"
    const DEL: &[u8] = &[0x30, 0x09, 0x02, 0x01, 0x01, 0x4a, 0x04, b'c', b'n', b'=', b'x'];

    #[test]
    fn test_decode_del_request() {
        let message = decode_pdu(&grammar(), DEL).unwrap();
        assert_eq!(message.message_id, 1);
        assert_eq!(message.protocol_op, ProtocolOpPdu::DelRequest(b"cn=x".to_vec()));
        assert!(message.controls.is_empty());
    }

    #[test]
    fn test_decode_one_octet_at_a_time() {
        let mut decoder = LdapDecoder::new(grammar());
        let mut decoded = None;
        for (i, octet) in DEL.iter().enumerate() {
            let (consumed, message) = decoder.feed(std::slice::from_ref(octet)).unwrap();
            assert_eq!(consumed, 1);
            if i + 1 < DEL.len() {
                assert!(message.is_none());
                assert!(!decoder.is_idle());
            } else {
                decoded = message;
            }
        }
        assert_eq!(decoded.unwrap().message_id, 1);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_truncated_and_trailing_input() {
        let g = grammar();
        match decode_pdu(&g, &DEL[..5]) {
            Err(LdapCodecError::TruncatedInput { needed }) => assert_eq!(needed, Some(6)),
            other => panic!("unexpected {:?}", other),
        }

        let mut padded = DEL.to_vec();
        padded.extend_from_slice(&[0x00, 0x00]);
        assert!(matches!(
            decode_pdu(&g, &padded),
            Err(LdapCodecError::TrailingData(2))
        ));
    }

    #[test]
    fn test_non_sequence_root_is_rejected() {
        assert!(matches!(
            decode_pdu(&grammar(), &[0x04, 0x00]),
            Err(LdapCodecError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_op_is_missing_protocol_op() {
        // [APPLICATION 30] is not an LDAPv3 operation
        let bytes = [0x30, 0x05, 0x02, 0x01, 0x07, 0x5e, 0x00];
        assert!(matches!(
            decode_pdu(&grammar(), &bytes),
            Err(LdapCodecError::MissingRequiredField("protocolOp"))
        ));
    }

    #[test]
    fn test_error_resets_decoder() {
        let mut decoder = LdapDecoder::new(grammar());
        assert!(decoder.feed(&[0x04, 0x00]).is_err());
        assert!(decoder.is_idle());
        let (consumed, message) = decoder.feed(DEL).unwrap();
        assert_eq!(consumed, DEL.len());
        assert!(message.is_some());
    }

    fn search_with_filter(filter: &[u8]) -> Vec<u8> {
        let mut op = vec![
            0x04, 0x00, // baseObject ""
            0x0a, 0x01, 0x02, // scope
            0x0a, 0x01, 0x00, // derefAliases
            0x02, 0x01, 0x00, // sizeLimit
            0x02, 0x01, 0x00, // timeLimit
            0x01, 0x01, 0x00, // typesOnly
        ];
        op.extend_from_slice(filter);
        op.extend_from_slice(&[0x30, 0x00]);

        let mut body = vec![0x02, 0x01, 0x02, 0x63, op.len() as u8];
        body.extend_from_slice(&op);
        let mut pdu = vec![0x30, body.len() as u8];
        pdu.extend_from_slice(&body);
        pdu
    }

    #[test]
    fn test_unknown_filter_choice_is_an_error() {
        // [CONTEXT 10] is not a filter choice
        let bytes = search_with_filter(&[0xaa, 0x00]);
        assert!(matches!(
            decode_pdu(&grammar(), &bytes),
            Err(LdapCodecError::UnsupportedFilterChoice(_))
        ));
    }

    #[test]
    fn test_filter_deeper_than_limit() {
        let config = CodecConfig {
            max_filter_depth: 2,
            ..CodecConfig::default()
        };
        let g = LdapGrammar::build(&config).unwrap();

        // (!(!(cn=*)))
        let bytes = search_with_filter(&[0xa2, 0x06, 0xa2, 0x04, 0x87, 0x02, b'c', b'n']);
        assert!(matches!(
            decode_pdu(&g, &bytes),
            Err(LdapCodecError::NestingTooDeep(2))
        ));

        // (!(cn=*)) fits
        let bytes = search_with_filter(&[0xa2, 0x04, 0x87, 0x02, b'c', b'n']);
        let message = decode_pdu(&g, &bytes).unwrap();
        match message.protocol_op {
            ProtocolOpPdu::SearchRequest(search) => assert_eq!(
                search.filter,
                FilterPdu::Not(Box::new(FilterPdu::Present(b"cn".to_vec())))
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_follows_policy() {
        let bytes = search_with_filter(&[0xa0, 0x00]);
        assert!(matches!(
            decode_pdu(&grammar(), &bytes),
            Err(LdapCodecError::InvalidValue(_))
        ));

        let config = CodecConfig {
            empty_filter_sets: EmptyFilterSets::Absolute,
            ..CodecConfig::default()
        };
        let g = LdapGrammar::build(&config).unwrap();
        match decode_pdu(&g, &bytes).unwrap().protocol_op {
            ProtocolOpPdu::SearchRequest(search) => {
                assert_eq!(search.filter, FilterPdu::And(vec![]))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pdu_size_limit() {
        let config = CodecConfig {
            max_pdu_size: 8,
            ..CodecConfig::default()
        };
        let g = LdapGrammar::build(&config).unwrap();
        assert!(matches!(
            decode_pdu(&g, DEL),
            Err(LdapCodecError::PduTooLarge { size: 11, limit: 8 })
        ));
    }

    #[test]
    fn test_size_limit_under_indefinite_envelope() {
        let g = grammar();
        // DelRequest declaring a 2^63-1 octet DN inside an indefinite envelope
        let bytes = [
            0x30, 0x80, 0x02, 0x01, 0x01, 0x4a, 0x88, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff,
        ];
        assert!(matches!(
            decode_pdu(&g, &bytes),
            Err(LdapCodecError::PduTooLarge { limit, .. }) if limit == 16 * 1024 * 1024
        ));

        let config = CodecConfig {
            max_pdu_size: 32,
            ..CodecConfig::default()
        };
        let g = LdapGrammar::build(&config).unwrap();
        let mut bytes = vec![0x30, 0x80, 0x02, 0x01, 0x01, 0x4a, 0x40];
        bytes.extend_from_slice(&[b'x'; 64]);
        bytes.extend_from_slice(&[0x00, 0x00]);
        let mut decoder = LdapDecoder::new(g);
        assert!(matches!(
            decoder.feed(&bytes),
            Err(LdapCodecError::PduTooLarge { size: 71, limit: 32 })
        ));
        assert!(decoder.is_idle());
    }
}
