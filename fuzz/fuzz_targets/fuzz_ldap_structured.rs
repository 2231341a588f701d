#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

use ldapwire::ldap::{
    BindAuthentication, Control, DerefAliases, LdapFilter, LdapProtocolOp, LdapResult,
    LdapResultCode, ModificationItem, ModifyOperation, PartialAttribute, SearchScope,
    SubstringFilter,
};
use ldapwire::{decode, encode, CodecConfig, LdapGrammar, LdapMessage};

fn grammar() -> &'static Arc<LdapGrammar> {
    static GRAMMAR: OnceLock<Arc<LdapGrammar>> = OnceLock::new();
    GRAMMAR.get_or_init(|| LdapGrammar::build(&CodecConfig::default()).unwrap())
}

// Generators for well-formed domain messages
#[derive(Arbitrary, Debug)]
struct FuzzLdapMessage {
    message_id: u32,
    operation: FuzzOperation,
    controls: Vec<(String, bool, Option<Vec<u8>>)>,
}

#[derive(Arbitrary, Debug)]
enum FuzzOperation {
    BindRequest {
        dn: String,
        password: Vec<u8>,
        sasl: Option<(String, Option<Vec<u8>>)>,
    },
    SearchRequest {
        base_dn: String,
        scope: u8,
        deref: u8,
        size_limit: u32,
        time_limit: u32,
        types_only: bool,
        filter: FuzzFilter,
        attributes: Vec<String>,
    },
    ModifyRequest {
        dn: String,
        changes: Vec<(u8, String, Vec<Vec<u8>>)>,
    },
    CompareRequest {
        dn: String,
        attribute: String,
        value: Vec<u8>,
    },
    Response {
        code: u8,
        matched_dn: String,
        message: String,
        referral: Option<Vec<String>>,
    },
    ExtendedRequest {
        name: String,
        value: Option<Vec<u8>>,
    },
}

#[derive(Arbitrary, Debug)]
enum FuzzFilter {
    Present(String),
    Equality(String, Vec<u8>),
    Substring(String, Option<Vec<u8>>, Vec<Vec<u8>>, Option<Vec<u8>>),
    GreaterOrEqual(String, Vec<u8>),
    Approximate(String, Vec<u8>),
    And(Vec<FuzzFilter>),
    Or(Vec<FuzzFilter>),
    Not(Box<FuzzFilter>),
}

fn attr(name: &str) -> String {
    if name.is_empty() {
        "cn".to_string()
    } else {
        name.to_string()
    }
}

impl FuzzFilter {
    fn to_filter(&self, depth: usize) -> LdapFilter {
        if depth > 8 {
            return LdapFilter::Present("objectClass".to_string());
        }
        match self {
            FuzzFilter::Present(a) => LdapFilter::Present(attr(a)),
            FuzzFilter::Equality(a, v) => LdapFilter::Equality(attr(a), v.clone()),
            FuzzFilter::Substring(a, initial, any, final_) => {
                let mut substring = SubstringFilter {
                    initial: initial.clone(),
                    any: any.clone(),
                    final_: final_.clone(),
                };
                if substring.initial.is_none()
                    && substring.any.is_empty()
                    && substring.final_.is_none()
                {
                    substring.any.push(Vec::new());
                }
                LdapFilter::Substring(attr(a), substring)
            }
            FuzzFilter::GreaterOrEqual(a, v) => LdapFilter::GreaterOrEqual(attr(a), v.clone()),
            FuzzFilter::Approximate(a, v) => LdapFilter::Approximate(attr(a), v.clone()),
            // Empty sets are rejected on decode with the default policy
            FuzzFilter::And(children) if !children.is_empty() => {
                LdapFilter::And(children.iter().map(|c| c.to_filter(depth + 1)).collect())
            }
            FuzzFilter::Or(children) if !children.is_empty() => {
                LdapFilter::Or(children.iter().map(|c| c.to_filter(depth + 1)).collect())
            }
            FuzzFilter::And(_) | FuzzFilter::Or(_) => LdapFilter::Present(String::from("cn")),
            FuzzFilter::Not(child) => LdapFilter::Not(Box::new(child.to_filter(depth + 1))),
        }
    }
}

impl FuzzLdapMessage {
    fn to_message(&self) -> LdapMessage {
        let protocol_op = match &self.operation {
            FuzzOperation::BindRequest { dn, password, sasl } => LdapProtocolOp::BindRequest {
                version: 3,
                dn: dn.clone(),
                authentication: match sasl {
                    Some((mechanism, credentials)) => BindAuthentication::Sasl {
                        mechanism: attr(mechanism),
                        credentials: credentials.clone(),
                    },
                    None => BindAuthentication::Simple(password.clone()),
                },
            },
            FuzzOperation::SearchRequest {
                base_dn,
                scope,
                deref,
                size_limit,
                time_limit,
                types_only,
                filter,
                attributes,
            } => LdapProtocolOp::SearchRequest {
                base_dn: base_dn.clone(),
                scope: SearchScope::try_from(i64::from(scope % 3)).unwrap(),
                deref_aliases: DerefAliases::try_from(i64::from(deref % 4)).unwrap(),
                size_limit: *size_limit,
                time_limit: *time_limit,
                types_only: *types_only,
                filter: filter.to_filter(0),
                attributes: attributes.clone(),
            },
            FuzzOperation::ModifyRequest { dn, changes } => LdapProtocolOp::ModifyRequest {
                dn: dn.clone(),
                changes: changes
                    .iter()
                    .map(|(op, name, values)| ModificationItem {
                        operation: ModifyOperation::try_from(i64::from(op % 3)).unwrap(),
                        attribute: PartialAttribute::new(name.clone(), values.clone()),
                    })
                    .collect(),
            },
            FuzzOperation::CompareRequest {
                dn,
                attribute,
                value,
            } => LdapProtocolOp::CompareRequest {
                dn: dn.clone(),
                attribute: attr(attribute),
                value: value.clone(),
            },
            FuzzOperation::Response {
                code,
                matched_dn,
                message,
                referral,
            } => {
                let codes = LdapResultCode::ALL;
                LdapProtocolOp::SearchResultDone {
                    result: LdapResult {
                        result_code: codes[*code as usize % codes.len()],
                        matched_dn: matched_dn.clone(),
                        diagnostic_message: message.clone(),
                        referral: referral.clone(),
                    },
                }
            }
            FuzzOperation::ExtendedRequest { name, value } => LdapProtocolOp::ExtendedRequest {
                name: attr(name),
                value: value.clone(),
            },
        };

        let controls = self
            .controls
            .iter()
            .map(|(control_type, criticality, value)| Control {
                control_type: attr(control_type),
                criticality: *criticality,
                value: value.clone(),
            })
            .collect();

        LdapMessage::new(self.message_id, protocol_op).with_controls(controls)
    }
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    if let Ok(generated) = FuzzLdapMessage::arbitrary(&mut u) {
        let message = generated.to_message();
        let bytes = encode(&message).unwrap();

        // Whole-buffer decode and a decode split at every chunk boundary
        // must both give back the original message
        assert_eq!(decode(grammar(), &bytes).unwrap(), message);

        let mut decoder = ldapwire::ldap::LdapDecoder::new(grammar().clone());
        let mut decoded = None;
        for chunk in bytes.chunks(3) {
            let (consumed, pdu) = decoder.feed(chunk).unwrap();
            assert_eq!(consumed, chunk.len());
            if pdu.is_some() {
                decoded = pdu;
            }
        }
        let decoded = ldapwire::ldap::to_domain(decoded.unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
});
