//! Wire stub encoder. Definite lengths only, fields in grammar order.

use bytes::BytesMut;
use tracing::trace;

use super::wire::*;
use crate::ber::BerWriter;
use crate::Result;

pub fn encode_pdu(message: &LdapMessagePdu) -> Result<BytesMut> {
    let mut writer = BerWriter::with_capacity(64);
    write_message(&mut writer, message)?;
    trace!(
        message_id = message.message_id,
        op = message.protocol_op.name(),
        len = writer.len(),
        "encoded PDU"
    );
    Ok(writer.into_bytes())
}

fn write_message(w: &mut BerWriter, message: &LdapMessagePdu) -> Result<()> {
    w.write_constructed(SEQUENCE, |w| {
        w.write_integer(INTEGER, message.message_id);
        write_protocol_op(w, &message.protocol_op)?;
        if !message.controls.is_empty() {
            w.write_constructed(CONTROLS, |w| {
                for control in &message.controls {
                    write_control(w, control)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    })
}

fn write_control(w: &mut BerWriter, control: &ControlPdu) -> Result<()> {
    w.write_constructed(SEQUENCE, |w| {
        w.write_octet_string(OCTET_STRING, &control.control_type);
        // DEFAULT FALSE
        if control.criticality {
            w.write_boolean(BOOLEAN, true);
        }
        if let Some(value) = &control.control_value {
            w.write_octet_string(OCTET_STRING, value);
        }
        Ok(())
    })
}

fn write_protocol_op(w: &mut BerWriter, op: &ProtocolOpPdu) -> Result<()> {
    let tag = op.tag();
    match op {
        ProtocolOpPdu::BindRequest {
            version,
            name,
            authentication,
        } => w.write_constructed(tag, |w| {
            w.write_integer(INTEGER, *version);
            w.write_octet_string(OCTET_STRING, name);
            match authentication {
                AuthenticationPdu::Simple(password) => {
                    w.write_octet_string(AUTH_SIMPLE, password);
                    Ok(())
                }
                AuthenticationPdu::Sasl {
                    mechanism,
                    credentials,
                } => w.write_constructed(AUTH_SASL, |w| {
                    w.write_octet_string(OCTET_STRING, mechanism);
                    if let Some(credentials) = credentials {
                        w.write_octet_string(OCTET_STRING, credentials);
                    }
                    Ok(())
                }),
            }
        }),
        ProtocolOpPdu::BindResponse {
            result,
            server_sasl_creds,
        } => w.write_constructed(tag, |w| {
            write_result_fields(w, result)?;
            if let Some(creds) = server_sasl_creds {
                w.write_octet_string(SERVER_SASL_CREDS, creds);
            }
            Ok(())
        }),
        ProtocolOpPdu::UnbindRequest => {
            w.write_null(tag);
            Ok(())
        }
        ProtocolOpPdu::SearchRequest(search) => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, &search.base_object);
            w.write_integer(ENUMERATED, search.scope);
            w.write_integer(ENUMERATED, search.deref_aliases);
            w.write_integer(INTEGER, search.size_limit);
            w.write_integer(INTEGER, search.time_limit);
            w.write_boolean(BOOLEAN, search.types_only);
            write_filter(w, &search.filter)?;
            w.write_constructed(SEQUENCE, |w| {
                for attribute in &search.attributes {
                    w.write_octet_string(OCTET_STRING, attribute);
                }
                Ok(())
            })
        }),
        ProtocolOpPdu::SearchResultEntry {
            object_name: name,
            attributes,
        }
        | ProtocolOpPdu::AddRequest {
            entry: name,
            attributes,
        } => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, name);
            w.write_constructed(SEQUENCE, |w| {
                for attribute in attributes {
                    write_attribute(w, attribute)?;
                }
                Ok(())
            })
        }),
        ProtocolOpPdu::SearchResultReference(uris) => w.write_constructed(tag, |w| {
            for uri in uris {
                w.write_octet_string(OCTET_STRING, uri);
            }
            Ok(())
        }),
        ProtocolOpPdu::ModifyRequest { object, changes } => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, object);
            w.write_constructed(SEQUENCE, |w| {
                for change in changes {
                    w.write_constructed(SEQUENCE, |w| {
                        w.write_integer(ENUMERATED, change.operation);
                        write_attribute(w, &change.modification)
                    })?;
                }
                Ok(())
            })
        }),
        ProtocolOpPdu::DelRequest(dn) => {
            w.write_octet_string(tag, dn);
            Ok(())
        }
        ProtocolOpPdu::ModifyDnRequest {
            entry,
            new_rdn,
            delete_old_rdn,
            new_superior,
        } => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, entry);
            w.write_octet_string(OCTET_STRING, new_rdn);
            w.write_boolean(BOOLEAN, *delete_old_rdn);
            if let Some(superior) = new_superior {
                w.write_octet_string(NEW_SUPERIOR, superior);
            }
            Ok(())
        }),
        ProtocolOpPdu::CompareRequest { entry, ava } => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, entry);
            w.write_constructed(SEQUENCE, |w| write_ava_fields(w, ava))
        }),
        ProtocolOpPdu::AbandonRequest(id) => {
            w.write_integer(tag, *id);
            Ok(())
        }
        ProtocolOpPdu::ExtendedRequest {
            request_name,
            request_value,
        } => w.write_constructed(tag, |w| {
            w.write_octet_string(EXTENDED_REQUEST_NAME, request_name);
            if let Some(value) = request_value {
                w.write_octet_string(EXTENDED_REQUEST_VALUE, value);
            }
            Ok(())
        }),
        ProtocolOpPdu::ExtendedResponse {
            result,
            response_name,
            response_value,
        } => w.write_constructed(tag, |w| {
            write_result_fields(w, result)?;
            if let Some(name) = response_name {
                w.write_octet_string(EXTENDED_RESPONSE_NAME, name);
            }
            if let Some(value) = response_value {
                w.write_octet_string(EXTENDED_RESPONSE_VALUE, value);
            }
            Ok(())
        }),
        ProtocolOpPdu::SearchResultDone(result)
        | ProtocolOpPdu::ModifyResponse(result)
        | ProtocolOpPdu::AddResponse(result)
        | ProtocolOpPdu::DelResponse(result)
        | ProtocolOpPdu::ModifyDnResponse(result)
        | ProtocolOpPdu::CompareResponse(result) => {
            w.write_constructed(tag, |w| write_result_fields(w, result))
        }
    }
}

/// The `COMPONENTS OF LDAPResult` part of a response.
fn write_result_fields(w: &mut BerWriter, result: &LdapResultPdu) -> Result<()> {
    w.write_integer(ENUMERATED, result.result_code);
    w.write_octet_string(OCTET_STRING, &result.matched_dn);
    w.write_octet_string(OCTET_STRING, &result.diagnostic_message);
    if let Some(referral) = &result.referral {
        w.write_constructed(REFERRAL, |w| {
            for uri in referral {
                w.write_octet_string(OCTET_STRING, uri);
            }
            Ok(())
        })?;
    }
    Ok(())
}

fn write_attribute(w: &mut BerWriter, attribute: &AttributePdu) -> Result<()> {
    w.write_constructed(SEQUENCE, |w| {
        w.write_octet_string(OCTET_STRING, &attribute.attr_type);
        w.write_constructed(SET, |w| {
            for value in &attribute.vals {
                w.write_octet_string(OCTET_STRING, value);
            }
            Ok(())
        })
    })
}

fn write_ava_fields(w: &mut BerWriter, ava: &AttributeValueAssertionPdu) -> Result<()> {
    w.write_octet_string(OCTET_STRING, &ava.attribute_desc);
    w.write_octet_string(OCTET_STRING, &ava.assertion_value);
    Ok(())
}

fn write_filter(w: &mut BerWriter, filter: &FilterPdu) -> Result<()> {
    let tag = filter.tag();
    match filter {
        FilterPdu::And(children) | FilterPdu::Or(children) => w.write_constructed(tag, |w| {
            for child in children {
                write_filter(w, child)?;
            }
            Ok(())
        }),
        FilterPdu::Not(child) => w.write_constructed(tag, |w| write_filter(w, child)),
        FilterPdu::EqualityMatch(ava)
        | FilterPdu::GreaterOrEqual(ava)
        | FilterPdu::LessOrEqual(ava)
        | FilterPdu::ApproxMatch(ava) => w.write_constructed(tag, |w| write_ava_fields(w, ava)),
        FilterPdu::Substrings {
            attr_type,
            substrings,
        } => w.write_constructed(tag, |w| {
            w.write_octet_string(OCTET_STRING, attr_type);
            w.write_constructed(SEQUENCE, |w| {
                for substring in substrings {
                    match substring {
                        SubstringPdu::Initial(v) => w.write_octet_string(SUBSTRING_INITIAL, v),
                        SubstringPdu::Any(v) => w.write_octet_string(SUBSTRING_ANY, v),
                        SubstringPdu::Final(v) => w.write_octet_string(SUBSTRING_FINAL, v),
                    }
                }
                Ok(())
            })
        }),
        FilterPdu::Present(attr) => {
            w.write_octet_string(tag, attr);
            Ok(())
        }
        FilterPdu::ExtensibleMatch(assertion) => w.write_constructed(tag, |w| {
            if let Some(rule) = &assertion.matching_rule {
                w.write_octet_string(MATCHING_RULE, rule);
            }
            if let Some(attr_type) = &assertion.attr_type {
                w.write_octet_string(MATCHING_TYPE, attr_type);
            }
            w.write_octet_string(MATCH_VALUE, &assertion.match_value);
            if assertion.dn_attributes {
                w.write_boolean(DN_ATTRIBUTES, true);
            }
            Ok(())
        }),
    }
}
