//! Conversion between wire stubs and the domain message model.
//!
//! Octet strings that the protocol defines as LDAPString/LDAPDN/LDAPOID are
//! transcoded as UTF-8; values, credentials and control payloads stay bytes.

use super::filters::{ExtensibleFilter, LdapFilter, SubstringFilter};
use super::protocol::*;
use super::wire::*;
use crate::{LdapCodecError, Result};

fn text(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| LdapCodecError::InvalidValue(format!("{} is not valid UTF-8", what)))
}

fn text_opt(bytes: Option<Vec<u8>>, what: &str) -> Result<Option<String>> {
    bytes.map(|b| text(b, what)).transpose()
}

fn texts(list: Vec<Vec<u8>>, what: &str) -> Result<Vec<String>> {
    list.into_iter().map(|b| text(b, what)).collect()
}

fn unsigned(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| LdapCodecError::InvalidValue(format!("{} {} out of range", what, value)))
}

fn non_empty<'a>(value: &'a str, what: &'static str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(LdapCodecError::MissingRequiredField(what));
    }
    Ok(value)
}

pub fn to_domain(message: LdapMessagePdu) -> Result<LdapMessage> {
    let controls = message
        .controls
        .into_iter()
        .map(control_to_domain)
        .collect::<Result<Vec<_>>>()?;

    Ok(LdapMessage {
        message_id: unsigned(message.message_id, "messageID")?,
        protocol_op: op_to_domain(message.protocol_op)?,
        controls,
    })
}

pub fn to_wire(message: &LdapMessage) -> Result<LdapMessagePdu> {
    let controls = message
        .controls
        .iter()
        .map(control_to_wire)
        .collect::<Result<Vec<_>>>()?;

    Ok(LdapMessagePdu {
        message_id: i64::from(message.message_id),
        protocol_op: op_to_wire(&message.protocol_op)?,
        controls,
    })
}

fn control_to_domain(control: ControlPdu) -> Result<Control> {
    Ok(Control {
        control_type: text(control.control_type, "controlType")?,
        criticality: control.criticality,
        value: control.control_value,
    })
}

fn control_to_wire(control: &Control) -> Result<ControlPdu> {
    Ok(ControlPdu {
        control_type: non_empty(&control.control_type, "controlType")?
            .as_bytes()
            .to_vec(),
        criticality: control.criticality,
        control_value: control.value.clone(),
    })
}

fn result_to_domain(result: LdapResultPdu) -> Result<LdapResult> {
    Ok(LdapResult {
        result_code: LdapResultCode::try_from(result.result_code)?,
        matched_dn: text(result.matched_dn, "matchedDN")?,
        diagnostic_message: text(result.diagnostic_message, "diagnosticMessage")?,
        referral: result
            .referral
            .map(|uris| texts(uris, "referral URI"))
            .transpose()?,
    })
}

fn result_to_wire(result: &LdapResult) -> LdapResultPdu {
    LdapResultPdu {
        result_code: result.result_code.code(),
        matched_dn: result.matched_dn.as_bytes().to_vec(),
        diagnostic_message: result.diagnostic_message.as_bytes().to_vec(),
        referral: result
            .referral
            .as_ref()
            .map(|uris| uris.iter().map(|u| u.as_bytes().to_vec()).collect()),
    }
}

fn attribute_to_domain(attribute: AttributePdu) -> Result<PartialAttribute> {
    Ok(PartialAttribute {
        attr_type: text(attribute.attr_type, "attribute type")?,
        values: attribute.vals,
    })
}

fn attribute_to_wire(attribute: &PartialAttribute) -> AttributePdu {
    AttributePdu {
        attr_type: attribute.attr_type.as_bytes().to_vec(),
        vals: attribute.values.clone(),
    }
}

fn attributes_to_domain(attributes: Vec<AttributePdu>) -> Result<Vec<PartialAttribute>> {
    attributes.into_iter().map(attribute_to_domain).collect()
}

fn op_to_domain(op: ProtocolOpPdu) -> Result<LdapProtocolOp> {
    let op = match op {
        ProtocolOpPdu::BindRequest {
            version,
            name,
            authentication,
        } => LdapProtocolOp::BindRequest {
            version: u8::try_from(version).map_err(|_| {
                LdapCodecError::InvalidValue(format!("bind version {} out of range", version))
            })?,
            dn: text(name, "bind name")?,
            authentication: match authentication {
                AuthenticationPdu::Simple(password) => BindAuthentication::Simple(password),
                AuthenticationPdu::Sasl {
                    mechanism,
                    credentials,
                } => BindAuthentication::Sasl {
                    mechanism: text(mechanism, "SASL mechanism")?,
                    credentials,
                },
            },
        },
        ProtocolOpPdu::BindResponse {
            result,
            server_sasl_creds,
        } => LdapProtocolOp::BindResponse {
            result: result_to_domain(result)?,
            server_sasl_creds,
        },
        ProtocolOpPdu::UnbindRequest => LdapProtocolOp::UnbindRequest,
        ProtocolOpPdu::SearchRequest(search) => {
            let SearchRequestPdu {
                base_object,
                scope,
                deref_aliases,
                size_limit,
                time_limit,
                types_only,
                filter,
                attributes,
            } = *search;
            LdapProtocolOp::SearchRequest {
                base_dn: text(base_object, "baseObject")?,
                scope: SearchScope::try_from(scope)?,
                deref_aliases: DerefAliases::try_from(deref_aliases)?,
                size_limit: unsigned(size_limit, "sizeLimit")?,
                time_limit: unsigned(time_limit, "timeLimit")?,
                types_only,
                filter: filter_to_domain(filter)?,
                attributes: texts(attributes, "attribute selector")?,
            }
        }
        ProtocolOpPdu::SearchResultEntry {
            object_name,
            attributes,
        } => LdapProtocolOp::SearchResultEntry {
            dn: text(object_name, "objectName")?,
            attributes: attributes_to_domain(attributes)?,
        },
        ProtocolOpPdu::SearchResultReference(uris) => LdapProtocolOp::SearchResultReference {
            uris: texts(uris, "reference URI")?,
        },
        ProtocolOpPdu::SearchResultDone(result) => LdapProtocolOp::SearchResultDone {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::ModifyRequest { object, changes } => LdapProtocolOp::ModifyRequest {
            dn: text(object, "object")?,
            changes: changes
                .into_iter()
                .map(|change| {
                    Ok(ModificationItem {
                        operation: ModifyOperation::try_from(change.operation)?,
                        attribute: attribute_to_domain(change.modification)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        },
        ProtocolOpPdu::ModifyResponse(result) => LdapProtocolOp::ModifyResponse {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::AddRequest { entry, attributes } => LdapProtocolOp::AddRequest {
            dn: text(entry, "entry")?,
            attributes: attributes_to_domain(attributes)?,
        },
        ProtocolOpPdu::AddResponse(result) => LdapProtocolOp::AddResponse {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::DelRequest(dn) => LdapProtocolOp::DelRequest {
            dn: text(dn, "DelRequest")?,
        },
        ProtocolOpPdu::DelResponse(result) => LdapProtocolOp::DelResponse {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::ModifyDnRequest {
            entry,
            new_rdn,
            delete_old_rdn,
            new_superior,
        } => LdapProtocolOp::ModifyDnRequest {
            dn: text(entry, "entry")?,
            new_rdn: text(new_rdn, "newrdn")?,
            delete_old_rdn,
            new_superior: text_opt(new_superior, "newSuperior")?,
        },
        ProtocolOpPdu::ModifyDnResponse(result) => LdapProtocolOp::ModifyDnResponse {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::CompareRequest { entry, ava } => LdapProtocolOp::CompareRequest {
            dn: text(entry, "entry")?,
            attribute: text(ava.attribute_desc, "attributeDesc")?,
            value: ava.assertion_value,
        },
        ProtocolOpPdu::CompareResponse(result) => LdapProtocolOp::CompareResponse {
            result: result_to_domain(result)?,
        },
        ProtocolOpPdu::AbandonRequest(id) => LdapProtocolOp::AbandonRequest {
            message_id: unsigned(id, "AbandonRequest")?,
        },
        ProtocolOpPdu::ExtendedRequest {
            request_name,
            request_value,
        } => LdapProtocolOp::ExtendedRequest {
            name: text(request_name, "requestName")?,
            value: request_value,
        },
        ProtocolOpPdu::ExtendedResponse {
            result,
            response_name,
            response_value,
        } => LdapProtocolOp::ExtendedResponse {
            result: result_to_domain(result)?,
            name: text_opt(response_name, "responseName")?,
            value: response_value,
        },
    };
    Ok(op)
}

fn op_to_wire(op: &LdapProtocolOp) -> Result<ProtocolOpPdu> {
    let op = match op {
        LdapProtocolOp::BindRequest {
            version,
            dn,
            authentication,
        } => ProtocolOpPdu::BindRequest {
            version: i64::from(*version),
            name: dn.as_bytes().to_vec(),
            authentication: match authentication {
                BindAuthentication::Simple(password) => AuthenticationPdu::Simple(password.clone()),
                BindAuthentication::Sasl {
                    mechanism,
                    credentials,
                } => AuthenticationPdu::Sasl {
                    mechanism: non_empty(mechanism, "mechanism")?.as_bytes().to_vec(),
                    credentials: credentials.clone(),
                },
            },
        },
        LdapProtocolOp::BindResponse {
            result,
            server_sasl_creds,
        } => ProtocolOpPdu::BindResponse {
            result: result_to_wire(result),
            server_sasl_creds: server_sasl_creds.clone(),
        },
        LdapProtocolOp::UnbindRequest => ProtocolOpPdu::UnbindRequest,
        LdapProtocolOp::SearchRequest {
            base_dn,
            scope,
            deref_aliases,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        } => ProtocolOpPdu::SearchRequest(Box::new(SearchRequestPdu {
            base_object: base_dn.as_bytes().to_vec(),
            scope: *scope as i64,
            deref_aliases: *deref_aliases as i64,
            size_limit: i64::from(*size_limit),
            time_limit: i64::from(*time_limit),
            types_only: *types_only,
            filter: filter_to_wire(filter)?,
            attributes: attributes.iter().map(|a| a.as_bytes().to_vec()).collect(),
        })),
        LdapProtocolOp::SearchResultEntry { dn, attributes } => ProtocolOpPdu::SearchResultEntry {
            object_name: dn.as_bytes().to_vec(),
            attributes: attributes.iter().map(attribute_to_wire).collect(),
        },
        LdapProtocolOp::SearchResultReference { uris } => ProtocolOpPdu::SearchResultReference(
            uris.iter().map(|u| u.as_bytes().to_vec()).collect(),
        ),
        LdapProtocolOp::SearchResultDone { result } => {
            ProtocolOpPdu::SearchResultDone(result_to_wire(result))
        }
        LdapProtocolOp::ModifyRequest { dn, changes } => ProtocolOpPdu::ModifyRequest {
            object: dn.as_bytes().to_vec(),
            changes: changes
                .iter()
                .map(|change| ChangePdu {
                    operation: change.operation as i64,
                    modification: attribute_to_wire(&change.attribute),
                })
                .collect(),
        },
        LdapProtocolOp::ModifyResponse { result } => {
            ProtocolOpPdu::ModifyResponse(result_to_wire(result))
        }
        LdapProtocolOp::AddRequest { dn, attributes } => ProtocolOpPdu::AddRequest {
            entry: dn.as_bytes().to_vec(),
            attributes: attributes.iter().map(attribute_to_wire).collect(),
        },
        LdapProtocolOp::AddResponse { result } => {
            ProtocolOpPdu::AddResponse(result_to_wire(result))
        }
        LdapProtocolOp::DelRequest { dn } => ProtocolOpPdu::DelRequest(dn.as_bytes().to_vec()),
        LdapProtocolOp::DelResponse { result } => {
            ProtocolOpPdu::DelResponse(result_to_wire(result))
        }
        LdapProtocolOp::ModifyDnRequest {
            dn,
            new_rdn,
            delete_old_rdn,
            new_superior,
        } => ProtocolOpPdu::ModifyDnRequest {
            entry: dn.as_bytes().to_vec(),
            new_rdn: new_rdn.as_bytes().to_vec(),
            delete_old_rdn: *delete_old_rdn,
            new_superior: new_superior.as_ref().map(|s| s.as_bytes().to_vec()),
        },
        LdapProtocolOp::ModifyDnResponse { result } => {
            ProtocolOpPdu::ModifyDnResponse(result_to_wire(result))
        }
        LdapProtocolOp::CompareRequest {
            dn,
            attribute,
            value,
        } => ProtocolOpPdu::CompareRequest {
            entry: dn.as_bytes().to_vec(),
            ava: AttributeValueAssertionPdu {
                attribute_desc: non_empty(attribute, "attributeDesc")?.as_bytes().to_vec(),
                assertion_value: value.clone(),
            },
        },
        LdapProtocolOp::CompareResponse { result } => {
            ProtocolOpPdu::CompareResponse(result_to_wire(result))
        }
        LdapProtocolOp::AbandonRequest { message_id } => {
            ProtocolOpPdu::AbandonRequest(i64::from(*message_id))
        }
        LdapProtocolOp::ExtendedRequest { name, value } => ProtocolOpPdu::ExtendedRequest {
            request_name: non_empty(name, "requestName")?.as_bytes().to_vec(),
            request_value: value.clone(),
        },
        LdapProtocolOp::ExtendedResponse {
            result,
            name,
            value,
        } => ProtocolOpPdu::ExtendedResponse {
            result: result_to_wire(result),
            response_name: name.as_ref().map(|n| n.as_bytes().to_vec()),
            response_value: value.clone(),
        },
    };
    Ok(op)
}

// Assertion values are octet strings and pass through untouched
fn ava_to_domain(ava: AttributeValueAssertionPdu) -> Result<(String, Vec<u8>)> {
    Ok((
        text(ava.attribute_desc, "attributeDesc")?,
        ava.assertion_value,
    ))
}

fn ava_to_wire(attr: &str, value: &[u8]) -> Result<AttributeValueAssertionPdu> {
    Ok(AttributeValueAssertionPdu {
        attribute_desc: non_empty(attr, "attributeDesc")?.as_bytes().to_vec(),
        assertion_value: value.to_vec(),
    })
}

pub fn filter_to_domain(filter: FilterPdu) -> Result<LdapFilter> {
    let filter = match filter {
        FilterPdu::And(children) => LdapFilter::And(
            children
                .into_iter()
                .map(filter_to_domain)
                .collect::<Result<Vec<_>>>()?,
        ),
        FilterPdu::Or(children) => LdapFilter::Or(
            children
                .into_iter()
                .map(filter_to_domain)
                .collect::<Result<Vec<_>>>()?,
        ),
        FilterPdu::Not(child) => LdapFilter::Not(Box::new(filter_to_domain(*child)?)),
        FilterPdu::EqualityMatch(ava) => {
            let (attr, value) = ava_to_domain(ava)?;
            LdapFilter::Equality(attr, value)
        }
        FilterPdu::GreaterOrEqual(ava) => {
            let (attr, value) = ava_to_domain(ava)?;
            LdapFilter::GreaterOrEqual(attr, value)
        }
        FilterPdu::LessOrEqual(ava) => {
            let (attr, value) = ava_to_domain(ava)?;
            LdapFilter::LessOrEqual(attr, value)
        }
        FilterPdu::ApproxMatch(ava) => {
            let (attr, value) = ava_to_domain(ava)?;
            LdapFilter::Approximate(attr, value)
        }
        FilterPdu::Substrings {
            attr_type,
            substrings,
        } => {
            let mut substring = SubstringFilter::default();
            for component in substrings {
                match component {
                    SubstringPdu::Initial(v) => substring.initial = Some(v),
                    SubstringPdu::Any(v) => substring.any.push(v),
                    SubstringPdu::Final(v) => substring.final_ = Some(v),
                }
            }
            LdapFilter::Substring(text(attr_type, "substrings type")?, substring)
        }
        FilterPdu::Present(attr) => LdapFilter::Present(text(attr, "present")?),
        FilterPdu::ExtensibleMatch(assertion) => LdapFilter::Extensible(ExtensibleFilter {
            attribute: text_opt(assertion.attr_type, "type")?,
            matching_rule: text_opt(assertion.matching_rule, "matchingRule")?,
            value: assertion.match_value,
            dn_attributes: assertion.dn_attributes,
        }),
    };
    Ok(filter)
}

pub fn filter_to_wire(filter: &LdapFilter) -> Result<FilterPdu> {
    let filter = match filter {
        // Empty sets are emitted as-is
        LdapFilter::And(children) => FilterPdu::And(
            children
                .iter()
                .map(filter_to_wire)
                .collect::<Result<Vec<_>>>()?,
        ),
        LdapFilter::Or(children) => FilterPdu::Or(
            children
                .iter()
                .map(filter_to_wire)
                .collect::<Result<Vec<_>>>()?,
        ),
        LdapFilter::Not(child) => FilterPdu::Not(Box::new(filter_to_wire(child)?)),
        LdapFilter::Equality(attr, value) => FilterPdu::EqualityMatch(ava_to_wire(attr, value)?),
        LdapFilter::GreaterOrEqual(attr, value) => {
            FilterPdu::GreaterOrEqual(ava_to_wire(attr, value)?)
        }
        LdapFilter::LessOrEqual(attr, value) => FilterPdu::LessOrEqual(ava_to_wire(attr, value)?),
        LdapFilter::Approximate(attr, value) => FilterPdu::ApproxMatch(ava_to_wire(attr, value)?),
        LdapFilter::Substring(attr, substring) => {
            let mut substrings = Vec::with_capacity(substring.any.len() + 2);
            if let Some(initial) = &substring.initial {
                substrings.push(SubstringPdu::Initial(initial.clone()));
            }
            substrings.extend(
                substring
                    .any
                    .iter()
                    .map(|v| SubstringPdu::Any(v.clone())),
            );
            if let Some(final_) = &substring.final_ {
                substrings.push(SubstringPdu::Final(final_.clone()));
            }
            if substrings.is_empty() {
                return Err(LdapCodecError::MissingRequiredField("substrings"));
            }
            FilterPdu::Substrings {
                attr_type: non_empty(attr, "attributeDesc")?.as_bytes().to_vec(),
                substrings,
            }
        }
        LdapFilter::Present(attr) => {
            FilterPdu::Present(non_empty(attr, "attributeDesc")?.as_bytes().to_vec())
        }
        LdapFilter::Extensible(ext) => {
            if ext.attribute.is_none() && ext.matching_rule.is_none() {
                return Err(LdapCodecError::MissingRequiredField("matchingRule or type"));
            }
            FilterPdu::ExtensibleMatch(MatchingRuleAssertionPdu {
                matching_rule: ext.matching_rule.as_ref().map(|r| r.as_bytes().to_vec()),
                attr_type: ext.attribute.as_ref().map(|a| a.as_bytes().to_vec()),
                match_value: ext.value.clone(),
                dn_attributes: ext.dn_attributes,
            })
        }
    };
    Ok(filter)
}
