//! Typed construction stack.
//!
//! One [`Frame`] per object under construction. Frames start with every
//! optional field at its grammar default, take scalar fields from `Set`
//! rules, and on `Pop` are finished into a [`Built`] value that the frame
//! below absorbs. A field or child arriving at a frame that has no place for
//! it is a [`LdapCodecError::StructuralMismatch`].

use super::rules::{AvaKind, Field, ResponseKind, SetKind, Shape};
use super::wire::*;
use crate::ber::writer::{decode_boolean, decode_integer};
use crate::config::EmptyFilterSets;
use crate::{LdapCodecError, Result};

fn integer(value: &[u8], what: &str) -> Result<i64> {
    decode_integer(value)
        .ok_or_else(|| LdapCodecError::InvalidValue(format!("malformed INTEGER in {}", what)))
}

fn boolean(value: &[u8], what: &str) -> Result<bool> {
    decode_boolean(value)
        .ok_or_else(|| LdapCodecError::InvalidValue(format!("malformed BOOLEAN in {}", what)))
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<()> {
    if slot.is_some() {
        return Err(LdapCodecError::StructuralMismatch(format!(
            "duplicate {}",
            what
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn required<T>(slot: Option<T>, what: &'static str) -> Result<T> {
    slot.ok_or(LdapCodecError::MissingRequiredField(what))
}

/// `LDAPResult` fields shared by every response.
#[derive(Debug, Default)]
pub struct ResultFrame {
    result_code: Option<i64>,
    matched_dn: Option<Vec<u8>>,
    diagnostic_message: Option<Vec<u8>>,
    referral: Option<Vec<Vec<u8>>>,
}

impl ResultFrame {
    /// matchedDN and diagnosticMessage share a tag. They are told apart by
    /// position only: the first octet string after resultCode is matchedDN,
    /// the second is diagnosticMessage, and a third one is rejected.
    fn push_octets(&mut self, value: &[u8]) -> Result<()> {
        if self.result_code.is_none() {
            return Err(LdapCodecError::StructuralMismatch(
                "LDAPResult octet string before resultCode".to_string(),
            ));
        }
        if self.matched_dn.is_none() {
            self.matched_dn = Some(value.to_vec());
        } else if self.diagnostic_message.is_none() {
            self.diagnostic_message = Some(value.to_vec());
        } else {
            return Err(LdapCodecError::StructuralMismatch(
                "unexpected third octet string in LDAPResult".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(self) -> Result<LdapResultPdu> {
        Ok(LdapResultPdu {
            result_code: required(self.result_code, "resultCode")?,
            matched_dn: self.matched_dn.unwrap_or_default(),
            diagnostic_message: self.diagnostic_message.unwrap_or_default(),
            referral: self.referral,
        })
    }
}

#[derive(Debug, Default)]
pub struct SearchFrame {
    base_object: Option<Vec<u8>>,
    scope: Option<i64>,
    deref_aliases: Option<i64>,
    size_limit: Option<i64>,
    time_limit: Option<i64>,
    types_only: Option<bool>,
    filter: Option<FilterPdu>,
    attributes: Vec<Vec<u8>>,
}

#[derive(Debug)]
pub enum Frame {
    Message {
        message_id: Option<i64>,
        protocol_op: Option<ProtocolOpPdu>,
        controls: Vec<ControlPdu>,
    },
    Control {
        control_type: Option<Vec<u8>>,
        criticality: Option<bool>,
        value: Option<Vec<u8>>,
    },
    BindRequest {
        version: Option<i64>,
        name: Option<Vec<u8>>,
        authentication: Option<AuthenticationPdu>,
    },
    Sasl {
        mechanism: Option<Vec<u8>>,
        credentials: Option<Vec<u8>>,
    },
    Response {
        kind: ResponseKind,
        result: ResultFrame,
        server_sasl_creds: Option<Vec<u8>>,
        response_name: Option<Vec<u8>>,
        response_value: Option<Vec<u8>>,
    },
    SearchRequest(Box<SearchFrame>),
    Entry {
        add: bool,
        name: Option<Vec<u8>>,
        attributes: Vec<AttributePdu>,
    },
    Reference {
        uris: Vec<Vec<u8>>,
    },
    ModifyRequest {
        object: Option<Vec<u8>>,
        changes: Vec<ChangePdu>,
    },
    Change {
        operation: Option<i64>,
        modification: Option<AttributePdu>,
    },
    Attribute {
        attr_type: Option<Vec<u8>>,
        vals: Vec<Vec<u8>>,
    },
    DelRequest {
        dn: Option<Vec<u8>>,
    },
    ModifyDnRequest {
        entry: Option<Vec<u8>>,
        new_rdn: Option<Vec<u8>>,
        delete_old_rdn: Option<bool>,
        new_superior: Option<Vec<u8>>,
    },
    CompareRequest {
        entry: Option<Vec<u8>>,
        ava: Option<AttributeValueAssertionPdu>,
    },
    /// An assertion; `filter` is `None` inside a CompareRequest.
    Ava {
        filter: Option<AvaKind>,
        desc: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
    },
    AbandonRequest {
        id: Option<i64>,
    },
    UnbindRequest,
    ExtendedRequest {
        name: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
    },
    FilterSet {
        kind: SetKind,
        children: Vec<FilterPdu>,
    },
    FilterNot {
        child: Option<FilterPdu>,
    },
    FilterSubstrings {
        attr_type: Option<Vec<u8>>,
        substrings: Vec<SubstringPdu>,
    },
    FilterPresent {
        attr: Option<Vec<u8>>,
    },
    FilterExtensible {
        matching_rule: Option<Vec<u8>>,
        attr_type: Option<Vec<u8>>,
        match_value: Option<Vec<u8>>,
        dn_attributes: Option<bool>,
    },
}

/// A finished frame, ready to be absorbed by its parent.
#[derive(Debug)]
pub enum Built {
    Message(LdapMessagePdu),
    Control(ControlPdu),
    Op(ProtocolOpPdu),
    Auth(AuthenticationPdu),
    Attribute(AttributePdu),
    Change(ChangePdu),
    Ava(AttributeValueAssertionPdu),
    Filter(FilterPdu),
}

impl Built {
    fn name(&self) -> &'static str {
        match self {
            Built::Message(_) => "LDAPMessage",
            Built::Control(_) => "Control",
            Built::Op(op) => op.name(),
            Built::Auth(_) => "AuthenticationChoice",
            Built::Attribute(_) => "PartialAttribute",
            Built::Change(_) => "change",
            Built::Ava(_) => "AttributeValueAssertion",
            Built::Filter(_) => "Filter",
        }
    }
}

impl Frame {
    pub fn new(shape: Shape) -> Self {
        match shape {
            Shape::Message => Frame::Message {
                message_id: None,
                protocol_op: None,
                controls: Vec::new(),
            },
            Shape::Control => Frame::Control {
                control_type: None,
                criticality: None,
                value: None,
            },
            Shape::BindRequest => Frame::BindRequest {
                version: None,
                name: None,
                authentication: None,
            },
            Shape::Sasl => Frame::Sasl {
                mechanism: None,
                credentials: None,
            },
            Shape::Response(kind) => Frame::Response {
                kind,
                result: ResultFrame::default(),
                server_sasl_creds: None,
                response_name: None,
                response_value: None,
            },
            Shape::SearchRequest => Frame::SearchRequest(Box::default()),
            Shape::SearchResultEntry => Frame::Entry {
                add: false,
                name: None,
                attributes: Vec::new(),
            },
            Shape::AddRequest => Frame::Entry {
                add: true,
                name: None,
                attributes: Vec::new(),
            },
            Shape::SearchResultReference => Frame::Reference { uris: Vec::new() },
            Shape::ModifyRequest => Frame::ModifyRequest {
                object: None,
                changes: Vec::new(),
            },
            Shape::Change => Frame::Change {
                operation: None,
                modification: None,
            },
            Shape::Attribute => Frame::Attribute {
                attr_type: None,
                vals: Vec::new(),
            },
            Shape::DelRequest => Frame::DelRequest { dn: None },
            Shape::ModifyDnRequest => Frame::ModifyDnRequest {
                entry: None,
                new_rdn: None,
                delete_old_rdn: None,
                new_superior: None,
            },
            Shape::CompareRequest => Frame::CompareRequest {
                entry: None,
                ava: None,
            },
            Shape::Ava => Frame::Ava {
                filter: None,
                desc: None,
                value: None,
            },
            Shape::FilterAva(kind) => Frame::Ava {
                filter: Some(kind),
                desc: None,
                value: None,
            },
            Shape::AbandonRequest => Frame::AbandonRequest { id: None },
            Shape::UnbindRequest => Frame::UnbindRequest,
            Shape::ExtendedRequest => Frame::ExtendedRequest {
                name: None,
                value: None,
            },
            Shape::FilterSet(kind) => Frame::FilterSet {
                kind,
                children: Vec::new(),
            },
            Shape::FilterNot => Frame::FilterNot { child: None },
            Shape::FilterSubstrings => Frame::FilterSubstrings {
                attr_type: None,
                substrings: Vec::new(),
            },
            Shape::FilterPresent => Frame::FilterPresent { attr: None },
            Shape::FilterExtensible => Frame::FilterExtensible {
                matching_rule: None,
                attr_type: None,
                match_value: None,
                dn_attributes: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Message { .. } => "LDAPMessage",
            Frame::Control { .. } => "Control",
            Frame::BindRequest { .. } => "BindRequest",
            Frame::Sasl { .. } => "SaslCredentials",
            Frame::Response { .. } => "LDAPResult",
            Frame::SearchRequest(_) => "SearchRequest",
            Frame::Entry { add: false, .. } => "SearchResultEntry",
            Frame::Entry { add: true, .. } => "AddRequest",
            Frame::Reference { .. } => "SearchResultReference",
            Frame::ModifyRequest { .. } => "ModifyRequest",
            Frame::Change { .. } => "change",
            Frame::Attribute { .. } => "PartialAttribute",
            Frame::DelRequest { .. } => "DelRequest",
            Frame::ModifyDnRequest { .. } => "ModifyDNRequest",
            Frame::CompareRequest { .. } => "CompareRequest",
            Frame::Ava { .. } => "AttributeValueAssertion",
            Frame::AbandonRequest { .. } => "AbandonRequest",
            Frame::UnbindRequest => "UnbindRequest",
            Frame::ExtendedRequest { .. } => "ExtendedRequest",
            Frame::FilterSet { kind: SetKind::And, .. } => "and",
            Frame::FilterSet { kind: SetKind::Or, .. } => "or",
            Frame::FilterNot { .. } => "not",
            Frame::FilterSubstrings { .. } => "substrings",
            Frame::FilterPresent { .. } => "present",
            Frame::FilterExtensible { .. } => "extensibleMatch",
        }
    }

    /// True when the next child of this frame must be a filter choice.
    pub fn expects_filter(&self) -> bool {
        match self {
            Frame::FilterSet { .. } => true,
            Frame::FilterNot { child } => child.is_none(),
            Frame::SearchRequest(search) => search.types_only.is_some() && search.filter.is_none(),
            _ => false,
        }
    }

    /// Delivers a decoded scalar to this frame.
    pub fn apply(&mut self, field: Field, value: &[u8]) -> Result<()> {
        match (self, field) {
            (Frame::Message { message_id, .. }, Field::MessageId) => {
                set_once(message_id, integer(value, "messageID")?, "messageID")
            }

            (
                Frame::Control {
                    control_type,
                    value: control_value,
                    ..
                },
                Field::ControlOctets,
            ) => {
                if control_type.is_none() {
                    *control_type = Some(value.to_vec());
                    Ok(())
                } else {
                    set_once(control_value, value.to_vec(), "controlValue")
                }
            }
            (Frame::Control { criticality, .. }, Field::Criticality) => {
                set_once(criticality, boolean(value, "criticality")?, "criticality")
            }

            (Frame::BindRequest { version, .. }, Field::BindVersion) => {
                set_once(version, integer(value, "version")?, "version")
            }
            (Frame::BindRequest { name, .. }, Field::BindName) => {
                set_once(name, value.to_vec(), "bind name")
            }
            (Frame::BindRequest { authentication, .. }, Field::SimpleCredentials) => set_once(
                authentication,
                AuthenticationPdu::Simple(value.to_vec()),
                "authentication",
            ),
            (
                Frame::Sasl {
                    mechanism,
                    credentials,
                },
                Field::SaslOctets,
            ) => {
                if mechanism.is_none() {
                    *mechanism = Some(value.to_vec());
                    Ok(())
                } else {
                    set_once(credentials, value.to_vec(), "SASL credentials")
                }
            }

            (Frame::Response { result, .. }, Field::ResultCode) => set_once(
                &mut result.result_code,
                integer(value, "resultCode")?,
                "resultCode",
            ),
            (Frame::Response { result, .. }, Field::ResultOctets) => result.push_octets(value),
            (Frame::Response { result, .. }, Field::ReferralUri) => {
                result
                    .referral
                    .get_or_insert_with(Vec::new)
                    .push(value.to_vec());
                Ok(())
            }
            (
                Frame::Response {
                    kind: ResponseKind::Bind,
                    server_sasl_creds,
                    ..
                },
                Field::ServerSaslCreds,
            ) => set_once(server_sasl_creds, value.to_vec(), "serverSaslCreds"),
            (
                Frame::Response {
                    kind: ResponseKind::Extended,
                    response_name,
                    ..
                },
                Field::ResponseName,
            ) => set_once(response_name, value.to_vec(), "responseName"),
            (
                Frame::Response {
                    kind: ResponseKind::Extended,
                    response_value,
                    ..
                },
                Field::ResponseValue,
            ) => set_once(response_value, value.to_vec(), "responseValue"),

            (Frame::SearchRequest(search), field) => search.apply(field, value),

            (Frame::Entry { name, .. }, Field::ObjectName) => {
                set_once(name, value.to_vec(), "objectName")
            }
            (Frame::Reference { uris }, Field::ReferenceUri) => {
                uris.push(value.to_vec());
                Ok(())
            }
            (Frame::ModifyRequest { object, .. }, Field::ObjectName) => {
                set_once(object, value.to_vec(), "object")
            }
            (Frame::Change { operation, .. }, Field::ChangeOperation) => {
                set_once(operation, integer(value, "operation")?, "operation")
            }
            (Frame::Attribute { attr_type, .. }, Field::AttributeType) => {
                set_once(attr_type, value.to_vec(), "attribute type")
            }
            (Frame::Attribute { vals, .. }, Field::AttributeValue) => {
                vals.push(value.to_vec());
                Ok(())
            }
            (Frame::DelRequest { dn }, Field::DelDn) => set_once(dn, value.to_vec(), "DelRequest"),

            (Frame::ModifyDnRequest { entry, new_rdn, .. }, Field::ModifyDnOctets) => {
                if entry.is_none() {
                    *entry = Some(value.to_vec());
                    Ok(())
                } else {
                    set_once(new_rdn, value.to_vec(), "newrdn")
                }
            }
            (Frame::ModifyDnRequest { delete_old_rdn, .. }, Field::DeleteOldRdn) => set_once(
                delete_old_rdn,
                boolean(value, "deleteoldrdn")?,
                "deleteoldrdn",
            ),
            (Frame::ModifyDnRequest { new_superior, .. }, Field::NewSuperior) => {
                set_once(new_superior, value.to_vec(), "newSuperior")
            }

            (Frame::CompareRequest { entry, .. }, Field::ObjectName) => {
                set_once(entry, value.to_vec(), "entry")
            }
            (
                Frame::Ava {
                    desc,
                    value: assertion,
                    ..
                },
                Field::AvaOctets,
            ) => {
                if desc.is_none() {
                    *desc = Some(value.to_vec());
                    Ok(())
                } else {
                    set_once(assertion, value.to_vec(), "assertionValue")
                }
            }

            (Frame::AbandonRequest { id }, Field::AbandonId) => {
                set_once(id, integer(value, "AbandonRequest")?, "AbandonRequest")
            }
            (Frame::ExtendedRequest { name, .. }, Field::RequestName) => {
                set_once(name, value.to_vec(), "requestName")
            }
            (Frame::ExtendedRequest { value: slot, .. }, Field::RequestValue) => {
                set_once(slot, value.to_vec(), "requestValue")
            }

            (Frame::FilterSubstrings { attr_type, .. }, Field::SubstringType) => {
                set_once(attr_type, value.to_vec(), "substrings type")
            }
            (Frame::FilterSubstrings { substrings, .. }, Field::SubstringInitial) => {
                if !substrings.is_empty() {
                    return Err(LdapCodecError::InvalidValue(
                        "initial substring must come first".to_string(),
                    ));
                }
                substrings.push(SubstringPdu::Initial(value.to_vec()));
                Ok(())
            }
            (
                Frame::FilterSubstrings { substrings, .. },
                field @ (Field::SubstringAny | Field::SubstringFinal),
            ) => {
                if matches!(substrings.last(), Some(SubstringPdu::Final(_))) {
                    return Err(LdapCodecError::InvalidValue(
                        "final substring must come last".to_string(),
                    ));
                }
                substrings.push(if field == Field::SubstringAny {
                    SubstringPdu::Any(value.to_vec())
                } else {
                    SubstringPdu::Final(value.to_vec())
                });
                Ok(())
            }
            (Frame::FilterPresent { attr }, Field::PresentType) => {
                set_once(attr, value.to_vec(), "present")
            }
            (Frame::FilterExtensible { matching_rule, .. }, Field::MatchingRule) => {
                set_once(matching_rule, value.to_vec(), "matchingRule")
            }
            (Frame::FilterExtensible { attr_type, .. }, Field::MatchingType) => {
                set_once(attr_type, value.to_vec(), "type")
            }
            (Frame::FilterExtensible { match_value, .. }, Field::MatchValue) => {
                set_once(match_value, value.to_vec(), "matchValue")
            }
            (Frame::FilterExtensible { dn_attributes, .. }, Field::DnAttributes) => set_once(
                dn_attributes,
                boolean(value, "dnAttributes")?,
                "dnAttributes",
            ),

            (frame, field) => Err(LdapCodecError::StructuralMismatch(format!(
                "{} has no field {:?}",
                frame.name(),
                field
            ))),
        }
    }

    /// Records that the optional referral of an LDAPResult is present.
    pub fn mark_referral(&mut self) -> Result<()> {
        match self {
            Frame::Response { result, .. } => {
                set_once(&mut result.referral, Vec::new(), "referral")
            }
            frame => Err(LdapCodecError::StructuralMismatch(format!(
                "{} cannot carry a referral",
                frame.name()
            ))),
        }
    }

    /// Absorbs a finished child.
    pub fn attach(&mut self, child: Built) -> Result<()> {
        match (self, child) {
            (Frame::Message { controls, .. }, Built::Control(control)) => {
                controls.push(control);
                Ok(())
            }
            (Frame::Message { protocol_op, .. }, Built::Op(op)) => {
                set_once(protocol_op, op, "protocolOp")
            }
            (Frame::BindRequest { authentication, .. }, Built::Auth(auth)) => {
                set_once(authentication, auth, "authentication")
            }
            (Frame::Entry { attributes, .. }, Built::Attribute(attribute)) => {
                attributes.push(attribute);
                Ok(())
            }
            (Frame::ModifyRequest { changes, .. }, Built::Change(change)) => {
                changes.push(change);
                Ok(())
            }
            (Frame::Change { modification, .. }, Built::Attribute(attribute)) => {
                set_once(modification, attribute, "modification")
            }
            (Frame::CompareRequest { ava, .. }, Built::Ava(assertion)) => {
                set_once(ava, assertion, "ava")
            }
            (Frame::SearchRequest(search), Built::Filter(filter)) => {
                set_once(&mut search.filter, filter, "filter")
            }
            (Frame::FilterSet { children, .. }, Built::Filter(filter)) => {
                children.push(filter);
                Ok(())
            }
            (Frame::FilterNot { child }, Built::Filter(filter)) => {
                set_once(child, filter, "not operand")
            }
            (frame, child) => Err(LdapCodecError::StructuralMismatch(format!(
                "{} cannot hold a {}",
                frame.name(),
                child.name()
            ))),
        }
    }

    /// Turns a fully populated frame into its wire value.
    pub fn finish(self, empty_filter_sets: EmptyFilterSets) -> Result<Built> {
        let built = match self {
            Frame::Message {
                message_id,
                protocol_op,
                controls,
            } => Built::Message(LdapMessagePdu {
                message_id: required(message_id, "messageID")?,
                protocol_op: required(protocol_op, "protocolOp")?,
                controls,
            }),
            Frame::Control {
                control_type,
                criticality,
                value,
            } => Built::Control(ControlPdu {
                control_type: required(control_type, "controlType")?,
                criticality: criticality.unwrap_or(false),
                control_value: value,
            }),
            Frame::BindRequest {
                version,
                name,
                authentication,
            } => Built::Op(ProtocolOpPdu::BindRequest {
                version: required(version, "version")?,
                name: required(name, "name")?,
                authentication: required(authentication, "authentication")?,
            }),
            Frame::Sasl {
                mechanism,
                credentials,
            } => Built::Auth(AuthenticationPdu::Sasl {
                mechanism: required(mechanism, "mechanism")?,
                credentials,
            }),
            Frame::Response {
                kind,
                result,
                server_sasl_creds,
                response_name,
                response_value,
            } => {
                let result = result.finish()?;
                Built::Op(match kind {
                    ResponseKind::Bind => ProtocolOpPdu::BindResponse {
                        result,
                        server_sasl_creds,
                    },
                    ResponseKind::SearchDone => ProtocolOpPdu::SearchResultDone(result),
                    ResponseKind::Modify => ProtocolOpPdu::ModifyResponse(result),
                    ResponseKind::Add => ProtocolOpPdu::AddResponse(result),
                    ResponseKind::Del => ProtocolOpPdu::DelResponse(result),
                    ResponseKind::ModifyDn => ProtocolOpPdu::ModifyDnResponse(result),
                    ResponseKind::Compare => ProtocolOpPdu::CompareResponse(result),
                    ResponseKind::Extended => ProtocolOpPdu::ExtendedResponse {
                        result,
                        response_name,
                        response_value,
                    },
                })
            }
            Frame::SearchRequest(search) => Built::Op(ProtocolOpPdu::SearchRequest(Box::new(
                search.finish()?,
            ))),
            Frame::Entry {
                add,
                name,
                attributes,
            } => {
                let name = required(name, "objectName")?;
                Built::Op(if add {
                    ProtocolOpPdu::AddRequest {
                        entry: name,
                        attributes,
                    }
                } else {
                    ProtocolOpPdu::SearchResultEntry {
                        object_name: name,
                        attributes,
                    }
                })
            }
            Frame::Reference { uris } => Built::Op(ProtocolOpPdu::SearchResultReference(uris)),
            Frame::ModifyRequest { object, changes } => Built::Op(ProtocolOpPdu::ModifyRequest {
                object: required(object, "object")?,
                changes,
            }),
            Frame::Change {
                operation,
                modification,
            } => Built::Change(ChangePdu {
                operation: required(operation, "operation")?,
                modification: required(modification, "modification")?,
            }),
            Frame::Attribute { attr_type, vals } => Built::Attribute(AttributePdu {
                attr_type: required(attr_type, "attribute type")?,
                vals,
            }),
            Frame::DelRequest { dn } => Built::Op(ProtocolOpPdu::DelRequest(required(
                dn,
                "DelRequest",
            )?)),
            Frame::ModifyDnRequest {
                entry,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => Built::Op(ProtocolOpPdu::ModifyDnRequest {
                entry: required(entry, "entry")?,
                new_rdn: required(new_rdn, "newrdn")?,
                delete_old_rdn: required(delete_old_rdn, "deleteoldrdn")?,
                new_superior,
            }),
            Frame::CompareRequest { entry, ava } => Built::Op(ProtocolOpPdu::CompareRequest {
                entry: required(entry, "entry")?,
                ava: required(ava, "ava")?,
            }),
            Frame::Ava {
                filter,
                desc,
                value,
            } => {
                let ava = AttributeValueAssertionPdu {
                    attribute_desc: required(desc, "attributeDesc")?,
                    assertion_value: required(value, "assertionValue")?,
                };
                match filter {
                    None => Built::Ava(ava),
                    Some(AvaKind::Equality) => Built::Filter(FilterPdu::EqualityMatch(ava)),
                    Some(AvaKind::GreaterOrEqual) => {
                        Built::Filter(FilterPdu::GreaterOrEqual(ava))
                    }
                    Some(AvaKind::LessOrEqual) => Built::Filter(FilterPdu::LessOrEqual(ava)),
                    Some(AvaKind::Approx) => Built::Filter(FilterPdu::ApproxMatch(ava)),
                }
            }
            Frame::AbandonRequest { id } => Built::Op(ProtocolOpPdu::AbandonRequest(required(
                id,
                "AbandonRequest",
            )?)),
            Frame::UnbindRequest => Built::Op(ProtocolOpPdu::UnbindRequest),
            Frame::ExtendedRequest { name, value } => Built::Op(ProtocolOpPdu::ExtendedRequest {
                request_name: required(name, "requestName")?,
                request_value: value,
            }),
            Frame::FilterSet { kind, children } => {
                if children.is_empty() && empty_filter_sets == EmptyFilterSets::Reject {
                    return Err(LdapCodecError::InvalidValue(format!(
                        "empty {} filter set",
                        if kind == SetKind::And { "AND" } else { "OR" }
                    )));
                }
                Built::Filter(match kind {
                    SetKind::And => FilterPdu::And(children),
                    SetKind::Or => FilterPdu::Or(children),
                })
            }
            Frame::FilterNot { child } => {
                Built::Filter(FilterPdu::Not(Box::new(required(child, "not operand")?)))
            }
            Frame::FilterSubstrings {
                attr_type,
                substrings,
            } => {
                let attr_type = required(attr_type, "substrings type")?;
                if substrings.is_empty() {
                    return Err(LdapCodecError::InvalidValue(
                        "substrings filter without components".to_string(),
                    ));
                }
                Built::Filter(FilterPdu::Substrings {
                    attr_type,
                    substrings,
                })
            }
            Frame::FilterPresent { attr } => {
                Built::Filter(FilterPdu::Present(required(attr, "present")?))
            }
            Frame::FilterExtensible {
                matching_rule,
                attr_type,
                match_value,
                dn_attributes,
            } => {
                if matching_rule.is_none() && attr_type.is_none() {
                    return Err(LdapCodecError::MissingRequiredField("matchingRule or type"));
                }
                Built::Filter(FilterPdu::ExtensibleMatch(MatchingRuleAssertionPdu {
                    matching_rule,
                    attr_type,
                    match_value: required(match_value, "matchValue")?,
                    dn_attributes: dn_attributes.unwrap_or(false),
                }))
            }
        };
        Ok(built)
    }
}

impl SearchFrame {
    fn apply(&mut self, field: Field, value: &[u8]) -> Result<()> {
        match field {
            Field::SearchBase => set_once(&mut self.base_object, value.to_vec(), "baseObject"),
            // scope, then derefAliases
            Field::SearchEnumerated => {
                let v = integer(value, "SearchRequest")?;
                if self.scope.is_none() {
                    self.scope = Some(v);
                    Ok(())
                } else {
                    set_once(&mut self.deref_aliases, v, "derefAliases")
                }
            }
            // sizeLimit, then timeLimit
            Field::SearchLimit => {
                let v = integer(value, "SearchRequest")?;
                if self.size_limit.is_none() {
                    self.size_limit = Some(v);
                    Ok(())
                } else {
                    set_once(&mut self.time_limit, v, "timeLimit")
                }
            }
            Field::TypesOnly => set_once(
                &mut self.types_only,
                boolean(value, "typesOnly")?,
                "typesOnly",
            ),
            Field::SelectedAttribute => {
                self.attributes.push(value.to_vec());
                Ok(())
            }
            other => Err(LdapCodecError::StructuralMismatch(format!(
                "SearchRequest has no field {:?}",
                other
            ))),
        }
    }

    fn finish(self) -> Result<SearchRequestPdu> {
        Ok(SearchRequestPdu {
            base_object: required(self.base_object, "baseObject")?,
            scope: required(self.scope, "scope")?,
            deref_aliases: required(self.deref_aliases, "derefAliases")?,
            size_limit: required(self.size_limit, "sizeLimit")?,
            time_limit: required(self.time_limit, "timeLimit")?,
            types_only: required(self.types_only, "typesOnly")?,
            filter: required(self.filter, "filter")?,
            attributes: self.attributes,
        })
    }
}

/// Per-decode stack of frames. Cleared on reset or error.
#[derive(Debug)]
pub struct ConstructionStack {
    frames: Vec<Frame>,
    empty_filter_sets: EmptyFilterSets,
}

impl ConstructionStack {
    pub fn new(empty_filter_sets: EmptyFilterSets) -> Self {
        Self {
            frames: Vec::with_capacity(16),
            empty_filter_sets,
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn peek(&self) -> Option<&Frame> {
        self.frames.last()
    }

    fn top_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| {
            LdapCodecError::StructuralMismatch("construction stack is empty".to_string())
        })
    }

    pub fn push(&mut self, shape: Shape) {
        self.frames.push(Frame::new(shape));
    }

    pub fn apply(&mut self, field: Field, value: &[u8]) -> Result<()> {
        self.top_mut()?.apply(field, value)
    }

    pub fn mark_referral(&mut self) -> Result<()> {
        self.top_mut()?.mark_referral()
    }

    /// Pops and finishes the top frame and hands it to the frame below.
    /// Returns the message once the root frame closes.
    pub fn pop(&mut self) -> Result<Option<LdapMessagePdu>> {
        let frame = self.frames.pop().ok_or_else(|| {
            LdapCodecError::StructuralMismatch("pop on an empty construction stack".to_string())
        })?;
        let built = frame.finish(self.empty_filter_sets)?;

        match self.frames.last_mut() {
            Some(parent) => {
                parent.attach(built)?;
                Ok(None)
            }
            None => match built {
                Built::Message(message) => Ok(Some(message)),
                other => Err(LdapCodecError::StructuralMismatch(format!(
                    "{} outside an LDAPMessage",
                    other.name()
                ))),
            },
        }
    }
}
