//! Wire stubs: types shaped exactly like the RFC 4511 ASN.1 productions.
//!
//! These are the intermediate target of the decoder and the source of the
//! encoder. Octet strings stay as raw bytes and enumerations stay as raw
//! integers; interpretation happens in the transform layer.

use crate::ber::TagId;

pub const SEQUENCE: TagId = TagId::from_octet(0x30);
pub const SET: TagId = TagId::from_octet(0x31);
pub const INTEGER: TagId = TagId::from_octet(0x02);
pub const OCTET_STRING: TagId = TagId::from_octet(0x04);
pub const BOOLEAN: TagId = TagId::from_octet(0x01);
pub const ENUMERATED: TagId = TagId::from_octet(0x0a);

pub const LDAP_BIND_REQUEST: TagId = TagId::from_octet(0x60);
pub const LDAP_BIND_RESPONSE: TagId = TagId::from_octet(0x61);
pub const LDAP_UNBIND_REQUEST: TagId = TagId::from_octet(0x42);
pub const LDAP_SEARCH_REQUEST: TagId = TagId::from_octet(0x63);
pub const LDAP_SEARCH_RESULT_ENTRY: TagId = TagId::from_octet(0x64);
pub const LDAP_SEARCH_RESULT_DONE: TagId = TagId::from_octet(0x65);
pub const LDAP_SEARCH_RESULT_REFERENCE: TagId = TagId::from_octet(0x73);
pub const LDAP_MODIFY_REQUEST: TagId = TagId::from_octet(0x66);
pub const LDAP_MODIFY_RESPONSE: TagId = TagId::from_octet(0x67);
pub const LDAP_ADD_REQUEST: TagId = TagId::from_octet(0x68);
pub const LDAP_ADD_RESPONSE: TagId = TagId::from_octet(0x69);
pub const LDAP_DEL_REQUEST: TagId = TagId::from_octet(0x4a);
pub const LDAP_DEL_RESPONSE: TagId = TagId::from_octet(0x6b);
pub const LDAP_MODIFY_DN_REQUEST: TagId = TagId::from_octet(0x6c);
pub const LDAP_MODIFY_DN_RESPONSE: TagId = TagId::from_octet(0x6d);
pub const LDAP_COMPARE_REQUEST: TagId = TagId::from_octet(0x6e);
pub const LDAP_COMPARE_RESPONSE: TagId = TagId::from_octet(0x6f);
pub const LDAP_ABANDON_REQUEST: TagId = TagId::from_octet(0x50);
pub const LDAP_EXTENDED_REQUEST: TagId = TagId::from_octet(0x77);
pub const LDAP_EXTENDED_RESPONSE: TagId = TagId::from_octet(0x78);

// Context-specific tags inside the envelope and operations
pub const CONTROLS: TagId = TagId::from_octet(0xa0);
pub const AUTH_SIMPLE: TagId = TagId::from_octet(0x80);
pub const AUTH_SASL: TagId = TagId::from_octet(0xa3);
pub const REFERRAL: TagId = TagId::from_octet(0xa3);
pub const SERVER_SASL_CREDS: TagId = TagId::from_octet(0x87);
pub const NEW_SUPERIOR: TagId = TagId::from_octet(0x80);
pub const EXTENDED_REQUEST_NAME: TagId = TagId::from_octet(0x80);
pub const EXTENDED_REQUEST_VALUE: TagId = TagId::from_octet(0x81);
pub const EXTENDED_RESPONSE_NAME: TagId = TagId::from_octet(0x8a);
pub const EXTENDED_RESPONSE_VALUE: TagId = TagId::from_octet(0x8b);

// Filter CHOICE
pub const FILTER_AND: TagId = TagId::from_octet(0xa0);
pub const FILTER_OR: TagId = TagId::from_octet(0xa1);
pub const FILTER_NOT: TagId = TagId::from_octet(0xa2);
pub const FILTER_EQUALITY: TagId = TagId::from_octet(0xa3);
pub const FILTER_SUBSTRINGS: TagId = TagId::from_octet(0xa4);
pub const FILTER_GREATER_OR_EQUAL: TagId = TagId::from_octet(0xa5);
pub const FILTER_LESS_OR_EQUAL: TagId = TagId::from_octet(0xa6);
pub const FILTER_PRESENT: TagId = TagId::from_octet(0x87);
pub const FILTER_APPROX: TagId = TagId::from_octet(0xa8);
pub const FILTER_EXTENSIBLE: TagId = TagId::from_octet(0xa9);

pub const SUBSTRING_INITIAL: TagId = TagId::from_octet(0x80);
pub const SUBSTRING_ANY: TagId = TagId::from_octet(0x81);
pub const SUBSTRING_FINAL: TagId = TagId::from_octet(0x82);

pub const MATCHING_RULE: TagId = TagId::from_octet(0x81);
pub const MATCHING_TYPE: TagId = TagId::from_octet(0x82);
pub const MATCH_VALUE: TagId = TagId::from_octet(0x83);
pub const DN_ATTRIBUTES: TagId = TagId::from_octet(0x84);

/// `LDAPMessage ::= SEQUENCE { messageID, protocolOp, controls [0] OPTIONAL }`
#[derive(Debug, Clone, PartialEq)]
pub struct LdapMessagePdu {
    pub message_id: i64,
    pub protocol_op: ProtocolOpPdu,
    pub controls: Vec<ControlPdu>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPdu {
    pub control_type: Vec<u8>,
    pub criticality: bool,
    pub control_value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdapResultPdu {
    pub result_code: i64,
    pub matched_dn: Vec<u8>,
    pub diagnostic_message: Vec<u8>,
    /// `None` when the `[3]` element is absent; `Some(vec![])` when present
    /// but empty.
    pub referral: Option<Vec<Vec<u8>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticationPdu {
    Simple(Vec<u8>),
    Sasl {
        mechanism: Vec<u8>,
        credentials: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValueAssertionPdu {
    pub attribute_desc: Vec<u8>,
    pub assertion_value: Vec<u8>,
}

/// `PartialAttribute`/`Attribute`: a type and its values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributePdu {
    pub attr_type: Vec<u8>,
    pub vals: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangePdu {
    pub operation: i64,
    pub modification: AttributePdu,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubstringPdu {
    Initial(Vec<u8>),
    Any(Vec<u8>),
    Final(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchingRuleAssertionPdu {
    pub matching_rule: Option<Vec<u8>>,
    pub attr_type: Option<Vec<u8>>,
    pub match_value: Vec<u8>,
    pub dn_attributes: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterPdu {
    And(Vec<FilterPdu>),
    Or(Vec<FilterPdu>),
    Not(Box<FilterPdu>),
    EqualityMatch(AttributeValueAssertionPdu),
    Substrings {
        attr_type: Vec<u8>,
        substrings: Vec<SubstringPdu>,
    },
    GreaterOrEqual(AttributeValueAssertionPdu),
    LessOrEqual(AttributeValueAssertionPdu),
    Present(Vec<u8>),
    ApproxMatch(AttributeValueAssertionPdu),
    ExtensibleMatch(MatchingRuleAssertionPdu),
}

impl FilterPdu {
    pub fn tag(&self) -> TagId {
        match self {
            FilterPdu::And(_) => FILTER_AND,
            FilterPdu::Or(_) => FILTER_OR,
            FilterPdu::Not(_) => FILTER_NOT,
            FilterPdu::EqualityMatch(_) => FILTER_EQUALITY,
            FilterPdu::Substrings { .. } => FILTER_SUBSTRINGS,
            FilterPdu::GreaterOrEqual(_) => FILTER_GREATER_OR_EQUAL,
            FilterPdu::LessOrEqual(_) => FILTER_LESS_OR_EQUAL,
            FilterPdu::Present(_) => FILTER_PRESENT,
            FilterPdu::ApproxMatch(_) => FILTER_APPROX,
            FilterPdu::ExtensibleMatch(_) => FILTER_EXTENSIBLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequestPdu {
    pub base_object: Vec<u8>,
    pub scope: i64,
    pub deref_aliases: i64,
    pub size_limit: i64,
    pub time_limit: i64,
    pub types_only: bool,
    pub filter: FilterPdu,
    pub attributes: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolOpPdu {
    BindRequest {
        version: i64,
        name: Vec<u8>,
        authentication: AuthenticationPdu,
    },
    BindResponse {
        result: LdapResultPdu,
        server_sasl_creds: Option<Vec<u8>>,
    },
    UnbindRequest,
    SearchRequest(Box<SearchRequestPdu>),
    SearchResultEntry {
        object_name: Vec<u8>,
        attributes: Vec<AttributePdu>,
    },
    SearchResultDone(LdapResultPdu),
    SearchResultReference(Vec<Vec<u8>>),
    ModifyRequest {
        object: Vec<u8>,
        changes: Vec<ChangePdu>,
    },
    ModifyResponse(LdapResultPdu),
    AddRequest {
        entry: Vec<u8>,
        attributes: Vec<AttributePdu>,
    },
    AddResponse(LdapResultPdu),
    DelRequest(Vec<u8>),
    DelResponse(LdapResultPdu),
    ModifyDnRequest {
        entry: Vec<u8>,
        new_rdn: Vec<u8>,
        delete_old_rdn: bool,
        new_superior: Option<Vec<u8>>,
    },
    ModifyDnResponse(LdapResultPdu),
    CompareRequest {
        entry: Vec<u8>,
        ava: AttributeValueAssertionPdu,
    },
    CompareResponse(LdapResultPdu),
    AbandonRequest(i64),
    ExtendedRequest {
        request_name: Vec<u8>,
        request_value: Option<Vec<u8>>,
    },
    ExtendedResponse {
        result: LdapResultPdu,
        response_name: Option<Vec<u8>>,
        response_value: Option<Vec<u8>>,
    },
}

impl ProtocolOpPdu {
    pub fn tag(&self) -> TagId {
        match self {
            ProtocolOpPdu::BindRequest { .. } => LDAP_BIND_REQUEST,
            ProtocolOpPdu::BindResponse { .. } => LDAP_BIND_RESPONSE,
            ProtocolOpPdu::UnbindRequest => LDAP_UNBIND_REQUEST,
            ProtocolOpPdu::SearchRequest(_) => LDAP_SEARCH_REQUEST,
            ProtocolOpPdu::SearchResultEntry { .. } => LDAP_SEARCH_RESULT_ENTRY,
            ProtocolOpPdu::SearchResultDone(_) => LDAP_SEARCH_RESULT_DONE,
            ProtocolOpPdu::SearchResultReference(_) => LDAP_SEARCH_RESULT_REFERENCE,
            ProtocolOpPdu::ModifyRequest { .. } => LDAP_MODIFY_REQUEST,
            ProtocolOpPdu::ModifyResponse(_) => LDAP_MODIFY_RESPONSE,
            ProtocolOpPdu::AddRequest { .. } => LDAP_ADD_REQUEST,
            ProtocolOpPdu::AddResponse(_) => LDAP_ADD_RESPONSE,
            ProtocolOpPdu::DelRequest(_) => LDAP_DEL_REQUEST,
            ProtocolOpPdu::DelResponse(_) => LDAP_DEL_RESPONSE,
            ProtocolOpPdu::ModifyDnRequest { .. } => LDAP_MODIFY_DN_REQUEST,
            ProtocolOpPdu::ModifyDnResponse(_) => LDAP_MODIFY_DN_RESPONSE,
            ProtocolOpPdu::CompareRequest { .. } => LDAP_COMPARE_REQUEST,
            ProtocolOpPdu::CompareResponse(_) => LDAP_COMPARE_RESPONSE,
            ProtocolOpPdu::AbandonRequest(_) => LDAP_ABANDON_REQUEST,
            ProtocolOpPdu::ExtendedRequest { .. } => LDAP_EXTENDED_REQUEST,
            ProtocolOpPdu::ExtendedResponse { .. } => LDAP_EXTENDED_RESPONSE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolOpPdu::BindRequest { .. } => "BindRequest",
            ProtocolOpPdu::BindResponse { .. } => "BindResponse",
            ProtocolOpPdu::UnbindRequest => "UnbindRequest",
            ProtocolOpPdu::SearchRequest(_) => "SearchRequest",
            ProtocolOpPdu::SearchResultEntry { .. } => "SearchResultEntry",
            ProtocolOpPdu::SearchResultDone(_) => "SearchResultDone",
            ProtocolOpPdu::SearchResultReference(_) => "SearchResultReference",
            ProtocolOpPdu::ModifyRequest { .. } => "ModifyRequest",
            ProtocolOpPdu::ModifyResponse(_) => "ModifyResponse",
            ProtocolOpPdu::AddRequest { .. } => "AddRequest",
            ProtocolOpPdu::AddResponse(_) => "AddResponse",
            ProtocolOpPdu::DelRequest(_) => "DelRequest",
            ProtocolOpPdu::DelResponse(_) => "DelResponse",
            ProtocolOpPdu::ModifyDnRequest { .. } => "ModifyDnRequest",
            ProtocolOpPdu::ModifyDnResponse(_) => "ModifyDnResponse",
            ProtocolOpPdu::CompareRequest { .. } => "CompareRequest",
            ProtocolOpPdu::CompareResponse(_) => "CompareResponse",
            ProtocolOpPdu::AbandonRequest(_) => "AbandonRequest",
            ProtocolOpPdu::ExtendedRequest { .. } => "ExtendedRequest",
            ProtocolOpPdu::ExtendedResponse { .. } => "ExtendedResponse",
        }
    }
}
