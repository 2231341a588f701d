use super::filters::LdapFilter;
use crate::{LdapCodecError, Result};

pub type LdapMessageId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct LdapMessage {
    pub message_id: LdapMessageId,
    pub protocol_op: LdapProtocolOp,
    pub controls: Vec<Control>,
}

impl LdapMessage {
    pub fn new(message_id: LdapMessageId, protocol_op: LdapProtocolOp) -> Self {
        Self {
            message_id,
            protocol_op,
            controls: Vec::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }
}

/// A request or response control. The value is carried opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub control_type: String,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LdapProtocolOp {
    BindRequest {
        version: u8,
        dn: String,
        authentication: BindAuthentication,
    },
    BindResponse {
        result: LdapResult,
        server_sasl_creds: Option<Vec<u8>>,
    },
    UnbindRequest,
    SearchRequest {
        base_dn: String,
        scope: SearchScope,
        deref_aliases: DerefAliases,
        size_limit: u32,
        time_limit: u32,
        types_only: bool,
        filter: LdapFilter,
        attributes: Vec<String>,
    },
    SearchResultEntry {
        dn: String,
        attributes: Vec<PartialAttribute>,
    },
    SearchResultReference {
        uris: Vec<String>,
    },
    SearchResultDone {
        result: LdapResult,
    },
    ModifyRequest {
        dn: String,
        changes: Vec<ModificationItem>,
    },
    ModifyResponse {
        result: LdapResult,
    },
    AddRequest {
        dn: String,
        attributes: Vec<PartialAttribute>,
    },
    AddResponse {
        result: LdapResult,
    },
    DelRequest {
        dn: String,
    },
    DelResponse {
        result: LdapResult,
    },
    ModifyDnRequest {
        dn: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
    },
    ModifyDnResponse {
        result: LdapResult,
    },
    CompareRequest {
        dn: String,
        attribute: String,
        value: Vec<u8>,
    },
    CompareResponse {
        result: LdapResult,
    },
    AbandonRequest {
        message_id: LdapMessageId,
    },
    ExtendedRequest {
        name: String,
        value: Option<Vec<u8>>,
    },
    ExtendedResponse {
        result: LdapResult,
        name: Option<String>,
        value: Option<Vec<u8>>,
    },
}

impl LdapProtocolOp {
    pub fn name(&self) -> &'static str {
        match self {
            LdapProtocolOp::BindRequest { .. } => "BindRequest",
            LdapProtocolOp::BindResponse { .. } => "BindResponse",
            LdapProtocolOp::UnbindRequest => "UnbindRequest",
            LdapProtocolOp::SearchRequest { .. } => "SearchRequest",
            LdapProtocolOp::SearchResultEntry { .. } => "SearchResultEntry",
            LdapProtocolOp::SearchResultReference { .. } => "SearchResultReference",
            LdapProtocolOp::SearchResultDone { .. } => "SearchResultDone",
            LdapProtocolOp::ModifyRequest { .. } => "ModifyRequest",
            LdapProtocolOp::ModifyResponse { .. } => "ModifyResponse",
            LdapProtocolOp::AddRequest { .. } => "AddRequest",
            LdapProtocolOp::AddResponse { .. } => "AddResponse",
            LdapProtocolOp::DelRequest { .. } => "DelRequest",
            LdapProtocolOp::DelResponse { .. } => "DelResponse",
            LdapProtocolOp::ModifyDnRequest { .. } => "ModifyDnRequest",
            LdapProtocolOp::ModifyDnResponse { .. } => "ModifyDnResponse",
            LdapProtocolOp::CompareRequest { .. } => "CompareRequest",
            LdapProtocolOp::CompareResponse { .. } => "CompareResponse",
            LdapProtocolOp::AbandonRequest { .. } => "AbandonRequest",
            LdapProtocolOp::ExtendedRequest { .. } => "ExtendedRequest",
            LdapProtocolOp::ExtendedResponse { .. } => "ExtendedResponse",
        }
    }

    /// The result carried by a response, if this is one.
    pub fn result(&self) -> Option<&LdapResult> {
        match self {
            LdapProtocolOp::BindResponse { result, .. }
            | LdapProtocolOp::SearchResultDone { result }
            | LdapProtocolOp::ModifyResponse { result }
            | LdapProtocolOp::AddResponse { result }
            | LdapProtocolOp::DelResponse { result }
            | LdapProtocolOp::ModifyDnResponse { result }
            | LdapProtocolOp::CompareResponse { result }
            | LdapProtocolOp::ExtendedResponse { result, .. } => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindAuthentication {
    /// Simple bind password; empty for anonymous binds.
    Simple(Vec<u8>),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialAttribute {
    pub attr_type: String,
    pub values: Vec<Vec<u8>>,
}

impl PartialAttribute {
    pub fn new(attr_type: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            attr_type: attr_type.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModificationItem {
    pub operation: ModifyOperation,
    pub attribute: PartialAttribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    NeverDerefAliases = 0,
    DerefInSearching = 1,
    DerefFindingBaseObj = 2,
    DerefAlways = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add = 0,
    Delete = 1,
    Replace = 2,
}

impl TryFrom<i64> for SearchScope {
    type Error = LdapCodecError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            _ => Err(LdapCodecError::InvalidValue(format!(
                "search scope {}",
                value
            ))),
        }
    }
}

impl TryFrom<i64> for DerefAliases {
    type Error = LdapCodecError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(DerefAliases::NeverDerefAliases),
            1 => Ok(DerefAliases::DerefInSearching),
            2 => Ok(DerefAliases::DerefFindingBaseObj),
            3 => Ok(DerefAliases::DerefAlways),
            _ => Err(LdapCodecError::InvalidValue(format!(
                "derefAliases {}",
                value
            ))),
        }
    }
}

impl TryFrom<i64> for ModifyOperation {
    type Error = LdapCodecError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(ModifyOperation::Add),
            1 => Ok(ModifyOperation::Delete),
            2 => Ok(ModifyOperation::Replace),
            _ => Err(LdapCodecError::InvalidValue(format!(
                "modify operation {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdapResult {
    pub result_code: LdapResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
    /// `None` means the result is not a referral.
    pub referral: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LdapResultCode {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    CompareFalse = 5,
    CompareTrue = 6,
    AuthMethodNotSupported = 7,
    StrongerAuthRequired = 8,
    Referral = 10,
    AdminLimitExceeded = 11,
    UnavailableCriticalExtension = 12,
    ConfidentialityRequired = 13,
    SaslBindInProgress = 14,
    NoSuchAttribute = 16,
    UndefinedAttributeType = 17,
    InappropriateMatching = 18,
    ConstraintViolation = 19,
    AttributeOrValueExists = 20,
    InvalidAttributeSyntax = 21,
    NoSuchObject = 32,
    AliasProblem = 33,
    InvalidDNSyntax = 34,
    AliasDereferencingProblem = 36,
    InappropriateAuthentication = 48,
    InvalidCredentials = 49,
    InsufficientAccessRights = 50,
    Busy = 51,
    Unavailable = 52,
    UnwillingToPerform = 53,
    LoopDetect = 54,
    NamingViolation = 64,
    ObjectClassViolation = 65,
    NotAllowedOnNonLeaf = 66,
    NotAllowedOnRDN = 67,
    EntryAlreadyExists = 68,
    ObjectClassModsProhibited = 69,
    AffectsMultipleDSAs = 71,
    Other = 80,
}

impl LdapResultCode {
    pub const ALL: [LdapResultCode; 39] = [
        LdapResultCode::Success,
        LdapResultCode::OperationsError,
        LdapResultCode::ProtocolError,
        LdapResultCode::TimeLimitExceeded,
        LdapResultCode::SizeLimitExceeded,
        LdapResultCode::CompareFalse,
        LdapResultCode::CompareTrue,
        LdapResultCode::AuthMethodNotSupported,
        LdapResultCode::StrongerAuthRequired,
        LdapResultCode::Referral,
        LdapResultCode::AdminLimitExceeded,
        LdapResultCode::UnavailableCriticalExtension,
        LdapResultCode::ConfidentialityRequired,
        LdapResultCode::SaslBindInProgress,
        LdapResultCode::NoSuchAttribute,
        LdapResultCode::UndefinedAttributeType,
        LdapResultCode::InappropriateMatching,
        LdapResultCode::ConstraintViolation,
        LdapResultCode::AttributeOrValueExists,
        LdapResultCode::InvalidAttributeSyntax,
        LdapResultCode::NoSuchObject,
        LdapResultCode::AliasProblem,
        LdapResultCode::InvalidDNSyntax,
        LdapResultCode::AliasDereferencingProblem,
        LdapResultCode::InappropriateAuthentication,
        LdapResultCode::InvalidCredentials,
        LdapResultCode::InsufficientAccessRights,
        LdapResultCode::Busy,
        LdapResultCode::Unavailable,
        LdapResultCode::UnwillingToPerform,
        LdapResultCode::LoopDetect,
        LdapResultCode::NamingViolation,
        LdapResultCode::ObjectClassViolation,
        LdapResultCode::NotAllowedOnNonLeaf,
        LdapResultCode::NotAllowedOnRDN,
        LdapResultCode::EntryAlreadyExists,
        LdapResultCode::ObjectClassModsProhibited,
        LdapResultCode::AffectsMultipleDSAs,
        LdapResultCode::Other,
    ];

    pub fn code(self) -> i64 {
        self as u8 as i64
    }
}

impl TryFrom<i64> for LdapResultCode {
    type Error = LdapCodecError;

    fn try_from(value: i64) -> Result<Self> {
        LdapResultCode::ALL
            .iter()
            .copied()
            .find(|code| code.code() == value)
            .ok_or(LdapCodecError::UnknownResultCode(value))
    }
}

impl LdapResult {
    pub fn success() -> Self {
        Self {
            result_code: LdapResultCode::Success,
            matched_dn: String::new(),
            diagnostic_message: String::new(),
            referral: None,
        }
    }

    pub fn error(code: LdapResultCode, message: String) -> Self {
        Self {
            result_code: code,
            matched_dn: String::new(),
            diagnostic_message: message,
            referral: None,
        }
    }

    pub fn referral(uris: Vec<String>) -> Self {
        Self {
            result_code: LdapResultCode::Referral,
            matched_dn: String::new(),
            diagnostic_message: String::new(),
            referral: Some(uris),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldap_result_success() {
        let result = LdapResult::success();
        assert_eq!(result.result_code, LdapResultCode::Success);
        assert_eq!(result.matched_dn, "");
        assert_eq!(result.diagnostic_message, "");
        assert_eq!(result.referral, None);
    }

    #[test]
    fn test_ldap_result_error() {
        let result = LdapResult::error(
            LdapResultCode::InvalidDNSyntax,
            "Invalid DN format".to_string(),
        );
        assert_eq!(result.result_code, LdapResultCode::InvalidDNSyntax);
        assert_eq!(result.matched_dn, "");
        assert_eq!(result.diagnostic_message, "Invalid DN format");
    }

    #[test]
    fn test_ldap_result_referral() {
        let result = LdapResult::referral(vec!["ldap://other.example.com/".to_string()]);
        assert_eq!(result.result_code, LdapResultCode::Referral);
        assert_eq!(result.referral.as_ref().map(Vec::len), Some(1));
        assert_ne!(result.referral, LdapResult::referral(vec![]).referral);
    }

    #[test]
    fn test_search_scope_values() {
        assert_eq!(SearchScope::BaseObject as u8, 0);
        assert_eq!(SearchScope::SingleLevel as u8, 1);
        assert_eq!(SearchScope::WholeSubtree as u8, 2);
        assert_eq!(SearchScope::try_from(2).unwrap(), SearchScope::WholeSubtree);
        assert!(matches!(
            SearchScope::try_from(3),
            Err(LdapCodecError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_deref_aliases_values() {
        assert_eq!(DerefAliases::NeverDerefAliases as u8, 0);
        assert_eq!(DerefAliases::DerefInSearching as u8, 1);
        assert_eq!(DerefAliases::DerefFindingBaseObj as u8, 2);
        assert_eq!(DerefAliases::DerefAlways as u8, 3);
        assert_eq!(DerefAliases::try_from(3).unwrap(), DerefAliases::DerefAlways);
        assert!(DerefAliases::try_from(-1).is_err());
    }

    #[test]
    fn test_modify_operation_values() {
        assert_eq!(ModifyOperation::try_from(0).unwrap(), ModifyOperation::Add);
        assert_eq!(ModifyOperation::try_from(1).unwrap(), ModifyOperation::Delete);
        assert_eq!(ModifyOperation::try_from(2).unwrap(), ModifyOperation::Replace);
        // increment (RFC 4525) is not part of the core grammar
        assert!(ModifyOperation::try_from(3).is_err());
    }

    #[test]
    fn test_ldap_result_code_values() {
        assert_eq!(LdapResultCode::Success as u8, 0);
        assert_eq!(LdapResultCode::OperationsError as u8, 1);
        assert_eq!(LdapResultCode::ProtocolError as u8, 2);
        assert_eq!(LdapResultCode::CompareFalse as u8, 5);
        assert_eq!(LdapResultCode::CompareTrue as u8, 6);
        assert_eq!(LdapResultCode::UnavailableCriticalExtension as u8, 12);
        assert_eq!(LdapResultCode::NoSuchAttribute as u8, 16);
        assert_eq!(LdapResultCode::NoSuchObject as u8, 32);
        assert_eq!(LdapResultCode::InvalidDNSyntax as u8, 34);
        assert_eq!(LdapResultCode::AliasDereferencingProblem as u8, 36);
        assert_eq!(LdapResultCode::InvalidCredentials as u8, 49);
        assert_eq!(LdapResultCode::InsufficientAccessRights as u8, 50);
        assert_eq!(LdapResultCode::Other as u8, 80);
    }

    #[test]
    fn test_result_code_table_is_bijective() {
        for code in LdapResultCode::ALL {
            assert_eq!(LdapResultCode::try_from(code.code()).unwrap(), code);
        }
        let mut values: Vec<i64> = LdapResultCode::ALL.iter().map(|c| c.code()).collect();
        values.dedup();
        assert_eq!(values.len(), LdapResultCode::ALL.len());
    }

    #[test]
    fn test_unknown_result_code() {
        for value in [9, 15, 35, 81, 4096, -1] {
            assert!(matches!(
                LdapResultCode::try_from(value),
                Err(LdapCodecError::UnknownResultCode(v)) if v == value
            ));
        }
    }

    #[test]
    fn test_op_names_and_results() {
        let op = LdapProtocolOp::SearchResultDone {
            result: LdapResult::success(),
        };
        assert_eq!(op.name(), "SearchResultDone");
        assert!(op.result().is_some());

        let op = LdapProtocolOp::AbandonRequest { message_id: 7 };
        assert_eq!(op.name(), "AbandonRequest");
        assert!(op.result().is_none());
    }

    #[test]
    fn test_ldap_message_structure() {
        let msg = LdapMessage::new(42, LdapProtocolOp::UnbindRequest);
        assert_eq!(msg.message_id, 42);
        assert!(msg.controls.is_empty());

        let msg = msg.with_controls(vec![Control {
            control_type: "1.2.840.113556.1.4.319".to_string(),
            criticality: true,
            value: None,
        }]);
        assert_eq!(msg.controls.len(), 1);
        assert_eq!(msg.protocol_op, LdapProtocolOp::UnbindRequest);
    }
}
