//! The LDAPv3 rule set and its registration into the dispatch tree.
//!
//! Every grammar production that carries data is bound to the complete tag
//! path leading to it. Each registered path carries a short list of
//! [`Rule`]s that run in registration order on the element's events:
//!
//! * `Push` opens a new frame on the construction stack when the tag is seen.
//! * `Set` buffers the primitive value and hands it to the top frame when
//!   the element finishes.
//! * `Pop` closes the top frame and attaches it to the one below.
//! * `Descend` only keeps a SEQUENCE OF container from being skipped.
//! * `MarkReferral` records that an optional referral is present.
//!
//! Filters are recursive, so their productions are registered once per
//! nesting level with wildcards standing in for the enclosing filter choices.

use std::sync::Arc;

use tracing::debug;

use super::wire::*;
use crate::ber::{DispatchTree, Segment, TagId};
use crate::config::CodecConfig;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Bind,
    SearchDone,
    Modify,
    Add,
    Del,
    ModifyDn,
    Compare,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvaKind {
    Equality,
    GreaterOrEqual,
    LessOrEqual,
    Approx,
}

/// The kind of object a `Push` rule opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Message,
    Control,
    BindRequest,
    Sasl,
    Response(ResponseKind),
    SearchRequest,
    SearchResultEntry,
    SearchResultReference,
    ModifyRequest,
    Change,
    AddRequest,
    Attribute,
    DelRequest,
    ModifyDnRequest,
    CompareRequest,
    Ava,
    AbandonRequest,
    UnbindRequest,
    ExtendedRequest,
    FilterSet(SetKind),
    FilterNot,
    FilterAva(AvaKind),
    FilterSubstrings,
    FilterPresent,
    FilterExtensible,
}

/// A scalar field a `Set` rule delivers to the top frame.
///
/// Fields named `...Octets` cover same-tag siblings; the receiving frame
/// assigns them positionally in grammar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    MessageId,
    ControlOctets,
    Criticality,
    BindVersion,
    BindName,
    SimpleCredentials,
    SaslOctets,
    ResultCode,
    ResultOctets,
    ReferralUri,
    ServerSaslCreds,
    ResponseName,
    ResponseValue,
    SearchBase,
    SearchEnumerated,
    SearchLimit,
    TypesOnly,
    SelectedAttribute,
    ObjectName,
    AttributeType,
    AttributeValue,
    ChangeOperation,
    ReferenceUri,
    DelDn,
    ModifyDnOctets,
    DeleteOldRdn,
    NewSuperior,
    AvaOctets,
    AbandonId,
    RequestName,
    RequestValue,
    SubstringType,
    SubstringInitial,
    SubstringAny,
    SubstringFinal,
    PresentType,
    MatchingRule,
    MatchingType,
    MatchValue,
    DnAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Push(Shape),
    Pop,
    Set(Field),
    Descend,
    MarkReferral,
}

pub const FILTER_TAGS: [TagId; 10] = [
    FILTER_AND,
    FILTER_OR,
    FILTER_NOT,
    FILTER_EQUALITY,
    FILTER_SUBSTRINGS,
    FILTER_GREATER_OR_EQUAL,
    FILTER_LESS_OR_EQUAL,
    FILTER_PRESENT,
    FILTER_APPROX,
    FILTER_EXTENSIBLE,
];

const RESPONSES: [(TagId, ResponseKind); 8] = [
    (LDAP_BIND_RESPONSE, ResponseKind::Bind),
    (LDAP_SEARCH_RESULT_DONE, ResponseKind::SearchDone),
    (LDAP_MODIFY_RESPONSE, ResponseKind::Modify),
    (LDAP_ADD_RESPONSE, ResponseKind::Add),
    (LDAP_DEL_RESPONSE, ResponseKind::Del),
    (LDAP_MODIFY_DN_RESPONSE, ResponseKind::ModifyDn),
    (LDAP_COMPARE_RESPONSE, ResponseKind::Compare),
    (LDAP_EXTENDED_RESPONSE, ResponseKind::Extended),
];

const AVA_FILTERS: [(TagId, AvaKind); 4] = [
    (FILTER_EQUALITY, AvaKind::Equality),
    (FILTER_GREATER_OR_EQUAL, AvaKind::GreaterOrEqual),
    (FILTER_LESS_OR_EQUAL, AvaKind::LessOrEqual),
    (FILTER_APPROX, AvaKind::Approx),
];

/// The immutable LDAPv3 dispatch tree plus the configuration it was built
/// with. Build once and share.
#[derive(Debug)]
pub struct LdapGrammar {
    tree: DispatchTree<Rule>,
    config: CodecConfig,
}

impl LdapGrammar {
    pub fn build(config: &CodecConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let mut grammar = Registrar::default();
        grammar.envelope()?;
        grammar.bind()?;
        grammar.responses()?;
        grammar.search(config.max_filter_depth)?;
        grammar.entries()?;
        grammar.modify()?;
        grammar.simple_requests()?;

        debug!(
            patterns = grammar.tree.len(),
            max_filter_depth = config.max_filter_depth,
            "LDAP grammar built"
        );

        Ok(Arc::new(Self {
            tree: grammar.tree,
            config: config.clone(),
        }))
    }

    pub fn rules_for(&self, path: &[TagId]) -> &[Rule] {
        self.tree.resolve(path)
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Number of registered tag-path patterns.
    pub fn pattern_count(&self) -> usize {
        self.tree.len()
    }
}

fn path(prefix: &[Segment], tail: &[TagId]) -> Vec<Segment> {
    prefix
        .iter()
        .copied()
        .chain(tail.iter().map(|&tag| Segment::Tag(tag)))
        .collect()
}

#[derive(Default)]
struct Registrar {
    tree: DispatchTree<Rule>,
}

impl Registrar {
    fn add(&mut self, pattern: &[Segment], rules: &[Rule]) -> Result<()> {
        for rule in rules {
            self.tree.register(pattern, *rule)?;
        }
        Ok(())
    }

    fn add_tags(&mut self, tags: &[TagId], rules: &[Rule]) -> Result<()> {
        self.add(&path(&[], tags), rules)
    }

    fn envelope(&mut self) -> Result<()> {
        self.add_tags(&[SEQUENCE], &[Rule::Push(Shape::Message), Rule::Pop])?;
        self.add_tags(&[SEQUENCE, INTEGER], &[Rule::Set(Field::MessageId)])?;
        self.add_tags(&[SEQUENCE, CONTROLS], &[Rule::Descend])?;
        self.add_tags(
            &[SEQUENCE, CONTROLS, SEQUENCE],
            &[Rule::Push(Shape::Control), Rule::Pop],
        )?;
        self.add_tags(
            &[SEQUENCE, CONTROLS, SEQUENCE, OCTET_STRING],
            &[Rule::Set(Field::ControlOctets)],
        )?;
        self.add_tags(
            &[SEQUENCE, CONTROLS, SEQUENCE, BOOLEAN],
            &[Rule::Set(Field::Criticality)],
        )
    }

    fn bind(&mut self) -> Result<()> {
        let op = LDAP_BIND_REQUEST;
        self.add_tags(&[SEQUENCE, op], &[Rule::Push(Shape::BindRequest), Rule::Pop])?;
        self.add_tags(&[SEQUENCE, op, INTEGER], &[Rule::Set(Field::BindVersion)])?;
        self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::BindName)])?;
        self.add_tags(
            &[SEQUENCE, op, AUTH_SIMPLE],
            &[Rule::Set(Field::SimpleCredentials)],
        )?;
        self.add_tags(&[SEQUENCE, op, AUTH_SASL], &[Rule::Push(Shape::Sasl), Rule::Pop])?;
        self.add_tags(
            &[SEQUENCE, op, AUTH_SASL, OCTET_STRING],
            &[Rule::Set(Field::SaslOctets)],
        )
    }

    fn responses(&mut self) -> Result<()> {
        for (op, kind) in RESPONSES {
            self.add_tags(
                &[SEQUENCE, op],
                &[Rule::Push(Shape::Response(kind)), Rule::Pop],
            )?;
            self.add_tags(&[SEQUENCE, op, ENUMERATED], &[Rule::Set(Field::ResultCode)])?;
            self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::ResultOctets)])?;
            self.add_tags(&[SEQUENCE, op, REFERRAL], &[Rule::MarkReferral])?;
            self.add_tags(
                &[SEQUENCE, op, REFERRAL, OCTET_STRING],
                &[Rule::Set(Field::ReferralUri)],
            )?;
        }

        self.add_tags(
            &[SEQUENCE, LDAP_BIND_RESPONSE, SERVER_SASL_CREDS],
            &[Rule::Set(Field::ServerSaslCreds)],
        )?;
        self.add_tags(
            &[SEQUENCE, LDAP_EXTENDED_RESPONSE, EXTENDED_RESPONSE_NAME],
            &[Rule::Set(Field::ResponseName)],
        )?;
        self.add_tags(
            &[SEQUENCE, LDAP_EXTENDED_RESPONSE, EXTENDED_RESPONSE_VALUE],
            &[Rule::Set(Field::ResponseValue)],
        )
    }

    fn search(&mut self, max_filter_depth: usize) -> Result<()> {
        let op = LDAP_SEARCH_REQUEST;
        self.add_tags(&[SEQUENCE, op], &[Rule::Push(Shape::SearchRequest), Rule::Pop])?;
        self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::SearchBase)])?;
        self.add_tags(
            &[SEQUENCE, op, ENUMERATED],
            &[Rule::Set(Field::SearchEnumerated)],
        )?;
        self.add_tags(&[SEQUENCE, op, INTEGER], &[Rule::Set(Field::SearchLimit)])?;
        self.add_tags(&[SEQUENCE, op, BOOLEAN], &[Rule::Set(Field::TypesOnly)])?;
        self.add_tags(&[SEQUENCE, op, SEQUENCE], &[Rule::Descend])?;
        self.add_tags(
            &[SEQUENCE, op, SEQUENCE, OCTET_STRING],
            &[Rule::Set(Field::SelectedAttribute)],
        )?;

        let mut prefix = vec![Segment::Tag(SEQUENCE), Segment::Tag(op)];
        for _ in 0..max_filter_depth {
            self.filter_level(&prefix)?;
            prefix.push(Segment::Any);
        }
        Ok(())
    }

    /// Registers every filter choice directly below `prefix`.
    fn filter_level(&mut self, prefix: &[Segment]) -> Result<()> {
        self.add(
            &path(prefix, &[FILTER_AND]),
            &[Rule::Push(Shape::FilterSet(SetKind::And)), Rule::Pop],
        )?;
        self.add(
            &path(prefix, &[FILTER_OR]),
            &[Rule::Push(Shape::FilterSet(SetKind::Or)), Rule::Pop],
        )?;
        self.add(
            &path(prefix, &[FILTER_NOT]),
            &[Rule::Push(Shape::FilterNot), Rule::Pop],
        )?;

        for (tag, kind) in AVA_FILTERS {
            self.add(
                &path(prefix, &[tag]),
                &[Rule::Push(Shape::FilterAva(kind)), Rule::Pop],
            )?;
            self.add(
                &path(prefix, &[tag, OCTET_STRING]),
                &[Rule::Set(Field::AvaOctets)],
            )?;
        }

        let substrings = FILTER_SUBSTRINGS;
        self.add(
            &path(prefix, &[substrings]),
            &[Rule::Push(Shape::FilterSubstrings), Rule::Pop],
        )?;
        self.add(
            &path(prefix, &[substrings, OCTET_STRING]),
            &[Rule::Set(Field::SubstringType)],
        )?;
        self.add(&path(prefix, &[substrings, SEQUENCE]), &[Rule::Descend])?;
        for (tag, field) in [
            (SUBSTRING_INITIAL, Field::SubstringInitial),
            (SUBSTRING_ANY, Field::SubstringAny),
            (SUBSTRING_FINAL, Field::SubstringFinal),
        ] {
            self.add(
                &path(prefix, &[substrings, SEQUENCE, tag]),
                &[Rule::Set(field)],
            )?;
        }

        // Primitive: open, fill and close on the same element
        self.add(
            &path(prefix, &[FILTER_PRESENT]),
            &[
                Rule::Push(Shape::FilterPresent),
                Rule::Set(Field::PresentType),
                Rule::Pop,
            ],
        )?;

        let extensible = FILTER_EXTENSIBLE;
        self.add(
            &path(prefix, &[extensible]),
            &[Rule::Push(Shape::FilterExtensible), Rule::Pop],
        )?;
        for (tag, field) in [
            (MATCHING_RULE, Field::MatchingRule),
            (MATCHING_TYPE, Field::MatchingType),
            (MATCH_VALUE, Field::MatchValue),
            (DN_ATTRIBUTES, Field::DnAttributes),
        ] {
            self.add(&path(prefix, &[extensible, tag]), &[Rule::Set(field)])?;
        }
        Ok(())
    }

    fn entries(&mut self) -> Result<()> {
        for (op, shape) in [
            (LDAP_SEARCH_RESULT_ENTRY, Shape::SearchResultEntry),
            (LDAP_ADD_REQUEST, Shape::AddRequest),
        ] {
            self.add_tags(&[SEQUENCE, op], &[Rule::Push(shape), Rule::Pop])?;
            self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::ObjectName)])?;
            self.add_tags(&[SEQUENCE, op, SEQUENCE], &[Rule::Descend])?;
            self.attribute(&[SEQUENCE, op, SEQUENCE, SEQUENCE])?;
        }

        let op = LDAP_SEARCH_RESULT_REFERENCE;
        self.add_tags(
            &[SEQUENCE, op],
            &[Rule::Push(Shape::SearchResultReference), Rule::Pop],
        )?;
        self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::ReferenceUri)])
    }

    /// `PartialAttribute ::= SEQUENCE { type, vals SET OF value }` at `at`.
    fn attribute(&mut self, at: &[TagId]) -> Result<()> {
        self.add_tags(at, &[Rule::Push(Shape::Attribute), Rule::Pop])?;
        let mut tags = at.to_vec();
        tags.push(OCTET_STRING);
        self.add_tags(&tags, &[Rule::Set(Field::AttributeType)])?;
        tags.pop();
        tags.push(SET);
        self.add_tags(&tags, &[Rule::Descend])?;
        tags.push(OCTET_STRING);
        self.add_tags(&tags, &[Rule::Set(Field::AttributeValue)])
    }

    fn modify(&mut self) -> Result<()> {
        let op = LDAP_MODIFY_REQUEST;
        self.add_tags(&[SEQUENCE, op], &[Rule::Push(Shape::ModifyRequest), Rule::Pop])?;
        self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::ObjectName)])?;
        self.add_tags(&[SEQUENCE, op, SEQUENCE], &[Rule::Descend])?;
        self.add_tags(
            &[SEQUENCE, op, SEQUENCE, SEQUENCE],
            &[Rule::Push(Shape::Change), Rule::Pop],
        )?;
        self.add_tags(
            &[SEQUENCE, op, SEQUENCE, SEQUENCE, ENUMERATED],
            &[Rule::Set(Field::ChangeOperation)],
        )?;
        self.attribute(&[SEQUENCE, op, SEQUENCE, SEQUENCE, SEQUENCE])?;

        let op = LDAP_MODIFY_DN_REQUEST;
        self.add_tags(
            &[SEQUENCE, op],
            &[Rule::Push(Shape::ModifyDnRequest), Rule::Pop],
        )?;
        self.add_tags(
            &[SEQUENCE, op, OCTET_STRING],
            &[Rule::Set(Field::ModifyDnOctets)],
        )?;
        self.add_tags(&[SEQUENCE, op, BOOLEAN], &[Rule::Set(Field::DeleteOldRdn)])?;
        self.add_tags(&[SEQUENCE, op, NEW_SUPERIOR], &[Rule::Set(Field::NewSuperior)])
    }

    fn simple_requests(&mut self) -> Result<()> {
        self.add_tags(
            &[SEQUENCE, LDAP_UNBIND_REQUEST],
            &[Rule::Push(Shape::UnbindRequest), Rule::Pop],
        )?;
        self.add_tags(
            &[SEQUENCE, LDAP_DEL_REQUEST],
            &[
                Rule::Push(Shape::DelRequest),
                Rule::Set(Field::DelDn),
                Rule::Pop,
            ],
        )?;
        self.add_tags(
            &[SEQUENCE, LDAP_ABANDON_REQUEST],
            &[
                Rule::Push(Shape::AbandonRequest),
                Rule::Set(Field::AbandonId),
                Rule::Pop,
            ],
        )?;

        let op = LDAP_COMPARE_REQUEST;
        self.add_tags(&[SEQUENCE, op], &[Rule::Push(Shape::CompareRequest), Rule::Pop])?;
        self.add_tags(&[SEQUENCE, op, OCTET_STRING], &[Rule::Set(Field::ObjectName)])?;
        self.add_tags(&[SEQUENCE, op, SEQUENCE], &[Rule::Push(Shape::Ava), Rule::Pop])?;
        self.add_tags(
            &[SEQUENCE, op, SEQUENCE, OCTET_STRING],
            &[Rule::Set(Field::AvaOctets)],
        )?;

        let op = LDAP_EXTENDED_REQUEST;
        self.add_tags(
            &[SEQUENCE, op],
            &[Rule::Push(Shape::ExtendedRequest), Rule::Pop],
        )?;
        self.add_tags(
            &[SEQUENCE, op, EXTENDED_REQUEST_NAME],
            &[Rule::Set(Field::RequestName)],
        )?;
        self.add_tags(
            &[SEQUENCE, op, EXTENDED_REQUEST_VALUE],
            &[Rule::Set(Field::RequestValue)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> Arc<LdapGrammar> {
        LdapGrammar::build(&CodecConfig::default()).unwrap()
    }

    #[test]
    fn test_envelope_rules() {
        let g = grammar();
        assert_eq!(
            g.rules_for(&[SEQUENCE]),
            &[Rule::Push(Shape::Message), Rule::Pop]
        );
        assert_eq!(
            g.rules_for(&[SEQUENCE, INTEGER]),
            &[Rule::Set(Field::MessageId)]
        );
        assert!(g.rules_for(&[SET]).is_empty());
    }

    #[test]
    fn test_primitive_composite_rule_order() {
        let g = grammar();
        assert_eq!(
            g.rules_for(&[SEQUENCE, LDAP_DEL_REQUEST]),
            &[
                Rule::Push(Shape::DelRequest),
                Rule::Set(Field::DelDn),
                Rule::Pop
            ]
        );
        assert_eq!(
            g.rules_for(&[SEQUENCE, LDAP_SEARCH_REQUEST, FILTER_NOT, FILTER_PRESENT]),
            &[
                Rule::Push(Shape::FilterPresent),
                Rule::Set(Field::PresentType),
                Rule::Pop
            ]
        );
    }

    #[test]
    fn test_nested_filter_paths_resolve() {
        let g = grammar();
        let search = [SEQUENCE, LDAP_SEARCH_REQUEST];
        let nested = [
            search[0],
            search[1],
            FILTER_AND,
            FILTER_OR,
            FILTER_SUBSTRINGS,
            SEQUENCE,
            SUBSTRING_ANY,
        ];
        assert_eq!(g.rules_for(&nested), &[Rule::Set(Field::SubstringAny)]);

        let eq_value = [search[0], search[1], FILTER_NOT, FILTER_EQUALITY, OCTET_STRING];
        assert_eq!(g.rules_for(&eq_value), &[Rule::Set(Field::AvaOctets)]);

        // The attribute selection list is not mistaken for a filter
        let selected = [search[0], search[1], SEQUENCE, OCTET_STRING];
        assert_eq!(
            g.rules_for(&selected),
            &[Rule::Set(Field::SelectedAttribute)]
        );
    }

    #[test]
    fn test_filter_depth_is_bounded() {
        let g = LdapGrammar::build(&CodecConfig {
            max_filter_depth: 2,
            ..CodecConfig::default()
        })
        .unwrap();

        let mut path = vec![SEQUENCE, LDAP_SEARCH_REQUEST, FILTER_AND, FILTER_AND];
        assert!(!g.rules_for(&path).is_empty());
        path.push(FILTER_AND);
        assert!(g.rules_for(&path).is_empty());
    }

    #[test]
    fn test_modify_attribute_paths() {
        let g = grammar();
        let value = [
            SEQUENCE,
            LDAP_MODIFY_REQUEST,
            SEQUENCE,
            SEQUENCE,
            SEQUENCE,
            SET,
            OCTET_STRING,
        ];
        assert_eq!(g.rules_for(&value), &[Rule::Set(Field::AttributeValue)]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = LdapGrammar::build(&CodecConfig {
            max_filter_depth: 0,
            ..CodecConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, crate::LdapCodecError::Config(_)));
    }
}
