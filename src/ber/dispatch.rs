//! Tag-path dispatch tree.
//!
//! A trie keyed by BER tag identifiers that maps a path from the PDU root to
//! the handlers registered for it. Patterns may contain [`Segment::Any`] at any
//! position except the last. The tree is built once and only read afterwards,
//! so a shared reference can be used from any number of decoders at once.

use std::collections::HashMap;

use super::tag::TagId;
use crate::{LdapCodecError, Result};

/// One position in a registered pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Tag(TagId),
    Any,
}

impl From<TagId> for Segment {
    fn from(tag: TagId) -> Self {
        Segment::Tag(tag)
    }
}

#[derive(Debug)]
struct Node<H> {
    exact: HashMap<TagId, Node<H>>,
    wildcard: Option<Box<Node<H>>>,
    handlers: Vec<H>,
}

impl<H> Default for Node<H> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            wildcard: None,
            handlers: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct DispatchTree<H> {
    root: Node<H>,
    patterns: usize,
}

impl<H> Default for DispatchTree<H> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            patterns: 0,
        }
    }
}

impl<H> DispatchTree<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `pattern`. Handlers registered for the same
    /// pattern are returned in registration order.
    pub fn register(&mut self, pattern: &[Segment], handler: H) -> Result<()> {
        match pattern.last() {
            None => {
                return Err(LdapCodecError::Config(
                    "empty dispatch pattern".to_string(),
                ))
            }
            Some(Segment::Any) => {
                return Err(LdapCodecError::Config(
                    "dispatch pattern may not end with a wildcard".to_string(),
                ))
            }
            Some(Segment::Tag(_)) => {}
        }

        let mut node = &mut self.root;
        for segment in pattern {
            node = match segment {
                Segment::Tag(tag) => node.exact.entry(*tag).or_default(),
                Segment::Any => node.wildcard.get_or_insert_with(Default::default).as_mut(),
            };
        }

        if node.handlers.is_empty() {
            self.patterns += 1;
        }
        node.handlers.push(handler);
        Ok(())
    }

    /// Resolves a concrete tag path to its handlers.
    ///
    /// At every depth an exact child is tried before the wildcard child; the
    /// wildcard branch is only taken when the exact branch yields nothing.
    /// An unmatched path resolves to an empty slice.
    pub fn resolve(&self, path: &[TagId]) -> &[H] {
        if path.is_empty() {
            return &[];
        }
        Self::resolve_from(&self.root, path).unwrap_or(&[])
    }

    fn resolve_from<'a>(node: &'a Node<H>, path: &[TagId]) -> Option<&'a [H]> {
        let Some((head, rest)) = path.split_first() else {
            return (!node.handlers.is_empty()).then_some(node.handlers.as_slice());
        };

        if let Some(found) = node
            .exact
            .get(head)
            .and_then(|child| Self::resolve_from(child, rest))
        {
            return Some(found);
        }

        node.wildcard
            .as_deref()
            .and_then(|child| Self::resolve_from(child, rest))
    }

    /// Number of distinct patterns with at least one handler.
    pub fn len(&self) -> usize {
        self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns == 0
    }
}
