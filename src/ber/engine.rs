//! Streaming BER decoder engine.
//!
//! The engine turns an octet stream into tag/length/value events for exactly
//! one top-level element. Input may arrive in arbitrary chunks: the engine
//! keeps only the partial identifier/length octets between calls and hands
//! primitive content to the visitor as it arrives, never buffering a value.
//!
//! Events are strictly nested: a constructed element's `on_tag` precedes every
//! event of its descendants and its `on_finish` follows all of them.

use tracing::trace;

use super::length::BerLength;
use super::tag::TagId;
use crate::{LdapCodecError, Result};

/// Callbacks driven by [`BerEngine`]. `path` is the tag path from the root to
/// the current element, inclusive.
pub trait BerVisitor {
    /// Called once the identifier octets of an element are known. Returning
    /// [`Visit::Skip`] consumes the element and its descendants silently.
    fn on_tag(&mut self, path: &[TagId]) -> Result<Visit>;

    fn on_length(&mut self, path: &[TagId], length: BerLength) -> Result<()>;

    /// Content octets of a primitive element, possibly split across calls.
    fn on_value(&mut self, path: &[TagId], chunk: &[u8]) -> Result<()>;

    fn on_finish(&mut self, path: &[TagId]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Enter,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The top-level element is still open; feed more input.
    NeedMore,
    /// The top-level element finished. Octets after it were not consumed.
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    /// Upper bound on the encoded size of the top-level element.
    pub max_element_size: usize,
    /// Upper bound on the tag path length.
    pub max_depth: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_element_size: 16 * 1024 * 1024,
            max_depth: 64,
        }
    }
}

#[derive(Debug)]
struct OpenElement {
    /// Absolute stream position of the end of content; `None` if indefinite.
    end: Option<u64>,
    skip: bool,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Identifier,
    Length { tag: TagId, skip: bool },
    Content { remaining: u64, skip: bool },
    Done,
}

#[derive(Debug)]
pub struct BerEngine {
    limits: EngineLimits,
    state: State,
    header: Vec<u8>,
    path: Vec<TagId>,
    open: Vec<OpenElement>,
    position: u64,
    root_end: Option<u64>,
}

impl BerEngine {
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            limits,
            state: State::Identifier,
            header: Vec::with_capacity(8),
            path: Vec::with_capacity(16),
            open: Vec::with_capacity(16),
            position: 0,
            root_end: None,
        }
    }

    /// Discards all traversal state so the engine can start a new element.
    pub fn reset(&mut self) {
        self.state = State::Identifier;
        self.header.clear();
        self.path.clear();
        self.open.clear();
        self.position = 0;
        self.root_end = None;
    }

    /// True when no octet of the current element has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.position == 0
    }

    /// Octets consumed since the last reset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Octets still missing from a top-level element of known length.
    pub fn remaining_hint(&self) -> Option<usize> {
        self.root_end
            .map(|end| end.saturating_sub(self.position) as usize)
    }

    /// Feeds `input` to the engine, returning how many octets were consumed.
    ///
    /// Consumption stops right after the top-level element completes, so any
    /// following element's octets are left to the caller.
    pub fn feed<V: BerVisitor>(
        &mut self,
        input: &[u8],
        visitor: &mut V,
    ) -> Result<(usize, Progress)> {
        let mut consumed = 0;

        loop {
            if matches!(self.state, State::Identifier) && self.header.is_empty() {
                self.close_definite(visitor)?;
            }
            if matches!(self.state, State::Done) {
                return Ok((consumed, Progress::Complete));
            }
            if consumed == input.len() {
                return Ok((consumed, Progress::NeedMore));
            }

            match self.state {
                State::Identifier => {
                    self.push_header_octet(input[consumed])?;
                    consumed += 1;
                    if let Some((tag, _)) = TagId::parse(&self.header)? {
                        self.header.clear();
                        self.begin_element(tag, visitor)?;
                    }
                }
                State::Length { tag, skip } => {
                    self.push_header_octet(input[consumed])?;
                    consumed += 1;
                    if let Some((length, _)) = BerLength::parse(&self.header)? {
                        self.header.clear();
                        self.on_header(tag, length, skip, visitor)?;
                    }
                }
                State::Content { remaining, skip } => {
                    let available = (input.len() - consumed) as u64;
                    let n = remaining.min(available) as usize;
                    if !skip && n > 0 {
                        visitor.on_value(&self.path, &input[consumed..consumed + n])?;
                    }
                    consumed += n;
                    self.position += n as u64;

                    let left = remaining - n as u64;
                    if left == 0 {
                        self.finish_content(skip, visitor)?;
                    } else {
                        self.state = State::Content {
                            remaining: left,
                            skip,
                        };
                    }
                }
                State::Done => return Ok((consumed, Progress::Complete)),
            }
        }
    }

    fn push_header_octet(&mut self, octet: u8) -> Result<()> {
        self.header.push(octet);
        self.position += 1;

        if let Some(end) = self.bound() {
            if self.position > end {
                return Err(LdapCodecError::InvalidLength(
                    "element header overruns its parent".to_string(),
                ));
            }
        }
        if self.position > self.limits.max_element_size as u64 {
            return Err(LdapCodecError::PduTooLarge {
                size: self.position,
                limit: self.limits.max_element_size,
            });
        }
        Ok(())
    }

    /// End of the innermost open element with a definite length.
    fn bound(&self) -> Option<u64> {
        self.open.iter().rev().find_map(|o| o.end)
    }

    fn parent_skipped(&self) -> bool {
        self.open.last().is_some_and(|o| o.skip)
    }

    fn begin_element<V: BerVisitor>(&mut self, tag: TagId, visitor: &mut V) -> Result<()> {
        if tag.is_end_of_contents() {
            self.state = State::Length { tag, skip: true };
            return Ok(());
        }

        if self.path.len() >= self.limits.max_depth {
            return Err(LdapCodecError::NestingTooDeep(self.limits.max_depth));
        }

        self.path.push(tag);
        let skip = if self.parent_skipped() {
            true
        } else {
            visitor.on_tag(&self.path)? == Visit::Skip
        };

        trace!(path = ?self.path, skip, "element tag");
        self.state = State::Length { tag, skip };
        Ok(())
    }

    fn on_header<V: BerVisitor>(
        &mut self,
        tag: TagId,
        length: BerLength,
        skip: bool,
        visitor: &mut V,
    ) -> Result<()> {
        if tag.is_end_of_contents() {
            return self.end_of_contents(length, visitor);
        }

        if let Some(len) = length.definite() {
            let total = self.position.saturating_add(len);
            if let Some(end) = self.bound() {
                if total > end {
                    return Err(LdapCodecError::InvalidLength(format!(
                        "element of {} octets overruns its parent",
                        len
                    )));
                }
            }
            // Checked at every depth: an indefinite ancestor has no end to
            // bound its children by
            if total > self.limits.max_element_size as u64 {
                return Err(LdapCodecError::PduTooLarge {
                    size: total,
                    limit: self.limits.max_element_size,
                });
            }
            if self.path.len() == 1 {
                self.root_end = Some(total);
            }
        }

        if tag.constructed {
            match (skip, length) {
                // A skipped definite-length element is consumed as opaque octets
                (true, BerLength::Definite(len)) => {
                    self.state = State::Content {
                        remaining: len,
                        skip: true,
                    };
                    if len == 0 {
                        self.finish_content(true, visitor)?;
                    }
                }
                _ => {
                    if !skip {
                        visitor.on_length(&self.path, length)?;
                    }
                    self.open.push(OpenElement {
                        end: length.definite().map(|len| self.position + len),
                        skip,
                    });
                    self.state = State::Identifier;
                }
            }
            return Ok(());
        }

        let BerLength::Definite(len) = length else {
            return Err(LdapCodecError::InvalidLength(
                "indefinite length on a primitive element".to_string(),
            ));
        };

        if !skip {
            visitor.on_length(&self.path, length)?;
        }
        self.state = State::Content {
            remaining: len,
            skip,
        };
        if len == 0 {
            self.finish_content(skip, visitor)?;
        }
        Ok(())
    }

    fn end_of_contents<V: BerVisitor>(&mut self, length: BerLength, visitor: &mut V) -> Result<()> {
        if length != BerLength::Definite(0) {
            return Err(LdapCodecError::MalformedTag(
                "end-of-contents marker with non-zero length".to_string(),
            ));
        }

        match self.open.last() {
            Some(top) if top.end.is_none() => {
                let skip = top.skip;
                self.open.pop();
                self.close_current(skip, visitor)
            }
            _ => Err(LdapCodecError::MalformedTag(
                "end-of-contents outside an indefinite-length element".to_string(),
            )),
        }
    }

    fn finish_content<V: BerVisitor>(&mut self, skip: bool, visitor: &mut V) -> Result<()> {
        self.close_current(skip, visitor)
    }

    /// Closes every open definite-length element whose content ends here.
    fn close_definite<V: BerVisitor>(&mut self, visitor: &mut V) -> Result<()> {
        while let Some(top) = self.open.last() {
            if top.end != Some(self.position) {
                break;
            }
            let skip = top.skip;
            self.open.pop();
            self.close_current(skip, visitor)?;
            if matches!(self.state, State::Done) {
                break;
            }
        }
        Ok(())
    }

    fn close_current<V: BerVisitor>(&mut self, skip: bool, visitor: &mut V) -> Result<()> {
        if !skip {
            visitor.on_finish(&self.path)?;
        }
        self.path.pop();
        self.state = if self.path.is_empty() {
            State::Done
        } else {
            State::Identifier
        };
        Ok(())
    }
}
