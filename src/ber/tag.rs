use bytes::BufMut;
use std::fmt;

use crate::{LdapCodecError, Result};

/// The class bits of a BER identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagClass {
    Universal = 0,
    Application = 1,
    ContextSpecific = 2,
    Private = 3,
}

impl TagClass {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }
}

/// A decoded BER identifier: class, primitive/constructed bit and tag number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

/// Identifiers longer than this are rejected; LDAP never uses more than one.
const MAX_IDENTIFIER_OCTETS: usize = 5;

impl TagId {
    pub const fn new(class: TagClass, constructed: bool, number: u32) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    /// Builds a low-tag-number identifier from its single-octet form (e.g. `0x30`).
    pub const fn from_octet(octet: u8) -> Self {
        let class = match octet >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        Self {
            class,
            constructed: octet & 0x20 != 0,
            number: (octet & 0x1f) as u32,
        }
    }

    pub const fn universal(number: u32, constructed: bool) -> Self {
        Self::new(TagClass::Universal, constructed, number)
    }

    pub const fn application(number: u32, constructed: bool) -> Self {
        Self::new(TagClass::Application, constructed, number)
    }

    pub const fn context(number: u32, constructed: bool) -> Self {
        Self::new(TagClass::ContextSpecific, constructed, number)
    }

    /// The end-of-contents marker closing an indefinite-length element.
    pub fn is_end_of_contents(&self) -> bool {
        self.class == TagClass::Universal && !self.constructed && self.number == 0
    }

    /// Parses a complete identifier from the start of `data`.
    ///
    /// Returns `Ok(None)` when more octets are needed, otherwise the tag and
    /// the number of identifier octets consumed.
    pub fn parse(data: &[u8]) -> Result<Option<(TagId, usize)>> {
        let Some(&first) = data.first() else {
            return Ok(None);
        };

        let class = TagClass::from_bits(first >> 6);
        let constructed = first & 0x20 != 0;

        if first & 0x1f != 0x1f {
            return Ok(Some((
                TagId::new(class, constructed, (first & 0x1f) as u32),
                1,
            )));
        }

        // High-tag-number form: base-128 digits, most significant first
        let mut number: u32 = 0;
        for (i, &octet) in data.iter().enumerate().skip(1) {
            if i >= MAX_IDENTIFIER_OCTETS {
                return Err(LdapCodecError::MalformedTag(format!(
                    "identifier longer than {} octets",
                    MAX_IDENTIFIER_OCTETS
                )));
            }
            if i == 1 && octet == 0x80 {
                return Err(LdapCodecError::MalformedTag(
                    "non-minimal high tag number".to_string(),
                ));
            }

            number = (number << 7) | (octet & 0x7f) as u32;

            if octet & 0x80 == 0 {
                if number < 0x1f {
                    return Err(LdapCodecError::MalformedTag(format!(
                        "tag number {} must use the low-tag-number form",
                        number
                    )));
                }
                return Ok(Some((TagId::new(class, constructed, number), i + 1)));
            }
        }

        if data.len() >= MAX_IDENTIFIER_OCTETS {
            return Err(LdapCodecError::MalformedTag(format!(
                "identifier longer than {} octets",
                MAX_IDENTIFIER_OCTETS
            )));
        }
        Ok(None)
    }

    /// Appends the identifier octets for this tag to `out`.
    pub fn write_to<B: BufMut>(&self, out: &mut B) {
        let leading = ((self.class as u8) << 6) | if self.constructed { 0x20 } else { 0 };

        if self.number < 0x1f {
            out.put_u8(leading | self.number as u8);
            return;
        }

        out.put_u8(leading | 0x1f);
        let mut digits = [0u8; MAX_IDENTIFIER_OCTETS];
        let mut n = self.number;
        let mut count = 0;
        loop {
            digits[count] = (n & 0x7f) as u8;
            count += 1;
            n >>= 7;
            if n == 0 {
                break;
            }
        }
        for i in (0..count).rev() {
            let continuation = if i == 0 { 0 } else { 0x80 };
            out.put_u8(digits[i] | continuation);
        }
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.number < 0x1f {
            let octet = ((self.class as u8) << 6)
                | if self.constructed { 0x20 } else { 0 }
                | self.number as u8;
            write!(f, "0x{:02x}", octet)
        } else {
            let class = match self.class {
                TagClass::Universal => "UNIVERSAL",
                TagClass::Application => "APPLICATION",
                TagClass::ContextSpecific => "CONTEXT",
                TagClass::Private => "PRIVATE",
            };
            let form = if self.constructed { "c" } else { "p" };
            write!(f, "[{} {}]{}", class, self.number, form)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_tag_number() {
        let (tag, len) = TagId::parse(&[0x30]).unwrap().unwrap();
        assert_eq!(len, 1);
        assert_eq!(tag, TagId::universal(16, true));

        let (tag, _) = TagId::parse(&[0x63]).unwrap().unwrap();
        assert_eq!(tag.class, TagClass::Application);
        assert!(tag.constructed);
        assert_eq!(tag.number, 3);

        let (tag, _) = TagId::parse(&[0x87]).unwrap().unwrap();
        assert_eq!(tag, TagId::context(7, false));
        assert_eq!(tag, TagId::from_octet(0x87));
    }

    #[test]
    fn test_high_tag_number() {
        let (tag, len) = TagId::parse(&[0x9f, 0x81, 0x00]).unwrap().unwrap();
        assert_eq!(len, 3);
        assert_eq!(tag, TagId::context(128, false));

        // Not enough octets yet
        assert!(TagId::parse(&[0x9f, 0x81]).unwrap().is_none());
        assert!(TagId::parse(&[]).unwrap().is_none());
    }

    #[test]
    fn test_malformed_high_tag_number() {
        // Leading 0x80 pad digit
        assert!(matches!(
            TagId::parse(&[0x1f, 0x80, 0x01]),
            Err(LdapCodecError::MalformedTag(_))
        ));
        // Number that fits in the low form
        assert!(matches!(
            TagId::parse(&[0x1f, 0x05]),
            Err(LdapCodecError::MalformedTag(_))
        ));
        // Too many continuation octets
        assert!(matches!(
            TagId::parse(&[0x1f, 0x81, 0x81, 0x81, 0x81, 0x01]),
            Err(LdapCodecError::MalformedTag(_))
        ));
    }

    #[test]
    fn test_write_to_matches_parse() {
        for tag in [
            TagId::from_octet(0x30),
            TagId::from_octet(0xa3),
            TagId::context(31, false),
            TagId::application(300, true),
        ] {
            let mut out = Vec::new();
            tag.write_to(&mut out);
            let (parsed, len) = TagId::parse(&out).unwrap().unwrap();
            assert_eq!(parsed, tag);
            assert_eq!(len, out.len());
        }
    }

    #[test]
    fn test_end_of_contents() {
        assert!(TagId::from_octet(0x00).is_end_of_contents());
        assert!(!TagId::from_octet(0x80).is_end_of_contents());
    }

    #[test]
    fn test_display() {
        assert_eq!(TagId::from_octet(0x30).to_string(), "0x30");
        assert_eq!(TagId::context(40, true).to_string(), "[CONTEXT 40]c");
    }
}
