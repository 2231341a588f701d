use bytes::BufMut;

use crate::{LdapCodecError, Result};

/// A decoded BER length: definite (short or long form) or indefinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BerLength {
    Definite(u64),
    Indefinite,
}

impl BerLength {
    /// Try to parse a length from the start of `data`.
    ///
    /// Returns `Ok(None)` if more octets are needed, otherwise the length and
    /// the number of octets it occupied.
    pub fn parse(data: &[u8]) -> Result<Option<(BerLength, usize)>> {
        let Some(&first) = data.first() else {
            return Ok(None);
        };

        if first & 0x80 == 0 {
            return Ok(Some((BerLength::Definite(first as u64), 1)));
        }

        let num_octets = (first & 0x7f) as usize;
        match num_octets {
            0 => Ok(Some((BerLength::Indefinite, 1))),
            // 0xff is reserved by X.690
            0x7f => Err(LdapCodecError::InvalidLength(
                "reserved length octet 0xff".to_string(),
            )),
            n if n > 8 => Err(LdapCodecError::InvalidLength(format!(
                "{} length octets exceeds 8",
                n
            ))),
            n => {
                if data.len() < 1 + n {
                    return Ok(None);
                }
                let value = data[1..=n]
                    .iter()
                    .fold(0u64, |acc, &b| (acc << 8) | b as u64);
                Ok(Some((BerLength::Definite(value), 1 + n)))
            }
        }
    }

    pub fn definite(&self) -> Option<u64> {
        match self {
            BerLength::Definite(v) => Some(*v),
            BerLength::Indefinite => None,
        }
    }

    /// Appends the minimal definite-length encoding of `length` to `out`.
    pub fn write_definite<B: BufMut>(out: &mut B, length: usize) {
        if length < 0x80 {
            out.put_u8(length as u8);
            return;
        }

        let bytes = (length as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.put_u8(0x80 | (bytes.len() - skip) as u8);
        out.put_slice(&bytes[skip..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_form() {
        assert_eq!(
            BerLength::parse(&[0x02]).unwrap(),
            Some((BerLength::Definite(2), 1))
        );
        assert_eq!(
            BerLength::parse(&[0x7f]).unwrap(),
            Some((BerLength::Definite(127), 1))
        );
    }

    #[test]
    fn test_parse_long_form() {
        assert_eq!(BerLength::parse(&[0x81]).unwrap(), None);
        assert_eq!(
            BerLength::parse(&[0x81, 0x80]).unwrap(),
            Some((BerLength::Definite(128), 2))
        );
        assert_eq!(BerLength::parse(&[0x82, 0x01]).unwrap(), None);
        assert_eq!(
            BerLength::parse(&[0x82, 0x01, 0x00]).unwrap(),
            Some((BerLength::Definite(256), 3))
        );
        // Non-minimal long form is legal BER
        assert_eq!(
            BerLength::parse(&[0x84, 0, 0, 0, 0x05]).unwrap(),
            Some((BerLength::Definite(5), 5))
        );
    }

    #[test]
    fn test_parse_indefinite_and_invalid() {
        assert_eq!(
            BerLength::parse(&[0x80]).unwrap(),
            Some((BerLength::Indefinite, 1))
        );
        assert!(matches!(
            BerLength::parse(&[0xff]),
            Err(LdapCodecError::InvalidLength(_))
        ));
        assert!(matches!(
            BerLength::parse(&[0x89, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
            Err(LdapCodecError::InvalidLength(_))
        ));
        assert_eq!(BerLength::parse(&[]).unwrap(), None);
    }

    #[test]
    fn test_write_definite() {
        let encode = |len: usize| {
            let mut out: Vec<u8> = Vec::new();
            BerLength::write_definite(&mut out, len);
            out
        };
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(0x7f), vec![0x7f]);
        assert_eq!(encode(0x80), vec![0x81, 0x80]);
        assert_eq!(encode(0x0100), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode(0x010000), vec![0x83, 0x01, 0x00, 0x00]);
        assert_eq!(encode(0x01000000), vec![0x84, 0x01, 0x00, 0x00, 0x00]);
    }
}
