use std::fmt;

use crate::{LdapCodecError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum LdapFilter {
    Present(String),                    // (attr=*)
    Equality(String, Vec<u8>),          // (attr=value)
    Substring(String, SubstringFilter), // (attr=*value*)
    GreaterOrEqual(String, Vec<u8>),    // (attr>=value)
    LessOrEqual(String, Vec<u8>),       // (attr<=value)
    Approximate(String, Vec<u8>),       // (attr~=value)
    Extensible(ExtensibleFilter),       // (attr:dn:=value) or (attr:1.2.3.4:=value)
    And(Vec<LdapFilter>),               // (&(filter1)(filter2))
    Or(Vec<LdapFilter>),                // (|(filter1)(filter2))
    Not(Box<LdapFilter>),               // (!(filter))
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubstringFilter {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensibleFilter {
    pub attribute: Option<String>,     // Optional attribute description
    pub matching_rule: Option<String>, // Optional matching rule OID
    pub value: Vec<u8>,                // Assertion value
    pub dn_attributes: bool,           // Whether to match DN components
}

/// Text filters nested deeper than this are rejected by the parser.
const MAX_TEXT_DEPTH: usize = 256;

impl LdapFilter {
    /// Depth of the filter tree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            LdapFilter::And(filters) | LdapFilter::Or(filters) => {
                1 + filters.iter().map(LdapFilter::depth).max().unwrap_or(0)
            }
            LdapFilter::Not(filter) => 1 + filter.depth(),
            _ => 1,
        }
    }
}

fn invalid(message: impl Into<String>) -> LdapCodecError {
    LdapCodecError::InvalidFilter(message.into())
}

// Resolves RFC 4515 `\xx` escapes into the assertion octets
fn unescape_filter_value(value: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut iter = value.bytes();

    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let hex = [iter.next(), iter.next()];
        let [Some(h1), Some(h2)] = hex else {
            return Err(invalid(format!("incomplete escape in '{}'", value)));
        };
        let digits = [h1, h2];
        let byte = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| invalid(format!("invalid escape in '{}'", value)))?;
        bytes.push(byte);
    }

    Ok(bytes)
}

// UTF-8 values keep their printable characters; everything else, and the
// filter metacharacters, are written as `\xx`
fn escape_filter_value(value: &[u8], out: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = std::str::from_utf8(value).ok();
    for (i, &b) in value.iter().enumerate() {
        match b {
            b'*' | b'(' | b')' | b'\\' | 0x00..=0x1f | 0x7f => write!(out, "\\{:02x}", b)?,
            0x20..=0x7e => write!(out, "{}", b as char)?,
            _ => match text {
                // Continuation octets are covered by the character they start
                Some(t) => {
                    if let Some(ch) = t.get(i..).and_then(|rest| rest.chars().next()) {
                        write!(out, "{}", ch)?;
                    }
                }
                None => write!(out, "\\{:02x}", b)?,
            },
        }
    }
    Ok(())
}

fn parse_attribute(attr: &str) -> Result<String> {
    let attr = attr.trim();
    if attr.is_empty() {
        return Err(invalid("missing attribute description"));
    }
    if attr.contains(|c| matches!(c, '(' | ')' | '*' | '\\')) {
        return Err(invalid(format!("invalid attribute description '{}'", attr)));
    }
    Ok(attr.to_string())
}

/// Parses an RFC 4515 string filter such as `(&(objectClass=person)(uid=j*))`.
pub fn parse_ldap_filter(filter_str: &str) -> Result<LdapFilter> {
    parse_filter(filter_str, 0)
}

fn parse_filter(filter_str: &str, depth: usize) -> Result<LdapFilter> {
    if depth >= MAX_TEXT_DEPTH {
        return Err(invalid("filter nested too deeply"));
    }

    let filter_str = filter_str.trim();

    if filter_str.is_empty() {
        return Err(invalid("empty filter string"));
    }

    // Check if filter is wrapped in exactly one pair of parentheses
    if !filter_str.starts_with('(') || closing_paren(filter_str) != Some(filter_str.len() - 1) {
        return Err(invalid(format!(
            "filter must be wrapped in parentheses: {}",
            filter_str
        )));
    }

    let inner = &filter_str[1..filter_str.len() - 1];

    if let Some(rest) = inner.strip_prefix('&') {
        return Ok(LdapFilter::And(parse_composite_filters(rest, depth)?));
    } else if let Some(rest) = inner.strip_prefix('|') {
        return Ok(LdapFilter::Or(parse_composite_filters(rest, depth)?));
    } else if let Some(rest) = inner.strip_prefix('!') {
        let filter = parse_filter(rest, depth + 1)?;
        return Ok(LdapFilter::Not(Box::new(filter)));
    }

    parse_item(inner)
}

fn parse_item(inner: &str) -> Result<LdapFilter> {
    // Attribute descriptions never contain '=', so the first one is the operator
    let Some(eq_pos) = inner.find('=') else {
        return Err(invalid(format!("missing operator in '({})'", inner)));
    };
    let left = &inner[..eq_pos];
    let value = &inner[eq_pos + 1..];

    if let Some(attr) = left.strip_suffix('~') {
        return Ok(LdapFilter::Approximate(
            parse_attribute(attr)?,
            unescape_filter_value(value)?,
        ));
    }
    if let Some(attr) = left.strip_suffix('>') {
        return Ok(LdapFilter::GreaterOrEqual(
            parse_attribute(attr)?,
            unescape_filter_value(value)?,
        ));
    }
    if let Some(attr) = left.strip_suffix('<') {
        return Ok(LdapFilter::LessOrEqual(
            parse_attribute(attr)?,
            unescape_filter_value(value)?,
        ));
    }
    if let Some(head) = left.strip_suffix(':') {
        return parse_extensible_filter(head, value);
    }

    let attr = parse_attribute(left)?;

    if value == "*" {
        return Ok(LdapFilter::Present(attr));
    }

    // Escaped asterisks are `\2a`, so every literal '*' is a wildcard
    if value.contains('*') {
        let parts: Vec<&str> = value.split('*').collect();
        let last = parts.len() - 1;
        let substring = SubstringFilter {
            initial: match parts[0] {
                "" => None,
                s => Some(unescape_filter_value(s)?),
            },
            any: parts[1..last]
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| unescape_filter_value(s))
                .collect::<Result<Vec<_>>>()?,
            final_: match parts[last] {
                "" => None,
                s => Some(unescape_filter_value(s)?),
            },
        };
        return Ok(LdapFilter::Substring(attr, substring));
    }

    Ok(LdapFilter::Equality(attr, unescape_filter_value(value)?))
}

// Format: [attr][:dn][:matchingRule]:=value
fn parse_extensible_filter(head: &str, value: &str) -> Result<LdapFilter> {
    let value = unescape_filter_value(value)?;
    let mut parts = head.split(':');

    let attribute = match parts.next().map(str::trim) {
        Some("") | None => None,
        Some(attr) => Some(parse_attribute(attr)?),
    };

    let mut dn_attributes = false;
    let mut matching_rule = None;
    for (i, part) in parts.enumerate() {
        match part.trim() {
            "" => return Err(invalid(format!("empty component in '{}:='", head))),
            dn if i == 0 && dn.eq_ignore_ascii_case("dn") => dn_attributes = true,
            rule if matching_rule.is_none() => matching_rule = Some(rule.to_string()),
            _ => return Err(invalid(format!("too many components in '{}:='", head))),
        }
    }

    if attribute.is_none() && matching_rule.is_none() {
        return Err(invalid(
            "extensible filter must name an attribute or a matching rule",
        ));
    }

    Ok(LdapFilter::Extensible(ExtensibleFilter {
        attribute,
        matching_rule,
        value,
        dn_attributes,
    }))
}

/// Byte index of the ')' closing the '(' at index 0.
fn closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_composite_filters(s: &str, depth: usize) -> Result<Vec<LdapFilter>> {
    let mut filters = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(invalid(format!("unexpected text in filter set: {}", rest)));
        }
        let end = closing_paren(rest)
            .ok_or_else(|| invalid("unbalanced parentheses in filter"))?;
        filters.push(parse_filter(&rest[..=end], depth + 1)?);
        rest = rest[end + 1..].trim_start();
    }

    Ok(filters)
}

impl fmt::Display for LdapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdapFilter::Present(attr) => write!(f, "({}=*)", attr),
            LdapFilter::Equality(attr, value) => {
                write!(f, "({}=", attr)?;
                escape_filter_value(value, f)?;
                f.write_str(")")
            }
            LdapFilter::Substring(attr, substring) => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = &substring.initial {
                    escape_filter_value(initial, f)?;
                }
                f.write_str("*")?;
                for any in &substring.any {
                    escape_filter_value(any, f)?;
                    f.write_str("*")?;
                }
                if let Some(final_) = &substring.final_ {
                    escape_filter_value(final_, f)?;
                }
                f.write_str(")")
            }
            LdapFilter::GreaterOrEqual(attr, value) => {
                write!(f, "({}>=", attr)?;
                escape_filter_value(value, f)?;
                f.write_str(")")
            }
            LdapFilter::LessOrEqual(attr, value) => {
                write!(f, "({}<=", attr)?;
                escape_filter_value(value, f)?;
                f.write_str(")")
            }
            LdapFilter::Approximate(attr, value) => {
                write!(f, "({}~=", attr)?;
                escape_filter_value(value, f)?;
                f.write_str(")")
            }
            LdapFilter::Extensible(ext) => {
                f.write_str("(")?;
                if let Some(attr) = &ext.attribute {
                    f.write_str(attr)?;
                }
                if ext.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &ext.matching_rule {
                    write!(f, ":{}", rule)?;
                }
                f.write_str(":=")?;
                escape_filter_value(&ext.value, f)?;
                f.write_str(")")
            }
            LdapFilter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            LdapFilter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            LdapFilter::Not(filter) => write!(f, "(!{})", filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let filter = parse_ldap_filter("(cn=*)").unwrap();
        assert_eq!(filter, LdapFilter::Present("cn".to_string()));

        let filter = parse_ldap_filter("(uid=john)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("uid".to_string(), b"john".to_vec())
        );
    }

    #[test]
    fn test_parse_and_filter() {
        let filter = parse_ldap_filter("(&(objectClass=person)(uid=admin))").unwrap();
        match filter {
            LdapFilter::And(filters) => {
                assert_eq!(filters.len(), 2);
                assert_eq!(
                    filters[0],
                    LdapFilter::Equality("objectClass".to_string(), b"person".to_vec())
                );
                assert_eq!(
                    filters[1],
                    LdapFilter::Equality("uid".to_string(), b"admin".to_vec())
                );
            }
            _ => panic!("Expected AND filter"),
        }
    }

    #[test]
    fn test_parse_or_filter() {
        let filter = parse_ldap_filter("(|(uid=user1)(uid=user2))").unwrap();
        match filter {
            LdapFilter::Or(filters) => {
                assert_eq!(filters.len(), 2);
                assert_eq!(
                    filters[1],
                    LdapFilter::Equality("uid".to_string(), b"user2".to_vec())
                );
            }
            _ => panic!("Expected OR filter"),
        }
    }

    #[test]
    fn test_parse_not_filter() {
        let filter = parse_ldap_filter("(!(uid=admin))").unwrap();
        match filter {
            LdapFilter::Not(inner) => {
                assert_eq!(
                    *inner,
                    LdapFilter::Equality("uid".to_string(), b"admin".to_vec())
                );
            }
            _ => panic!("Expected NOT filter"),
        }

        // NOT takes exactly one filter
        assert!(parse_ldap_filter("(!(a=b)(c=d))").is_err());
        assert!(parse_ldap_filter("(!)").is_err());
    }

    #[test]
    fn test_parse_empty_sets() {
        assert_eq!(parse_ldap_filter("(&)").unwrap(), LdapFilter::And(vec![]));
        assert_eq!(parse_ldap_filter("(|)").unwrap(), LdapFilter::Or(vec![]));
    }

    #[test]
    fn test_parse_comparison_filters() {
        assert_eq!(
            parse_ldap_filter("(cn~=john)").unwrap(),
            LdapFilter::Approximate("cn".to_string(), b"john".to_vec())
        );
        assert_eq!(
            parse_ldap_filter("(uidNumber>=1000)").unwrap(),
            LdapFilter::GreaterOrEqual("uidNumber".to_string(), b"1000".to_vec())
        );
        assert_eq!(
            parse_ldap_filter("(uidNumber<=2000)").unwrap(),
            LdapFilter::LessOrEqual("uidNumber".to_string(), b"2000".to_vec())
        );
        // Operators inside the value belong to the value
        assert_eq!(
            parse_ldap_filter("(cn=a>=b)").unwrap(),
            LdapFilter::Equality("cn".to_string(), b"a>=b".to_vec())
        );
    }

    #[test]
    fn test_parse_extensible_filter() {
        let filter = parse_ldap_filter("(cn:=john)").unwrap();
        match filter {
            LdapFilter::Extensible(ext) => {
                assert_eq!(ext.attribute, Some("cn".to_string()));
                assert_eq!(ext.value, b"john");
                assert!(!ext.dn_attributes);
                assert!(ext.matching_rule.is_none());
            }
            _ => panic!("Expected extensible filter"),
        }

        let filter = parse_ldap_filter("(cn:dn:2.5.13.5:=John)").unwrap();
        match filter {
            LdapFilter::Extensible(ext) => {
                assert_eq!(ext.attribute, Some("cn".to_string()));
                assert_eq!(ext.value, b"John");
                assert!(ext.dn_attributes);
                assert_eq!(ext.matching_rule, Some("2.5.13.5".to_string()));
            }
            _ => panic!("Expected extensible filter"),
        }

        let filter = parse_ldap_filter("(:dn:caseExactMatch:=example)").unwrap();
        match filter {
            LdapFilter::Extensible(ext) => {
                assert!(ext.attribute.is_none());
                assert!(ext.dn_attributes);
                assert_eq!(ext.matching_rule, Some("caseExactMatch".to_string()));
            }
            _ => panic!("Expected extensible filter"),
        }
    }

    #[test]
    fn test_extensible_match_errors() {
        // Neither an attribute nor a matching rule
        assert!(parse_ldap_filter("(:dn:=example)").is_err());
        assert!(parse_ldap_filter("(:=example)").is_err());
        assert!(parse_ldap_filter("(cn::=x)").is_err());
        assert!(parse_ldap_filter("(cn:dn:rule:extra:=x)").is_err());
    }

    #[test]
    fn test_escape_sequences() {
        let filter = parse_ldap_filter("(cn=John\\20Smith)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("cn".to_string(), b"John Smith".to_vec())
        );

        let filter = parse_ldap_filter("(cn=\\28test\\29)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("cn".to_string(), b"(test)".to_vec())
        );

        let filter = parse_ldap_filter("(cn=\\2a)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("cn".to_string(), b"*".to_vec())
        );

        // Multi-octet UTF-8 written as escapes
        let filter = parse_ldap_filter("(sn=Lu\\c4\\8di\\c4\\87)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("sn".to_string(), "Lučić".as_bytes().to_vec())
        );
    }

    #[test]
    fn test_unescape_filter_value() {
        assert_eq!(unescape_filter_value("test").unwrap(), b"test");
        assert_eq!(unescape_filter_value("test\\20value").unwrap(), b"test value");
        assert_eq!(unescape_filter_value("\\5c").unwrap(), b"\\");
        assert_eq!(unescape_filter_value("\\00").unwrap(), b"\0");
        assert_eq!(unescape_filter_value("\\ff\\FE").unwrap(), vec![0xff, 0xfe]);

        assert!(unescape_filter_value("\\").is_err());
        assert!(unescape_filter_value("\\2").is_err());
        assert!(unescape_filter_value("\\zz").is_err());
    }

    #[test]
    fn test_substring_filter_patterns() {
        let filter = parse_ldap_filter("(cn=*a*b*c*)").unwrap();
        match filter {
            LdapFilter::Substring(attr, sub) => {
                assert_eq!(attr, "cn");
                assert!(sub.initial.is_none());
                assert!(sub.final_.is_none());
                assert_eq!(sub.any, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
            }
            _ => panic!("Expected substring filter"),
        }

        let filter = parse_ldap_filter("(cn=john*)").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Substring(
                "cn".to_string(),
                SubstringFilter {
                    initial: Some(b"john".to_vec()),
                    any: vec![],
                    final_: None,
                }
            )
        );

        // Adjacent wildcards do not produce empty components
        let filter = parse_ldap_filter("(cn=**test**)").unwrap();
        match filter {
            LdapFilter::Substring(_, sub) => assert_eq!(sub.any, vec![b"test".to_vec()]),
            _ => panic!("Expected substring filter"),
        }
    }

    #[test]
    fn test_parse_filter_edge_cases() {
        assert!(parse_ldap_filter("").is_err());
        assert!(parse_ldap_filter("(cn=test").is_err());
        assert!(parse_ldap_filter("cn=test)").is_err());
        assert!(parse_ldap_filter("()").is_err());
        assert!(parse_ldap_filter("((cn=test))").is_err());
        assert!(parse_ldap_filter("(cn=a)(sn=b)").is_err());
        assert!(parse_ldap_filter("(&(cn=a)junk)").is_err());
        assert!(parse_ldap_filter("(=value)").is_err());

        let long_value = "v".repeat(10000);
        let filter = format!("(cn={})", long_value);
        assert!(parse_ldap_filter(&filter).is_ok());
    }

    #[test]
    fn test_filter_whitespace_handling() {
        // Leading/trailing spaces in values are significant
        let filter = parse_ldap_filter("(cn= test )").unwrap();
        assert_eq!(
            filter,
            LdapFilter::Equality("cn".to_string(), b" test ".to_vec())
        );

        // Spaces between set members are tolerated
        let filter = parse_ldap_filter("(& (cn=a) (sn=b) )").unwrap();
        assert!(matches!(filter, LdapFilter::And(ref f) if f.len() == 2));
    }

    #[test]
    fn test_nesting_limit() {
        let mut nested = String::from("(cn=test)");
        for _ in 0..50 {
            nested = format!("(!{})", nested);
        }
        let filter = parse_ldap_filter(&nested).unwrap();
        assert_eq!(filter.depth(), 51);

        let mut too_deep = String::from("(cn=test)");
        for _ in 0..MAX_TEXT_DEPTH {
            too_deep = format!("(!{})", too_deep);
        }
        assert!(matches!(
            parse_ldap_filter(&too_deep),
            Err(LdapCodecError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_display_escapes_values() {
        let filter = LdapFilter::Equality("cn".to_string(), b"a*(b)\\c".to_vec());
        assert_eq!(filter.to_string(), "(cn=a\\2a\\28b\\29\\5cc)");

        let filter = LdapFilter::Substring(
            "cn".to_string(),
            SubstringFilter {
                initial: Some(b"jo".to_vec()),
                any: vec![b"h".to_vec()],
                final_: Some(b"n".to_vec()),
            },
        );
        assert_eq!(filter.to_string(), "(cn=jo*h*n)");

        let filter = LdapFilter::Extensible(ExtensibleFilter {
            attribute: Some("cn".to_string()),
            matching_rule: Some("2.5.13.5".to_string()),
            value: b"John".to_vec(),
            dn_attributes: true,
        });
        assert_eq!(filter.to_string(), "(cn:dn:2.5.13.5:=John)");

        let filter = LdapFilter::Equality("sn".to_string(), "Lučić\n".as_bytes().to_vec());
        assert_eq!(filter.to_string(), "(sn=Lučić\\0a)");
    }

    #[test]
    fn test_binary_assertion_values() {
        let guid = vec![0xff, 0xfe, 0x00, 0x2a, 0x41, 0x80];
        let filter = LdapFilter::Equality("objectGUID".to_string(), guid.clone());
        assert_eq!(filter.to_string(), "(objectGUID=\\ff\\fe\\00\\2aA\\80)");
        assert_eq!(parse_ldap_filter(&filter.to_string()).unwrap(), filter);

        let filter = parse_ldap_filter("(&(objectSid=\\01\\05*)(cn:1.2.3:=\\c3))").unwrap();
        assert_eq!(
            filter,
            LdapFilter::And(vec![
                LdapFilter::Substring(
                    "objectSid".to_string(),
                    SubstringFilter {
                        initial: Some(vec![0x01, 0x05]),
                        any: vec![],
                        final_: None,
                    }
                ),
                LdapFilter::Extensible(ExtensibleFilter {
                    attribute: Some("cn".to_string()),
                    matching_rule: Some("1.2.3".to_string()),
                    value: vec![0xc3],
                    dn_attributes: false,
                }),
            ])
        );
        assert_eq!(parse_ldap_filter(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_display_parse_round_trip() {
        for text in [
            "(&(objectClass=person)(|(uid=a\\2ab)(!(cn=x*y*z)))(mail=*))",
            "(cn=*mid*)",
            "(cn=*end)",
            "(&)",
            "(|(a>=1)(b<=2)(c~=3))",
            "(:2.5.13.2:=Foo)",
            "(sn=\\28\\29)",
        ] {
            let filter = parse_ldap_filter(text).unwrap();
            assert_eq!(filter.to_string(), text);
            assert_eq!(parse_ldap_filter(&filter.to_string()).unwrap(), filter);
        }
    }
}
