pub mod ber;
pub mod config;
pub mod ldap;

pub use config::{CodecConfig, Config, EmptyFilterSets};
pub use ldap::{decode, encode, LdapCodec, LdapGrammar, LdapMessage};

#[derive(thiserror::Error, Debug)]
pub enum LdapCodecError {
    #[error("malformed tag: {0}")]
    MalformedTag(String),

    #[error("invalid length: {0}")]
    InvalidLength(String),

    #[error("truncated input (needed: {needed:?})")]
    TruncatedInput { needed: Option<usize> },

    #[error("{0} bytes of trailing data after PDU")]
    TrailingData(usize),

    #[error("PDU of {size} bytes exceeds limit of {limit} bytes")]
    PduTooLarge { size: u64, limit: usize },

    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("unknown result code: {0}")]
    UnknownResultCode(i64),

    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("unsupported filter choice: {0}")]
    UnsupportedFilterChoice(String),

    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LdapCodecError>;
