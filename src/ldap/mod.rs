pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod filters;
pub mod protocol;
pub mod rules;
pub mod stack;
pub mod transform;
pub mod wire;

pub use codec::{decode, encode, LdapCodec};
pub use decoder::{decode_pdu, LdapDecoder};
pub use encoder::encode_pdu;
pub use filters::{parse_ldap_filter, ExtensibleFilter, LdapFilter, SubstringFilter};
pub use protocol::{
    BindAuthentication, Control, DerefAliases, LdapMessage, LdapMessageId, LdapProtocolOp,
    LdapResult, LdapResultCode, ModificationItem, ModifyOperation, PartialAttribute,
    SearchScope,
};
pub use rules::LdapGrammar;
pub use transform::{to_domain, to_wire};
