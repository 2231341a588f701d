#![no_main]

use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

use ldapwire::{decode, encode, CodecConfig, LdapCodec, LdapGrammar};

fn grammar() -> &'static Arc<LdapGrammar> {
    static GRAMMAR: OnceLock<Arc<LdapGrammar>> = OnceLock::new();
    GRAMMAR.get_or_init(|| LdapGrammar::build(&CodecConfig::default()).unwrap())
}

fuzz_target!(|data: &[u8]| {
    // One-shot decode must never panic. Anything it accepts and that can be
    // encoded again must decode back to the same message.
    if let Ok(message) = decode(grammar(), data) {
        if let Ok(bytes) = encode(&message) {
            assert_eq!(decode(grammar(), &bytes).unwrap(), message);
        }
    }

    // Feeding the same input in small chunks through the stream codec
    let mut codec = LdapCodec::new(grammar().clone());
    let mut buf = BytesMut::new();
    for chunk in data.chunks(7) {
        buf.extend_from_slice(chunk);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(_message)) => continue,
                Ok(None) => break,
                Err(_e) => return,
            }
        }
    }
    let _ = codec.decode_eof(&mut buf);
});
