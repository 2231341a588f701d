use futures::{SinkExt, StreamExt};
use tokio_test::io::Builder;
use tokio_util::codec::{FramedRead, FramedWrite};

use ldapwire::ldap::{LdapProtocolOp, LdapResult, LdapResultCode, PartialAttribute};
use ldapwire::{encode, CodecConfig, LdapCodec, LdapCodecError, LdapMessage};

fn codec() -> LdapCodec {
    LdapCodec::with_config(&CodecConfig::default()).unwrap()
}

fn entry(id: u32, uid: &str) -> LdapMessage {
    LdapMessage::new(
        id,
        LdapProtocolOp::SearchResultEntry {
            dn: format!("uid={},ou=users,dc=example,dc=com", uid),
            attributes: vec![
                PartialAttribute::new("uid", vec![uid.as_bytes().to_vec()]),
                PartialAttribute::new("mail", vec![format!("{}@example.com", uid).into_bytes()]),
            ],
        },
    )
}

fn done(id: u32) -> LdapMessage {
    LdapMessage::new(
        id,
        LdapProtocolOp::SearchResultDone {
            result: LdapResult::success(),
        },
    )
}

#[tokio::test]
async fn test_messages_split_across_reads() {
    let messages = vec![entry(2, "alice"), entry(2, "bob"), done(2)];
    let stream: Vec<u8> = messages
        .iter()
        .flat_map(|m| encode(m).unwrap().to_vec())
        .collect();

    // Read boundaries that fall inside headers, values, and between PDUs
    let mut builder = Builder::new();
    for chunk in stream.chunks(5) {
        builder.read(chunk);
    }
    let mock = builder.build();

    let mut frames = FramedRead::new(mock, codec());
    let mut decoded = Vec::new();
    while let Some(message) = frames.next().await {
        decoded.push(message.unwrap());
    }
    assert_eq!(decoded, messages);
}

#[tokio::test]
async fn test_single_read_with_many_messages() {
    let messages: Vec<LdapMessage> = (1..=20).map(|i| entry(i, &format!("user{}", i))).collect();
    let stream: Vec<u8> = messages
        .iter()
        .flat_map(|m| encode(m).unwrap().to_vec())
        .collect();

    let mock = Builder::new().read(&stream).build();
    let decoded: Vec<LdapMessage> = FramedRead::new(mock, codec())
        .map(|m| m.unwrap())
        .collect()
        .await;
    assert_eq!(decoded, messages);
}

#[tokio::test]
async fn test_connection_closed_mid_message() {
    let bytes = encode(&entry(3, "carol")).unwrap();
    let mock = Builder::new().read(&bytes[..bytes.len() / 2]).build();

    let mut frames = FramedRead::new(mock, codec());
    match frames.next().await {
        Some(Err(LdapCodecError::TruncatedInput { needed })) => {
            assert_eq!(needed, Some(bytes.len() - bytes.len() / 2));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_message_is_reported() {
    // A SearchResultDone with a result code outside the RFC 4511 table
    let bytes = [
        0x30, 0x0c, 0x02, 0x01, 0x01, 0x65, 0x07, 0x0a, 0x01, 0x09, 0x04, 0x00, 0x04, 0x00,
    ];
    let mock = Builder::new().read(&bytes).build();

    let mut frames = FramedRead::new(mock, codec());
    assert!(matches!(
        frames.next().await,
        Some(Err(LdapCodecError::UnknownResultCode(9)))
    ));
}

#[tokio::test]
async fn test_framed_write() {
    let response = LdapMessage::new(
        5,
        LdapProtocolOp::DelResponse {
            result: LdapResult::error(LdapResultCode::NoSuchObject, "no such entry".to_string()),
        },
    );
    let expected = encode(&response).unwrap();

    let mock = Builder::new().write(&expected).build();
    let mut sink = FramedWrite::new(mock, codec());
    sink.send(response).await.unwrap();
}
