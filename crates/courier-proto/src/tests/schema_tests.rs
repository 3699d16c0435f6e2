use prost::Message;

use crate::service::{data_message, envelope, group_context};
use crate::{Content, DataMessage, Envelope, GroupContext, SyncMessage};

#[test]
fn envelope_roundtrip() {
    let env = Envelope {
        r#type: Some(envelope::Type::Ciphertext as i32),
        source: Some("+15550001111".to_string()),
        relay: None,
        timestamp: Some(1_500_000_000_000),
        legacy_message: None,
        source_device: Some(2),
        content: Some(vec![9, 9, 9]),
    };
    let bytes = env.encode_to_vec();
    let parsed = Envelope::decode(bytes.as_slice()).expect("decode");
    assert_eq!(env, parsed);
    assert_eq!(parsed.envelope_type(), envelope::Type::Ciphertext);
    assert_eq!(parsed.source(), "+15550001111");
    assert_eq!(parsed.source_device(), 2);
}

#[test]
fn envelope_field_tags_match_reference_schema() {
    // source=2 (string), timestamp=5 (varint), source_device=7 (varint),
    // content=8 (bytes).
    let raw: Vec<u8> = vec![
        0x12, 0x02, b'+', b'1', // field 2, "+1"
        0x28, 0x2a, // field 5, 42
        0x38, 0x03, // field 7, 3
        0x42, 0x01, 0xff, // field 8, one byte
    ];
    let parsed = Envelope::decode(raw.as_slice()).expect("decode");
    assert_eq!(parsed.source(), "+1");
    assert_eq!(parsed.timestamp(), 42);
    assert_eq!(parsed.source_device(), 3);
    assert_eq!(parsed.content.as_deref(), Some(&[0xffu8][..]));
}

#[test]
fn content_roundtrip_with_data_message() {
    let content = Content {
        data_message: Some(DataMessage {
            body: Some("hi".to_string()),
            flags: Some(data_message::FLAG_END_SESSION),
            group: Some(GroupContext {
                id: Some(vec![1, 2, 3]),
                r#type: Some(group_context::Type::Deliver as i32),
                name: None,
                members: vec!["+15550002222".to_string()],
                avatar: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let bytes = content.encode_to_vec();
    let parsed = Content::decode(bytes.as_slice()).expect("decode");
    assert_eq!(content, parsed);
    let group = parsed
        .data_message
        .as_ref()
        .and_then(|m| m.group.as_ref())
        .expect("group");
    assert_eq!(group.group_type(), group_context::Type::Deliver);
}

#[test]
fn sync_message_read_entries_roundtrip() {
    let sync = SyncMessage {
        read: vec![
            crate::sync_message::Read {
                sender: Some("+15550003333".to_string()),
                timestamp: Some(100),
            },
            crate::sync_message::Read {
                sender: Some("+15550004444".to_string()),
                timestamp: Some(200),
            },
        ],
        ..Default::default()
    };
    let bytes = sync.encode_to_vec();
    let parsed = SyncMessage::decode(bytes.as_slice()).expect("decode");
    assert_eq!(parsed.read.len(), 2);
    assert_eq!(parsed.read[1].timestamp, Some(200));
}

#[test]
fn unknown_group_type_falls_back_to_unknown() {
    let group = GroupContext {
        r#type: Some(77),
        ..Default::default()
    };
    assert_eq!(group.group_type(), group_context::Type::Unknown);
}
