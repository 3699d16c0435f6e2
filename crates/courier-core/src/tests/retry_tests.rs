use prost::Message;

use courier_proto::{sync_message, Content, DataMessage, NullMessage, SyncMessage};

use crate::events::Event;
use crate::padding::pad;
use crate::retry::validate_retry_content_message;
use crate::tests::{data_message, harness, next_event, test_config};

const PEER: &str = "+15550003333";

#[tokio::test]
async fn old_timestamp_takes_the_legacy_path() {
    let h = harness(test_config());
    let mut rx = h.receiver.subscribe();
    let legacy = data_message("from before the cutover");
    let ciphertext = pad(&legacy.encode_to_vec());

    h.receiver
        .try_message_again(&format!("{PEER}.1"), &ciphertext, 1_490_000_000_000)
        .await
        .expect("retry");

    let Event::Message(message) = next_event(&mut rx).await else {
        panic!("expected message event");
    };
    assert_eq!(message.source, PEER);
    assert_eq!(
        message.message.body.as_deref(),
        Some("from before the cutover")
    );
}

#[tokio::test]
async fn recent_timestamp_decodes_as_content() {
    let h = harness(test_config());
    let mut rx = h.receiver.subscribe();
    let content = Content {
        data_message: Some(data_message("fresh")),
        ..Default::default()
    };
    let ciphertext = pad(&content.encode_to_vec());

    h.receiver
        .try_message_again(&format!("{PEER}.1"), &ciphertext, 1_500_000_000_000)
        .await
        .expect("retry");

    let Event::Message(message) = next_event(&mut rx).await else {
        panic!("expected message event");
    };
    assert_eq!(message.message.body.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn bad_address_is_rejected() {
    let h = harness(test_config());
    let result = h
        .receiver
        .try_message_again("not-an-address", &pad(b"x"), 1_500_000_000_000)
        .await;
    assert!(result.is_err());
}

#[test]
fn validation_rejects_sync_messages() {
    let content = Content {
        sync_message: Some(SyncMessage {
            read: vec![sync_message::Read::default()],
            ..Default::default()
        }),
        null_message: Some(NullMessage::default()),
        ..Default::default()
    };
    assert!(!validate_retry_content_message(&content));
}

#[test]
fn validation_requires_exactly_one_variant() {
    let none = Content::default();
    assert!(!validate_retry_content_message(&none));
    let both = Content {
        data_message: Some(data_message("x")),
        null_message: Some(NullMessage::default()),
        ..Default::default()
    };
    assert!(!validate_retry_content_message(&both));
    let one = Content {
        null_message: Some(NullMessage::default()),
        ..Default::default()
    };
    assert!(validate_retry_content_message(&one));
}

#[test]
fn validation_requires_a_meaningful_data_message() {
    let hollow = Content {
        data_message: Some(DataMessage::default()),
        ..Default::default()
    };
    assert!(!validate_retry_content_message(&hollow));
    let with_flags = Content {
        data_message: Some(DataMessage {
            flags: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(validate_retry_content_message(&with_flags));
}
