use crate::stream::{write_delimited, ProtoStreamReader, StreamError};
use crate::ContactDetails;

#[test]
fn reads_back_every_entry_in_order() {
    let mut blob = Vec::new();
    for number in ["+15550001111", "+15550002222", "+15550003333"] {
        write_delimited(
            &mut blob,
            &ContactDetails {
                number: Some(number.to_string()),
                ..Default::default()
            },
        );
    }
    let mut reader = ProtoStreamReader::new(&blob);
    let mut numbers = Vec::new();
    while let Some(contact) = reader.next::<ContactDetails>().expect("entry") {
        numbers.push(contact.number.unwrap_or_default());
    }
    assert_eq!(
        numbers,
        vec!["+15550001111", "+15550002222", "+15550003333"]
    );
}

#[test]
fn empty_blob_yields_nothing() {
    let mut reader = ProtoStreamReader::new(&[]);
    assert!(reader.next::<ContactDetails>().expect("none").is_none());
}

#[test]
fn truncated_entry_is_an_error() {
    let mut blob = Vec::new();
    write_delimited(
        &mut blob,
        &ContactDetails {
            number: Some("+15550001111".to_string()),
            ..Default::default()
        },
    );
    blob.truncate(blob.len() - 2);
    let mut reader = ProtoStreamReader::new(&blob);
    assert!(matches!(
        reader.next::<ContactDetails>(),
        Err(StreamError::Truncated)
    ));
}
