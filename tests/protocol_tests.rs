//! Wire format tests: inbound decoding, outbound envelopes and the binary
//! upload frame, checked against literal JSON and bytes.

use feedwire::protocol::*;
use feedwire::transport::{BinaryType, SentFrame};
use feedwire::{FeedError, MemorySocket, Transport};
use rstest::rstest;
use serde_json::{json, Map, Value};
use tokio_test::{assert_err, assert_ok};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[rstest]
#[case(r#"{"task": "pong"}"#, InboundTask::Pong)]
#[case(r#"{"task": "no_more_old_messages"}"#, InboundTask::NoMoreOldMessages)]
#[case(r#"{"task": "hide_dialog", "extra": 1}"#, InboundTask::HideDialog)]
#[case(r#"{"task": "remove_message", "message_id": 4}"#, InboundTask::RemoveMessage { message_id: MessageId(4) })]
#[case(r#"{"task": "banner", "content": "<b/>"}"#, InboundTask::Banner { content: "<b/>".into() })]
#[case(r#"{"task": "something_new"}"#, InboundTask::Unrecognized)]
fn test_decode_tasks(#[case] text: &str, #[case] expected: InboundTask) {
    let frame = assert_ok!(decode(text));
    assert_eq!(frame.task, expected);
}

#[rstest]
#[case("")]
#[case("[]")]
#[case(r#"{"task": 5}"#)]
#[case(r#"{"task": "inline_reply_box", "message_id": 1}"#)]
fn test_decode_rejects(#[case] text: &str) {
    assert_err!(decode(text));
}

#[test]
fn test_decode_reply_fragments() {
    let frame = assert_ok!(decode(
        r#"{"task": "more_new_messages", "messages": [
            {"message_id": 1, "content": "a"},
            {"message_id": 2, "parent_id": 1, "content": "b"}]}"#
    ));
    assert_eq!(
        frame.task,
        InboundTask::MoreNewMessages {
            messages: vec![MessageFragment::new(1, "a"), MessageFragment::new(2, "b").reply_to(1)]
        }
    );
}

#[test]
fn test_decode_bottom_placement() {
    let frame = assert_ok!(decode(
        r#"{"task": "inject_deliver_new_message", "content": "x", "new_mid": 3,
            "reference_mid": 2, "placement": "bottom"}"#
    ));
    match frame.task {
        InboundTask::InjectDeliverNewMessage(inj) => {
            assert_eq!(inj.placement, Some(Placement::Bottom));
            assert_eq!(inj.reference_mid.non_zero(), Some(MessageId(2)));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_element_ids_round_trip() {
    assert_eq!(MessageId(17).element_id(), "message_17");
    assert_eq!(MessageId::from_element_id("message_17"), Some(MessageId(17)));
    assert_eq!(MessageId::from_element_id("attachments_17"), None);
    assert_eq!(MessageId::from_element_id("message_x"), None);
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[rstest]
#[case(Outbound::OpenFeed { filter: Some("unread".into()) },
       json!({"module": "app.messages", "task": "messages", "filt": "unread"}))]
#[case(Outbound::OpenFeed { filter: None }, json!({"module": "app.messages", "task": "messages"}))]
#[case(Outbound::FetchOlder { before: Some(MessageId(5)) },
       json!({"module": "app.messages", "task": "more_old_messages", "before_mid": 5}))]
#[case(Outbound::FetchNewer { after: None }, json!({"module": "app.messages", "task": "more_new_messages"}))]
#[case(Outbound::SendReply { message_id: MessageId(8), parent_mid: MessageId(2), to_sender_only: true },
       json!({"module": "app.messages", "task": "send_reply", "message_id": 8, "parent_mid": 2, "to_sender_only": "1"}))]
#[case(Outbound::Finish, json!({"module": "app.main", "task": "finish"}))]
fn test_outbound_envelopes(#[case] action: Outbound, #[case] expected: Value) {
    assert_eq!(serde_json::to_value(action.envelope()).unwrap(), expected);
}

#[test]
fn test_transport_generic_send() {
    let mut transport = Transport::new(MemorySocket::open());
    let mut fields = Map::new();
    fields.insert("x".into(), json!(1));
    assert_ok!(transport.send_task("app.other", "poke", fields.clone()));
    assert_ok!(transport.send("poke", fields));
    assert_eq!(
        transport.socket().sent_json(),
        vec![
            json!({"module": "app.other", "task": "poke", "x": 1}),
            json!({"task": "poke", "x": 1}),
        ]
    );
    assert_eq!(transport.frames_sent(), 2);
}

// ---------------------------------------------------------------------------
// Upload frame
// ---------------------------------------------------------------------------

#[test]
fn test_upload_frame_layout() {
    let header = UploadHeader::new(
        MESSAGES_MODULE,
        3,
        vec![
            FileMeta { name: "A".into(), size: 2 },
            FileMeta { name: "B".into(), size: 1 },
        ],
    );
    let frame = assert_ok!(encode_upload_frame(&header, &[&b"aa"[..], &b"b"[..]]));

    assert_eq!(frame[0], b'!');
    assert!(frame.ends_with(b"\r\n\r\naab"));
    let json_end = frame.len() - 7;
    let parsed: Value = serde_json::from_slice(&frame[1..json_end]).unwrap();
    assert_eq!(
        parsed,
        json!({"module": "app.messages", "task": "upload_files", "partition_id": 3,
               "files": [{"name": "A", "size": 2}, {"name": "B", "size": 1}]})
    );
}

#[test]
fn test_upload_frame_rejects_wrong_sizes() {
    let header = UploadHeader::new(MESSAGES_MODULE, 1, vec![FileMeta { name: "A".into(), size: 4 }]);
    assert!(matches!(
        encode_upload_frame(&header, &[&b"abc"[..]]),
        Err(FeedError::UploadSizeMismatch { expected: 4, actual: 3, .. })
    ));
    assert_err!(encode_upload_frame(&header, &[]));
    assert_err!(UploadFrame::parse(b"{}\r\n\r\n"));
}

#[test]
fn test_upload_restores_binary_type() {
    let mut transport = Transport::new(MemorySocket::open());
    assert_ok!(transport.send_upload(vec![0x21]));
    match &transport.socket().sent()[0] {
        SentFrame::Binary { binary_type, .. } => assert_eq!(*binary_type, BinaryType::ArrayBuffer),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        feedwire::transport::Socket::binary_type(transport.socket()),
        BinaryType::Blob
    );
}
