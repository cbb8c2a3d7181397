//! End-to-end tests for the client: JSON frames in, document state and
//! outbound frames out, using the in-memory document and socket.

use std::time::{Duration, Instant};

use feedwire::protocol::UploadFrame;
use feedwire::transport::SentFrame;
use feedwire::*;
use serde_json::{json, Value};

fn config() -> ClientConfig {
    ClientConfig {
        viewport_height_px: 96.0,
        row_height_px: 48.0,
        ..ClientConfig::default()
    }
}

fn client() -> Client<MemoryDocument, MemorySocket> {
    let config = config();
    let doc = MemoryDocument::with_layout(
        &config.layout,
        config.viewport_height_px,
        config.row_height_px,
    );
    Client::new(config, doc, MemorySocket::open())
}

fn push(c: &mut Client<MemoryDocument, MemorySocket>, frame: Value, now: Instant) {
    c.handle_text(&frame.to_string(), now).unwrap();
}

fn page(ids: &[u64]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| json!({"message_id": id, "content": format!("<p>{id}</p>")}))
            .collect(),
    )
}

fn tasks(c: &Client<MemoryDocument, MemorySocket>) -> Vec<String> {
    c.transport().socket().sent_tasks()
}

fn last_sent(c: &Client<MemoryDocument, MemorySocket>) -> Value {
    c.transport()
        .socket()
        .sent_json()
        .pop()
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[test]
fn test_feed_replace_then_older_page_keeps_anchor() {
    let mut c = client();
    let t0 = Instant::now();
    c.start(t0).unwrap();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&[11, 12, 13, 14, 15]),
               "scroll_to_bottom": 1, "more_newer": 0}),
        t0,
    );
    assert!(c.doc().contains("messages"));
    assert!(c.stream().live_accept());
    assert_eq!(c.doc().scroll_top("messages"), 144.0);

    c.scroll_to(0.0).unwrap();
    assert_eq!(tasks(&c), vec!["messages", "more_old_messages"]);
    assert_eq!(last_sent(&c)["before_mid"], json!(11));

    // one fetch in flight per boundary
    c.scroll_to(0.0).unwrap();
    assert_eq!(tasks(&c).len(), 2);

    push(&mut c, json!({"task": "more_old_messages", "messages": page(&[9, 10])}), t0);
    assert_eq!(
        c.doc().ids_in("messages"),
        vec!["message_9", "message_10", "message_11", "message_12", "message_13", "message_14", "message_15"]
    );
    assert_eq!(c.doc().scroll_top("messages"), 96.0);
    assert_eq!(c.stream().older_state(), BoundaryState::Idle);

    push(&mut c, json!({"task": "no_more_old_messages"}), t0);
    assert_eq!(c.stream().older_state(), BoundaryState::Exhausted);
    c.scroll_to(0.0).unwrap();
    assert_eq!(tasks(&c).len(), 2);
}

#[test]
fn test_short_feed_asks_forward_only() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&[1]), "more_newer": true}),
        t0,
    );
    assert_eq!(tasks(&c), vec!["more_new_messages_forward_only"]);
    assert!(!c.stream().live_accept());

    push(&mut c, json!({"task": "more_new_messages", "messages": []}), t0);
    assert!(c.stream().live_accept());
}

// ---------------------------------------------------------------------------
// Live injection
// ---------------------------------------------------------------------------

#[test]
fn test_injection_appends_once_and_acks() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[1, 2, 3])}), t0);
    let inject = json!({"task": "inject_deliver_new_message", "content": "<p>new</p>",
                        "new_mid": 20, "reference_mid": 0});
    push(&mut c, inject.clone(), t0);
    push(&mut c, inject, t0);

    let acks: Vec<Value> = c
        .transport()
        .socket()
        .sent_json()
        .into_iter()
        .filter(|v| v["task"] == "injected_message")
        .collect();
    assert_eq!(acks, vec![json!({"module": "app.messages", "task": "injected_message", "message_id": 20})]);
    assert_eq!(c.doc().ids_in("messages").last().map(String::as_str), Some("message_20"));
    assert_eq!(c.doc().ids_in("messages").len(), 4);
}

#[test]
fn test_injection_waits_for_pagination_while_newer_pages_remain() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&[1, 2, 3]), "more_newer": 1}),
        t0,
    );
    push(
        &mut c,
        json!({"task": "inject_deliver_new_message", "content": "<p/>", "new_mid": 20}),
        t0,
    );
    assert!(!c.doc().contains("message_20"));
    assert!(!tasks(&c).contains(&"injected_message".to_owned()));
}

#[test]
fn test_injection_relative_to_reference() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&[1, 2]), "more_newer": 1}),
        t0,
    );
    push(
        &mut c,
        json!({"task": "inject_deliver_new_message", "content": "<p/>", "new_mid": 7,
               "reference_mid": 1, "placement": "beforeend"}),
        t0,
    );
    assert_eq!(c.doc().parent_of("message_7").as_deref(), Some("message_1"));
    assert_eq!(c.stream().parent_of(MessageId(7)), Some(MessageId(1)));
    assert_eq!(last_sent(&c)["task"], "injected_message");
}

#[test]
fn test_injection_scrolls_offscreen_reference_into_view() {
    let mut c = client();
    let t0 = Instant::now();
    let ids: Vec<u64> = (1..=39).collect();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&ids), "scroll_to_bottom": 1}),
        t0,
    );
    assert_eq!(c.doc().scroll_top("messages"), 1776.0);
    assert!(!c.doc().is_in_view("messages", "message_2"));

    push(
        &mut c,
        json!({"task": "inject_deliver_new_message", "content": "<p/>", "new_mid": 100,
               "reference_mid": 2, "placement": "afterend"}),
        t0,
    );
    assert_eq!(c.doc().parent_of("message_100").as_deref(), Some("messages"));
    assert!(c.doc().is_in_view("messages", "message_2"));
    // smallest move: the reference lands on the top edge
    assert_eq!(c.doc().scroll_top("messages"), 48.0);
    assert!(c.doc().is_in_view("messages", "message_100"));
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

#[test]
fn test_edit_autosave_then_send() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "edit_message", "content": "", "message_id": 7}),
        t0,
    );
    let dialog = c.config().layout.dialog.clone();
    assert!(!c.doc().classes(&dialog).contains(&"hide".to_owned()));
    assert_eq!(c.doc().focused(), Some(dialog.as_str()));

    c.doc_mut().type_into(&dialog, "hello").unwrap();
    let interval = c.config().autosave_interval();
    c.fire_due(t0 + interval).unwrap();
    assert_eq!(
        last_sent(&c),
        json!({"module": "app.messages", "task": "save_wip", "message_id": 7, "content": "hello"})
    );

    // unchanged content is not resent
    c.fire_due(t0 + interval * 2).unwrap();
    assert_eq!(tasks(&c), vec!["save_wip"]);

    assert!(c.send_message().unwrap());
    assert_eq!(tasks(&c), vec!["save_wip", "send_message"]);
    assert!(c.drafts().active().is_none());
    assert_eq!(c.next_deadline(), None);
}

#[test]
fn test_editor_chrome_is_not_saved_as_draft() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "edit_message", "message_id": 7,
               "content": "<div id=\"edit_message_content\" contenteditable>old draft</div><button>Send</button>"}),
        t0,
    );
    let dialog = c.config().layout.dialog.clone();
    let interval = c.config().autosave_interval();
    c.fire_due(t0 + interval).unwrap();
    assert!(tasks(&c).is_empty());

    c.doc_mut().type_into(&dialog, "typed").unwrap();
    c.fire_due(t0 + interval * 2).unwrap();
    assert_eq!(
        last_sent(&c),
        json!({"module": "app.messages", "task": "save_wip", "message_id": 7, "content": "typed"})
    );
}

#[test]
fn test_hide_dialog_flushes_draft() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "edit_message", "content": "", "message_id": 3}), t0);
    let dialog = c.config().layout.dialog.clone();
    c.doc_mut().type_into(&dialog, "unsaved").unwrap();
    push(&mut c, json!({"task": "hide_dialog"}), t0);

    assert_eq!(last_sent(&c)["content"], "unsaved");
    assert!(c.doc().classes(&dialog).contains(&"hide".to_owned()));
    assert!(c.drafts().active().is_none());
}

#[test]
fn test_inline_reply_round_trip() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[5, 6])}), t0);
    push(
        &mut c,
        json!({"task": "inline_reply_box", "content": "", "message_id": 30, "parent_mid": 5}),
        t0,
    );
    assert_eq!(c.doc().ids_in("messages"), vec!["message_5", "message_30", "message_6"]);
    assert_eq!(c.stream().parent_of(MessageId(30)), Some(MessageId(5)));
    assert_eq!(c.doc().focused(), Some("message_30"));

    c.doc_mut().type_into("message_30", "thanks").unwrap();
    assert!(c.send_reply(false).unwrap());
    let sent = c.transport().socket().sent_json();
    assert_eq!(sent[0]["task"], "save_wip");
    assert_eq!(sent[0]["content"], "thanks");
    assert_eq!(
        sent[1],
        json!({"module": "app.messages", "task": "send_reply", "message_id": 30,
               "parent_mid": 5, "to_sender_only": "0"})
    );

    push(
        &mut c,
        json!({"task": "post_completed_reply", "content": "<p>thanks</p>", "message_id": 30}),
        t0,
    );
    assert_eq!(c.doc().inner_html("message_30"), Some("<p>thanks</p>"));
    assert_eq!(c.stream().parent_of(MessageId(30)), Some(MessageId(5)));
}

#[test]
fn test_reply_box_named_by_replied_message() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[5, 6])}), t0);
    push(
        &mut c,
        json!({"task": "inline_reply_box", "content": "<div>box</div>", "message_id": 5}),
        t0,
    );
    assert_eq!(c.doc().inner_html("message_5"), Some("<p>5</p>"));
    assert_eq!(c.doc().ids_in("messages"), vec!["message_5", "message_0", "message_6"]);
    assert_eq!(c.doc().focused(), Some("message_0"));
    assert_eq!(c.drafts().active().map(|d| d.message_id), Some(MessageId::NEW));

    c.doc_mut().type_into("message_0", "me too").unwrap();
    assert!(c.send_reply(true).unwrap());
    assert_eq!(
        last_sent(&c),
        json!({"module": "app.messages", "task": "send_reply", "message_id": 0,
               "parent_mid": 5, "to_sender_only": "1"})
    );

    push(
        &mut c,
        json!({"task": "post_completed_reply", "content": "<p>me too</p>", "message_id": 31}),
        t0,
    );
    assert!(!c.doc().contains("message_0"));
    assert_eq!(c.doc().ids_in("messages"), vec!["message_5", "message_31", "message_6"]);
    assert_eq!(c.stream().parent_of(MessageId(31)), Some(MessageId(5)));
}

#[test]
fn test_remove_reply_container_by_replied_message() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[5])}), t0);
    push(
        &mut c,
        json!({"task": "inline_reply_box", "content": "", "message_id": 5}),
        t0,
    );
    c.doc_mut().type_into("message_0", "never sent").unwrap();
    push(&mut c, json!({"task": "remove_reply_container", "message_id": 5}), t0);

    assert!(!c.doc().contains("message_0"));
    assert!(c.doc().contains("message_5"));
    assert!(c.drafts().active().is_none());
    assert!(!tasks(&c).contains(&"save_wip".to_owned()));
}

#[test]
fn test_remove_discards_draft_without_flush() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[5])}), t0);
    push(
        &mut c,
        json!({"task": "inline_reply_box", "content": "", "message_id": 30, "parent_mid": 5}),
        t0,
    );
    c.doc_mut().type_into("message_30", "never sent").unwrap();
    push(&mut c, json!({"task": "remove_reply_container", "message_id": 30}), t0);

    assert!(!c.doc().contains("message_30"));
    assert!(c.drafts().active().is_none());
    assert!(!tasks(&c).contains(&"save_wip".to_owned()));
}

// ---------------------------------------------------------------------------
// Stash
// ---------------------------------------------------------------------------

#[test]
fn test_stash_keeps_replies() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "messages", "messages": [
            {"message_id": 42, "content": "<p>root</p>"},
            {"message_id": 43, "parent_id": 42, "content": "<p>reply</p>"}
        ]}),
        t0,
    );
    assert_eq!(c.doc().parent_of("message_43").as_deref(), Some("message_42"));

    c.stash(MessageId(42), t0).unwrap();
    assert_eq!(last_sent(&c)["task"], "stash");
    assert!(c.doc().classes("message_42").contains(&"stashed".to_owned()));
    assert_eq!(c.doc().parent_of("message_43").as_deref(), Some("messages"));

    c.fire_due(t0 + c.config().stash_removal_delay()).unwrap();
    assert!(!c.doc().contains("message_42"));
    assert!(c.doc().contains("message_43"));
    assert_eq!(c.stream().parent_of(MessageId(43)), Some(MessageId(42)));
}

#[test]
fn test_pin_and_unpin_toggle_class() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[8])}), t0);
    c.pin(MessageId(8)).unwrap();
    assert!(c.doc().classes("message_8").contains(&"pinned".to_owned()));
    c.unpin(MessageId(8)).unwrap();
    assert!(c.doc().classes("message_8").is_empty());
    assert_eq!(tasks(&c), vec!["pin", "unpin"]);
    assert!(c.pin(MessageId(99)).is_err());
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[test]
fn test_upload_frame_is_in_call_order() {
    let mut c = client();
    let files = vec![
        protocol::FileMeta { name: "A".into(), size: 3 },
        protocol::FileMeta { name: "B".into(), size: 2 },
    ];
    let batch = c.upload(12, files).unwrap();
    c.file_read(batch, 1, Ok(b"bb".to_vec())).unwrap();
    assert!(c.transport().socket().sent().is_empty());
    c.file_read(batch, 0, Ok(b"aaa".to_vec())).unwrap();

    let bytes = match &c.transport().socket().sent()[0] {
        SentFrame::Binary { bytes, .. } => bytes.clone(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(bytes[0], 0x21);
    let frame = UploadFrame::parse(&bytes).unwrap();
    assert_eq!(frame.header.partition_id, 12);
    assert_eq!(frame.payload, b"aaabb");
}

#[test]
fn test_upload_read_failure_shows_banner() {
    let mut c = client();
    let files = vec![protocol::FileMeta { name: "A".into(), size: 3 }];
    let batch = c.upload(1, files).unwrap();
    c.file_read(batch, 0, Err("disk on fire".into())).unwrap();

    assert!(c.transport().socket().sent().is_empty());
    let banner = c.config().layout.banner.clone();
    assert!(c.doc().inner_html(&banner).unwrap_or_default().contains("disk on fire"));
    assert_eq!(c.uploads().pending(), 0);
}

#[test]
fn test_files_uploaded_fills_attachment_strip() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[4])}), t0);
    push(
        &mut c,
        json!({"task": "files_uploaded", "content": "<img/>", "message_id": 4}),
        t0,
    );
    assert_eq!(c.doc().parent_of("attachments_4").as_deref(), Some("message_4"));
    push(
        &mut c,
        json!({"task": "files_uploaded", "content": "<img/><img/>", "message_id": 4}),
        t0,
    );
    assert_eq!(c.doc().inner_html("attachments_4"), Some("<img/><img/>"));
}

// ---------------------------------------------------------------------------
// Robustness
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_and_malformed_frames_are_ignored() {
    let mut c = client();
    let t0 = Instant::now();
    c.handle_text(r#"{"task": "confetti"}"#, t0).unwrap();
    c.handle_text("{{{", t0).unwrap();
    c.handle_text(r#"{"task": "remove_message"}"#, t0).unwrap();
    c.handle_text(r#"{"task": "more_old_messages", "messages": []}"#, t0)
        .unwrap();
    assert!(c.transport().socket().sent().is_empty());
}

#[test]
fn test_reload_keeps_first_reason() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "reload"}), t0);
    c.transport_mut().request_reload("connection closed");
    assert!(c.reload_requested());
    assert_eq!(c.transport().reload_reason(), Some("server requested reload"));
}

#[test]
fn test_content_replace_detaches_feed() {
    let mut c = client();
    let t0 = Instant::now();
    push(&mut c, json!({"task": "messages", "messages": page(&[1])}), t0);
    c.stash(MessageId(1), t0).unwrap();
    push(&mut c, json!({"task": "content", "content": "<h1>settings</h1>"}), t0);

    assert!(!c.doc().contains("messages"));
    assert!(!c.stream().is_present(MessageId(1)));
    assert_eq!(c.next_deadline(), None);
    c.fire_due(t0 + Duration::from_secs(10)).unwrap();
}

#[test]
fn test_sub_content_over_feed_detaches_it() {
    let mut c = client();
    let t0 = Instant::now();
    push(
        &mut c,
        json!({"task": "messages", "messages": page(&[1, 2]), "more_older": 1}),
        t0,
    );
    c.scroll_to(0.0).unwrap();
    assert_eq!(c.stream().older_state(), BoundaryState::FetchInFlight);
    c.stash(MessageId(1), t0).unwrap();
    push(
        &mut c,
        json!({"task": "sub_content", "container": "content_container", "content": "<p>gone</p>"}),
        t0,
    );

    assert!(!c.doc().contains("messages"));
    assert!(!c.stream().is_present(MessageId(2)));
    assert_eq!(c.next_deadline(), None);
    assert_eq!(c.stream().older_state(), BoundaryState::Idle);
}
