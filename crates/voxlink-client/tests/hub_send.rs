#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use serde_json::{json, Map, Value};

use voxlink_client::hub::{ContextUpdate, SendFlags};

use common::*;

#[tokio::test]
async fn pause_carries_exactly_session_and_flag() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut server = connect_ready(&client, &mut servers).await;

    let id = client.pause(true, Some("S1")).await.unwrap();

    let rec = server.next_record().await;
    assert_eq!(rec["type"], 1);
    assert_eq!(rec["target"], "SendMessage");
    assert_eq!(rec["invocationId"], id.as_str());
    assert_eq!(rec["arguments"].as_array().unwrap().len(), 1);
    assert_eq!(
        rec["arguments"][0],
        json!({"$type": "pause", "sessionId": "S1", "pause": true})
    );
}

#[tokio::test]
async fn invalid_messages_write_nothing() {
    let (client, connector, mut servers) = mock_client(test_config());
    let _server = connect_ready(&client, &mut servers).await;
    let written = connector.writes();

    let err = client.send_message("hello", None).await.unwrap_err();
    assert_eq!(err.code().as_str(), "MISSING_FIELD");
    assert!(err.to_string().contains("sessionId"), "{err}");

    let err = client.update_message("", "edited", Some("S1")).await.unwrap_err();
    assert_eq!(err.code().as_str(), "MISSING_FIELD");
    assert!(err.to_string().contains("messageId"), "{err}");

    let err = client.start_chat("", Vec::new()).await.unwrap_err();
    assert_eq!(err.code().as_str(), "MISSING_FIELD");

    assert_eq!(connector.writes(), written);
}

#[tokio::test]
async fn latest_pinned_session_is_used() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut events = record_events(&client, &["chatStarted", "chatsSessionsUpdated"]);
    let mut server = connect_ready(&client, &mut servers).await;

    server.push_event(json!({"$type": "chatStarted", "sessionId": "S1", "chatId": "C1"}));
    next_named(&mut events, "chatStarted").await;
    assert_eq!(client.session_id().as_deref(), Some("S1"));

    client.send_message("hello", None).await.unwrap();
    let rec = server.next_record().await;
    let body = &rec["arguments"][0];
    assert_eq!(body["$type"], "send");
    assert_eq!(body["sessionId"], "S1");
    assert_eq!(body["text"], "hello");
    assert_eq!(body["doReply"], true);

    server.push_event(json!({
        "$type": "chatsSessionsUpdated",
        "sessions": [{"sessionId": "S2", "chatId": "C2"}],
    }));
    next_named(&mut events, "chatsSessionsUpdated").await;

    client.interrupt(None).await.unwrap();
    let rec = server.next_record().await;
    assert_eq!(
        rec["arguments"][0],
        json!({"$type": "interrupt", "sessionId": "S2"})
    );

    // An explicit id wins over the pinned one.
    client.interrupt(Some("S9")).await.unwrap();
    assert_eq!(server.next_record().await["arguments"][0]["sessionId"], "S9");
}

#[tokio::test]
async fn client_send_mirrors_every_invocation() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut sends = record_events(&client, &["client_send"]);
    let mut server = connect_ready(&client, &mut servers).await;

    let auth = next_event(&mut sends).await;
    assert_eq!(auth.payload["$type"], "authenticate");
    assert!(auth.payload["invocationId"].is_string());

    let id = client.pause(false, Some("S1")).await.unwrap();
    let mirrored = next_event(&mut sends).await;
    assert_eq!(mirrored.payload["$type"], "pause");
    assert_eq!(mirrored.payload["invocationId"], id.as_str());

    // The mirror field never reaches the wire.
    let rec = server.next_record().await;
    assert!(rec["arguments"][0].get("invocationId").is_none());
}

#[tokio::test]
async fn unknown_target_surfaces_once() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut events = record_events(&client, &["unknown"]);
    let server = connect_ready(&client, &mut servers).await;

    server.push_record(json!({"type": 1, "target": "somethingNew", "arguments": [42]}));

    let ev = next_event(&mut events).await;
    assert_eq!(ev.payload["target"], "somethingNew");
    assert_eq!(ev.payload["arguments"], json!([42]));
    assert_quiet(&mut events, 100).await;
    assert!(client.state().is_open());
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut events = record_events(&client, &["replyChunk"]);
    let server = connect_ready(&client, &mut servers).await;

    let good = json!({
        "type": 1,
        "target": "ReceiveMessage",
        "arguments": [{"$type": "replyChunk", "text": "Hi", "messageId": "m1"}],
    });
    server.push_raw(&format!("{{not json\u{1e}[1,2]\u{1e}{good}\u{1e}"));

    let ev = next_event(&mut events).await;
    assert_eq!(ev.payload["text"], "Hi");
    assert!(client.state().is_open());
}

#[tokio::test]
async fn records_split_across_frames_are_reassembled() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut events = record_events(&client, &["replyChunk", "replyEnd"]);
    let server = connect_ready(&client, &mut servers).await;

    let chunk = json!({
        "type": 1,
        "target": "ReceiveMessage",
        "arguments": [{"$type": "replyChunk", "text": "split", "messageId": "m1"}],
    })
    .to_string();
    let end = json!({
        "type": 1,
        "target": "ReceiveMessage",
        "arguments": [{"$type": "replyEnd", "messageId": "m1"}],
    })
    .to_string();

    let (a, b) = chunk.split_at(chunk.len() / 2);
    server.push_raw(a);
    server.push_raw(&format!("{b}\u{1e}{end}\u{1e}"));

    assert_eq!(next_event(&mut events).await.payload["text"], "split");
    assert_eq!(next_event(&mut events).await.name, "replyEnd");
}

#[tokio::test]
async fn method_payloads_use_hub_field_names() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut server = connect_ready(&client, &mut servers).await;

    client
        .send_message_with(
            "quiet",
            SendFlags {
                do_reply: false,
                ..SendFlags::default()
            },
            Some("S1"),
        )
        .await
        .unwrap();
    let body = server.next_record().await["arguments"][0].clone();
    assert_eq!(body["doReply"], false);
    assert_eq!(body["doUserActionInference"], true);
    assert_eq!(body["doCharacterActionInference"], true);

    let mut update = ContextUpdate::new("game");
    update.contexts = Some(vec![json!({"text": "It is raining."})]);
    update.set_flags = Some(vec!["raining".into()]);
    client.update_context(update, Some("S1")).await.unwrap();
    let body = server.next_record().await["arguments"][0].clone();
    assert_eq!(body["$type"], "updateContext");
    assert_eq!(body["contextKey"], "game");
    assert_eq!(body["setFlags"], json!(["raining"]));
    assert!(body.get("actions").is_none());

    let mut args = Map::new();
    args.insert("target".into(), Value::String("door".into()));
    client
        .trigger_action("open", Some(args), None, Some("S1"))
        .await
        .unwrap();
    let body = server.next_record().await["arguments"][0].clone();
    assert_eq!(body["$type"], "triggerAction");
    assert_eq!(body["value"], "open");
    assert_eq!(body["arguments"]["target"], "door");
    assert!(!body["messageId"].as_str().unwrap().is_empty());

    client
        .speech_playback_start("m1", 0, 12, 900, Some("S1"))
        .await
        .unwrap();
    let body = server.next_record().await["arguments"][0].clone();
    assert_eq!(
        body,
        json!({
            "$type": "speechPlaybackStart",
            "sessionId": "S1",
            "messageId": "m1",
            "startIndex": 0,
            "endIndex": 12,
            "duration": 900,
        })
    );

    client.load_chats_list(Some("char-1"), None).await.unwrap();
    let body = server.next_record().await["arguments"][0].clone();
    assert_eq!(body, json!({"$type": "loadChatsList", "characterId": "char-1"}));
}

#[tokio::test]
async fn completion_errors_surface_as_error_events() {
    let (client, _connector, mut servers) = mock_client(test_config());
    let mut events = record_events(&client, &["error", "completion"]);
    let server = connect_ready(&client, &mut servers).await;

    server.push_record(json!({"type": 3, "invocationId": "7", "result": null}));
    let done = next_event(&mut events).await;
    assert_eq!(done.name, "completion");
    assert_eq!(done.payload["invocationId"], "7");

    server.push_record(json!({"type": 3, "invocationId": "8", "error": "boom"}));
    let failed = next_event(&mut events).await;
    assert_eq!(failed.name, "error");
    assert_eq!(failed.payload["invocationId"], "8");
    assert_eq!(failed.payload["error"], "boom");
}
