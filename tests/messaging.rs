mod common;

use common::TestApp;
use serde_json::json;

/// Full direct-message lifecycle: send, receive, read, delete by both
/// parties.
#[tokio::test]
async fn test_direct_message_lifecycle() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "hello").await;

    // Bob sees one unread entry.
    let response = app.get(&bob, "/messages/received").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["textContent"], "hello");
    assert_eq!(messages[0]["isRead"], false);
    assert_eq!(messages[0]["sender"]["username"], "alice");

    // Read mark sets readAt.
    let response = app.put(&bob, &format!("/messages/{message_id}/read")).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    assert_eq!(body["messages"][0]["isRead"], true);
    assert!(body["messages"][0]["readAt"].is_string());

    // Alice deletes her view: record survives for Bob.
    let response = app.delete(&alice, &format!("/messages/{message_id}")).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["physicallyDeleted"], false);

    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    // Bob deletes too: record is gone for everyone.
    let response = app.delete(&bob, &format!("/messages/{message_id}")).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["physicallyDeleted"], true);

    let response = app.put(&bob, &format!("/messages/{message_id}/read")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_send_requires_follow_relation() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let mallory = app.register_user("mallory");

    let response = app
        .post_json(
            &alice,
            "/messages/send-text",
            &json!({ "receivers": [mallory.user_id], "content": "hi" }),
        )
        .await;
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    // No record was created.
    let body: serde_json::Value = app.get(&mallory, "/messages/received").await.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_send_validation_errors() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    // Missing content.
    let response =
        app.post_json(&alice, "/messages/send-text", &json!({ "receivers": [bob.user_id] })).await;
    assert_eq!(response.status(), 400);

    // Blank content.
    let response = app
        .post_json(&alice, "/messages/send-text", &json!({ "receivers": [bob.user_id], "content": "   " }))
        .await;
    assert_eq!(response.status(), 400);

    // Empty receiver list.
    let response =
        app.post_json(&alice, "/messages/send-text", &json!({ "receivers": [], "content": "hi" })).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "ping").await;

    assert_eq!(app.put(&bob, &format!("/messages/{message_id}/read")).await.status(), 200);
    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    let first_read_at = body["messages"][0]["readAt"].as_str().unwrap().to_string();

    // Second call succeeds and readAt does not move.
    assert_eq!(app.put(&bob, &format!("/messages/{message_id}/read")).await.status(), 200);
    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    assert_eq!(body["messages"][0]["readAt"].as_str().unwrap(), first_read_at);
}

#[tokio::test]
async fn test_mark_read_rejects_non_recipient() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    let carol = app.register_user("carol");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "secret").await;

    // Carol is not addressed; the sender holds no read entry either.
    assert_eq!(app.put(&carol, &format!("/messages/{message_id}/read")).await.status(), 403);
    assert_eq!(app.put(&alice, &format!("/messages/{message_id}/read")).await.status(), 403);
}

#[tokio::test]
async fn test_unread_filter() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let first = app.send_text(&alice, &bob, "one").await;
    app.send_text(&alice, &bob, "two").await;
    app.send_text(&alice, &bob, "three").await;

    assert_eq!(app.put(&bob, &format!("/messages/{first}/read")).await.status(), 200);

    let body: serde_json::Value =
        app.get(&bob, "/messages/received?unreadOnly=true").await.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    // Newest first.
    assert_eq!(messages[0]["textContent"], "three");
    assert_eq!(messages[1]["textContent"], "two");
}

#[tokio::test]
async fn test_reaction_uniqueness() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "react to me").await;

    let response = app
        .post_json(&bob, &format!("/messages/{message_id}/reactions"), &json!({ "emoji": "👍" }))
        .await;
    assert_eq!(response.status(), 201);

    // Same (user, emoji) pair again is rejected, not upserted.
    let response = app
        .post_json(&bob, &format!("/messages/{message_id}/reactions"), &json!({ "emoji": "👍" }))
        .await;
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    let reactions = body["messages"][0]["reactions"].as_array().unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0]["emoji"], "👍");
    assert_eq!(reactions[0]["username"], "bob");

    // A different emoji from the same user is fine.
    let response = app
        .post_json(&bob, &format!("/messages/{message_id}/reactions"), &json!({ "emoji": "🔥" }))
        .await;
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_reaction_removal_is_noop_when_absent() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "hi").await;

    assert_eq!(
        app.post_json(&bob, &format!("/messages/{message_id}/reactions"), &json!({ "emoji": "👍" }))
            .await
            .status(),
        201
    );
    assert_eq!(app.delete(&bob, &format!("/messages/{message_id}/reactions/👍")).await.status(), 200);
    // Absent now, still 200.
    assert_eq!(app.delete(&bob, &format!("/messages/{message_id}/reactions/👍")).await.status(), 200);

    let body: serde_json::Value = app.get(&bob, "/messages/received").await.json().await.unwrap();
    assert_eq!(body["messages"][0]["reactions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_send_dispatches_push_notification() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    app.send_text(&alice, &bob, "knock knock").await;

    // Dispatch is fire-and-forget; give the task a beat.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let sent = app.sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (tokens, title, body) = &sent[0];
    assert_eq!(tokens, &vec!["fcm-token-bob".to_string()]);
    assert_eq!(title, "alice");
    assert_eq!(body, "knock knock");
}

#[tokio::test]
async fn test_requests_require_auth() {
    let app = TestApp::spawn().await;
    let response = app.client.get(app.url("/messages/received")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response =
        app.client.get(app.url("/messages/received")).bearer_auth("not-a-token").send().await.unwrap();
    assert_eq!(response.status(), 401);
}
