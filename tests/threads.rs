mod common;

use common::TestApp;

/// Unread counts per thread track read marks.
#[tokio::test]
async fn test_thread_unread_counts() {
    let app = TestApp::spawn().await;
    let viewer = app.register_user("viewer");
    let partner = app.register_user("partner");
    app.follow(&partner, &viewer);

    let first = app.send_text(&partner, &viewer, "one").await;
    app.send_text(&partner, &viewer, "two").await;
    app.send_text(&partner, &viewer, "three").await;

    let body: serde_json::Value = app.get(&viewer, "/messages/threads").await.json().await.unwrap();
    let threads = body["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["partner"]["username"], "partner");
    assert_eq!(threads[0]["unreadCount"], 3);
    assert_eq!(threads[0]["totalCount"], 3);
    assert_eq!(threads[0]["lastMessage"]["preview"], "three");

    assert_eq!(app.put(&viewer, &format!("/messages/{first}/read")).await.status(), 200);

    let body: serde_json::Value = app.get(&viewer, "/messages/threads").await.json().await.unwrap();
    assert_eq!(body["threads"][0]["unreadCount"], 2);
}

/// Threads are sorted by last-message time, newest first.
#[tokio::test]
async fn test_threads_ordering() {
    let app = TestApp::spawn().await;
    let viewer = app.register_user("viewer");
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &viewer);
    app.follow(&viewer, &bob);

    app.send_text(&alice, &viewer, "old news").await;
    app.send_text(&viewer, &bob, "fresh").await;

    let body: serde_json::Value = app.get(&viewer, "/messages/threads").await.json().await.unwrap();
    let threads = body["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0]["partner"]["username"], "bob");
    assert_eq!(threads[0]["lastMessage"]["isMine"], true);
    assert_eq!(threads[1]["partner"]["username"], "alice");
}

/// A conversation is returned ascending with per-perspective read state.
#[tokio::test]
async fn test_thread_detail_perspectives() {
    let app = TestApp::spawn().await;
    let viewer = app.register_user("viewer");
    let partner = app.register_user("partner");
    app.follow(&viewer, &partner);
    app.follow(&partner, &viewer);

    let mine = app.send_text(&viewer, &partner, "sent by me").await;
    let theirs = app.send_text(&partner, &viewer, "sent to me").await;

    // The partner reads my message; I leave theirs unread.
    assert_eq!(app.put(&partner, &format!("/messages/{mine}/read")).await.status(), 200);

    let body: serde_json::Value =
        app.get(&viewer, &format!("/messages/thread/{}", partner.user_id)).await.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);

    // Ascending order.
    assert_eq!(messages[0]["_id"].as_str().unwrap(), mine.to_string());
    assert_eq!(messages[1]["_id"].as_str().unwrap(), theirs.to_string());

    // My sent message reports the partner's read state.
    assert_eq!(messages[0]["isMine"], true);
    assert_eq!(messages[0]["isRead"], true);
    // The received one reports my own (unread) state.
    assert_eq!(messages[1]["isMine"], false);
    assert_eq!(messages[1]["isRead"], false);
}

/// An unknown partner yields an empty list, not an error.
#[tokio::test]
async fn test_thread_detail_unknown_partner_is_empty() {
    let app = TestApp::spawn().await;
    let viewer = app.register_user("viewer");

    let response = app.get(&viewer, &format!("/messages/thread/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
}

/// Multi-receiver sends collapse into the first non-viewer recipient's
/// thread.
#[tokio::test]
async fn test_multi_receiver_thread_partner_resolution() {
    let app = TestApp::spawn().await;
    let viewer = app.register_user("viewer");
    let first = app.register_user("first");
    let second = app.register_user("second");
    app.follow(&viewer, &first);
    app.follow(&viewer, &second);

    let response = app
        .post_json(
            &viewer,
            "/messages/send-text",
            &serde_json::json!({ "receivers": [first.user_id, second.user_id], "content": "broadcast" }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let body: serde_json::Value = app.get(&viewer, "/messages/threads").await.json().await.unwrap();
    let threads = body["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["partner"]["username"], "first");
}

/// A deleted view disappears from the deleter's thread but not the other
/// party's.
#[tokio::test]
async fn test_threads_respect_per_party_deletion() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice");
    let bob = app.register_user("bob");
    app.follow(&alice, &bob);

    let message_id = app.send_text(&alice, &bob, "now you see me").await;
    assert_eq!(app.delete(&alice, &format!("/messages/{message_id}")).await.status(), 200);

    let body: serde_json::Value = app.get(&alice, "/messages/threads").await.json().await.unwrap();
    assert_eq!(body["threads"].as_array().unwrap().len(), 0);

    let body: serde_json::Value = app.get(&bob, "/messages/threads").await.json().await.unwrap();
    assert_eq!(body["threads"].as_array().unwrap().len(), 1);
}
