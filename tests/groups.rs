mod common;

use common::{TestApp, TestUser};
use serde_json::json;

async fn create_group(app: &TestApp, admin: &TestUser, name: &str, members: &[&TestUser]) -> String {
    let member_ids: Vec<_> = members.iter().map(|m| m.user_id).collect();
    let response = app
        .post_json(admin, "/groups", &json!({ "name": name, "memberIds": member_ids }))
        .await;
    assert_eq!(response.status(), 201, "group creation failed");
    let body: serde_json::Value = response.json().await.expect("json body");
    body["group"]["_id"].as_str().expect("group id").to_string()
}

#[tokio::test]
async fn test_group_creation_seats_admin() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");

    let group_id = create_group(&app, &admin, "book club", &[&member]).await;

    let body: serde_json::Value = app.get(&admin, &format!("/groups/{group_id}")).await.json().await.unwrap();
    assert_eq!(body["group"]["admin"]["username"], "admin");
    assert_eq!(body["group"]["membersCount"], 2);
}

#[tokio::test]
async fn test_group_membership_gates() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");
    let outsider = app.register_user("outsider");

    let group_id = create_group(&app, &admin, "insiders", &[&member]).await;

    // Non-members cannot read or send.
    assert_eq!(app.get(&outsider, &format!("/groups/{group_id}")).await.status(), 403);
    assert_eq!(app.get(&outsider, &format!("/groups/{group_id}/messages")).await.status(), 403);
    let response = app
        .post_json(&outsider, &format!("/groups/{group_id}/messages/text"), &json!({ "textContent": "hi" }))
        .await;
    assert_eq!(response.status(), 403);

    // Only the admin mutates the group.
    let response = app
        .put_json(&member, &format!("/groups/{group_id}"), &json!({ "name": "coup" }))
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(app.delete(&member, &format!("/groups/{group_id}")).await.status(), 403);
    let response = app
        .post_json(&member, &format!("/groups/{group_id}/members"), &json!({ "userId": outsider.user_id }))
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_admin_cannot_leave_without_transfer() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");

    let group_id = create_group(&app, &admin, "stuck", &[&member]).await;

    let response = app.delete(&admin, &format!("/groups/{group_id}/members/{}", admin.user_id)).await;
    assert_eq!(response.status(), 400);

    // A regular member may leave.
    let response = app.delete(&member, &format!("/groups/{group_id}/members/{}", member.user_id)).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = app.get(&admin, &format!("/groups/{group_id}")).await.json().await.unwrap();
    assert_eq!(body["group"]["membersCount"], 1);
}

#[tokio::test]
async fn test_member_management() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");

    let group_id = create_group(&app, &admin, "growing", &[]).await;

    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/members"), &json!({ "userId": member.user_id }))
        .await;
    assert_eq!(response.status(), 200);

    // Duplicate membership is rejected.
    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/members"), &json!({ "userId": member.user_id }))
        .await;
    assert_eq!(response.status(), 400);

    // Unknown users do not resolve.
    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/members"), &json!({ "userId": uuid::Uuid::new_v4() }))
        .await;
    assert_eq!(response.status(), 404);

    // The admin may remove other members.
    let response = app.delete(&admin, &format!("/groups/{group_id}/members/{}", member.user_id)).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_group_message_fan_out() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member1 = app.register_user("member1");
    let member2 = app.register_user("member2");

    let group_id = create_group(&app, &admin, "the crew", &[&member1, &member2]).await;

    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/messages/text"), &json!({ "textContent": "meeting at 5" }))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let message_id = body["messageId"].as_str().unwrap().to_string();

    // Everyone but the sender starts unread.
    let body: serde_json::Value =
        app.get(&member1, &format!("/groups/{group_id}/messages")).await.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["isRead"], false);
    assert_eq!(messages[0]["isMine"], false);
    assert_eq!(messages[0]["sender"]["username"], "admin");

    // The sender's own view is "mine".
    let body: serde_json::Value =
        app.get(&admin, &format!("/groups/{group_id}/messages")).await.json().await.unwrap();
    assert_eq!(body["messages"][0]["isMine"], true);

    // Group read mark.
    let response = app.put(&member1, &format!("/groups/{group_id}/messages/{message_id}/read")).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value =
        app.get(&member1, &format!("/groups/{group_id}/messages")).await.json().await.unwrap();
    assert_eq!(body["messages"][0]["isRead"], true);

    // The sender holds no read entry.
    let response = app.put(&admin, &format!("/groups/{group_id}/messages/{message_id}/read")).await;
    assert_eq!(response.status(), 403);

    // Push went to the other members, titled with the group name.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let sent = app.sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (tokens, title, push_body) = &sent[0];
    assert_eq!(tokens.len(), 2);
    assert_eq!(title, "the crew");
    assert_eq!(push_body, "admin: meeting at 5");
}

#[tokio::test]
async fn test_group_messages_pagination_and_order() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let group_id = create_group(&app, &admin, "solo", &[]).await;

    for i in 1..=5 {
        let response = app
            .post_json(&admin, &format!("/groups/{group_id}/messages/text"), &json!({ "textContent": format!("msg {i}") }))
            .await;
        assert_eq!(response.status(), 201);
    }

    // Page 1 covers the newest slice, reversed into chat order.
    let body: serde_json::Value =
        app.get(&admin, &format!("/groups/{group_id}/messages?page=1&limit=2")).await.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["textContent"], "msg 4");
    assert_eq!(messages[1]["textContent"], "msg 5");
    assert_eq!(body["pagination"]["total"], 5);
    assert_eq!(body["pagination"]["totalPages"], 3);
    assert_eq!(body["pagination"]["hasNext"], true);

    // The limit clamps at 100.
    let body: serde_json::Value = app
        .get(&admin, &format!("/groups/{group_id}/messages?page=1&limit=5000"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["pagination"]["limit"], 100);
}

#[tokio::test]
async fn test_my_groups_overview() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");

    let group_id = create_group(&app, &admin, "overview", &[&member]).await;

    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/messages/text"), &json!({ "textContent": "latest word" }))
        .await;
    assert_eq!(response.status(), 201);

    let body: serde_json::Value = app.get(&member, "/groups").await.json().await.unwrap();
    let groups = body["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "overview");
    assert_eq!(groups[0]["unreadCount"], 1);
    assert_eq!(groups[0]["lastMessage"]["textContent"], "latest word");
    assert_eq!(groups[0]["lastMessage"]["senderUsername"], "admin");

    // The sender has nothing unread.
    let body: serde_json::Value = app.get(&admin, "/groups").await.json().await.unwrap();
    assert_eq!(body["groups"][0]["unreadCount"], 0);
}

#[tokio::test]
async fn test_group_deletion_removes_messages() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");
    let member = app.register_user("member");

    let group_id = create_group(&app, &admin, "doomed", &[&member]).await;
    let response = app
        .post_json(&admin, &format!("/groups/{group_id}/messages/text"), &json!({ "textContent": "last words" }))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let message_id = body["messageId"].as_str().unwrap().to_string();

    assert_eq!(app.delete(&admin, &format!("/groups/{group_id}")).await.status(), 200);

    assert_eq!(app.get(&member, &format!("/groups/{group_id}")).await.status(), 404);
    // The fan-out rows are gone with the group.
    let response = app.put(&member, &format!("/groups/{group_id}/messages/{message_id}/read")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_group_creation_requires_name() {
    let app = TestApp::spawn().await;
    let admin = app.register_user("admin");

    let response = app.post_json(&admin, "/groups", &json!({ "name": "   " })).await;
    assert_eq!(response.status(), 400);
}
