use serde_json::Value;

use crate::fixtures::seed::SeededProject;
use crate::fixtures::test_app::TestApp;

async fn outcome(resp: reqwest::Response) -> String {
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    json["outcome"].as_str().unwrap().to_string()
}

async fn schedule_subtask(app: &TestApp, slug: &str) -> (SeededProject, String, String) {
    let seeded = app.seed_project(slug).await;
    let subtask_id = app
        .create_subtask(
            &seeded.project_id,
            &seeded.leader.access_token,
            &seeded.member.id,
            10,
        )
        .await;
    let (status, json) = app
        .schedule_subtask_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &subtask_id,
            3,
        )
        .await;
    assert_eq!(status, 201, "Seeding schedule failed: {json}");
    let nid = json["id"].as_str().unwrap().to_string();
    (seeded, nid, subtask_id)
}

#[tokio::test]
async fn delivery_sends_email_and_marks_sent() {
    let app = TestApp::spawn().await;
    let (seeded, nid, subtask_id) = schedule_subtask(&app, "wh_happy").await;

    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "sent");

    let sent = app.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec![seeded.member.email.clone()]);
    assert!(sent[0].subject.contains("due soon"));

    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "sent");
    assert!(doc.get_str("email_id").unwrap().starts_with("mock-email-"));
    assert!(doc.get_datetime("sent_at").is_ok());
}

#[tokio::test]
async fn redelivery_is_a_noop() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_redeliver").await;

    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "sent");

    // At-least-once delivery: the second call must not send again
    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "noop");
    assert_eq!(app.email.sent().len(), 1);
}

#[tokio::test]
async fn unknown_notification_id_is_a_noop() {
    let app = TestApp::spawn().await;
    let _seeded = app.seed_project("wh_unknown").await;

    let phantom = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .post_webhook(&phantom, "subtask", &bson::oid::ObjectId::new().to_hex())
        .await;
    assert_eq!(outcome(resp).await, "noop");
}

#[tokio::test]
async fn malformed_notification_id_is_a_noop() {
    let app = TestApp::spawn().await;
    let resp = app.post_webhook("not-an-object-id", "subtask", "x").await;
    assert_eq!(outcome(resp).await, "noop");
}

#[tokio::test]
async fn bad_signature_is_rejected_before_any_work() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_badsig").await;

    let body = serde_json::json!({
        "notificationId": nid,
        "type": "subtask",
        "entityId": subtask_id,
    })
    .to_string();

    let resp = app.post_webhook_raw(&body, Some("wrong-secret")).await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = app.post_webhook_raw(&body, None).await;
    assert_eq!(resp.status().as_u16(), 401);

    // Nothing was touched
    assert!(app.email.sent().is_empty());
    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "pending");
}

#[tokio::test]
async fn webhook_only_answers_post() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .get(app.url("/api/webhook/dispatch"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 405);
}

#[tokio::test]
async fn completed_subtask_is_skipped_without_email() {
    let app = TestApp::spawn().await;
    let (seeded, nid, subtask_id) = schedule_subtask(&app, "wh_completed").await;

    let resp = app
        .auth_put(
            &format!("/api/project/{}/subtask/{subtask_id}", seeded.project_id),
            &seeded.leader.access_token,
        )
        .json(&serde_json::json!({ "status": "completed" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "skipped");

    assert!(app.email.sent().is_empty());
    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "skipped");
    // The row left pending, so a redelivery stays quiet
    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "noop");
}

#[tokio::test]
async fn deleted_subtask_fails_the_notification() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_gone").await;

    // Soft-delete behind the API's back
    let sid = bson::oid::ObjectId::parse_str(&subtask_id).unwrap();
    app.db
        .collection::<bson::Document>("subtasks")
        .update_one(
            bson::doc! { "_id": sid },
            bson::doc! { "$set": { "deleted_at": bson::DateTime::now() } },
        )
        .await
        .unwrap();

    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "failed");

    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "failed");
    assert!(doc.get_str("error").unwrap().contains("no longer exists"));
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn subtask_that_lost_its_deadline_fails_without_email() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_nodeadline").await;

    // The deadline that held at scheduling time is gone by the time the
    // job fires
    let sid = bson::oid::ObjectId::parse_str(&subtask_id).unwrap();
    app.db
        .collection::<bson::Document>("subtasks")
        .update_one(
            bson::doc! { "_id": sid },
            bson::doc! { "$set": { "deadline": bson::Bson::Null } },
        )
        .await
        .unwrap();

    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "failed");

    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "failed");
    assert!(doc
        .get_str("error")
        .unwrap()
        .contains("deadline or assignee"));
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn provider_refusal_marks_failed_without_retry() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_provider").await;

    app.email.fail_next_sends(1);
    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "failed");

    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "failed");
    assert!(doc.get_str("error").unwrap().contains("injected send failure"));

    // Failure is terminal; a redelivery does not retry the send
    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "noop");
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn event_with_no_resolvable_recipients_is_skipped() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("wh_norecip").await;
    let event_id = app
        .create_event(&seeded.project_id, &seeded.leader.access_token, 7)
        .await;
    let (status, json) = app
        .schedule_event_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &event_id,
            1,
            &[&seeded.member.id],
        )
        .await;
    assert_eq!(status, 201, "Seeding schedule failed: {json}");
    let nid = json["id"].as_str().unwrap().to_string();

    // The only recipient disappears before the job fires
    let uid = bson::oid::ObjectId::parse_str(&seeded.member.id).unwrap();
    app.db
        .collection::<bson::Document>("users")
        .update_one(
            bson::doc! { "_id": uid },
            bson::doc! { "$set": { "deleted_at": bson::DateTime::now() } },
        )
        .await
        .unwrap();

    let resp = app.post_webhook(&nid, "event", &event_id).await;
    assert_eq!(outcome(resp).await, "skipped");

    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "skipped");
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn event_delivery_fans_out_to_all_recipients() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("wh_fanout").await;
    let event_id = app
        .create_event(&seeded.project_id, &seeded.leader.access_token, 7)
        .await;
    let (status, json) = app
        .schedule_event_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &event_id,
            1,
            &[&seeded.leader.id, &seeded.member.id],
        )
        .await;
    assert_eq!(status, 201, "Seeding schedule failed: {json}");
    let nid = json["id"].as_str().unwrap().to_string();

    let resp = app.post_webhook(&nid, "event", &event_id).await;
    assert_eq!(outcome(resp).await, "sent");

    let sent = app.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.len(), 2);
    assert!(sent[0].to.contains(&seeded.leader.email));
    assert!(sent[0].to.contains(&seeded.member.email));
    assert!(sent[0].subject.contains("Sprint planning"));
}

#[tokio::test]
async fn webhook_after_cancel_is_a_noop() {
    let app = TestApp::spawn().await;
    let (seeded, nid, subtask_id) = schedule_subtask(&app, "wh_cancelled").await;

    let resp = app
        .auth_delete(
            &format!("/api/project/{}/notification/{nid}", seeded.project_id),
            &seeded.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // The external job fires anyway (cancel is best effort)
    let resp = app.post_webhook(&nid, "subtask", &subtask_id).await;
    assert_eq!(outcome(resp).await, "noop");

    assert!(app.email.sent().is_empty());
    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "cancelled");
}

#[tokio::test]
async fn concurrent_deliveries_settle_exactly_once() {
    let app = TestApp::spawn().await;
    let (_seeded, nid, subtask_id) = schedule_subtask(&app, "wh_race").await;

    let (a, b) = tokio::join!(
        app.post_webhook(&nid, "subtask", &subtask_id),
        app.post_webhook(&nid, "subtask", &subtask_id),
    );
    let mut outcomes = vec![outcome(a).await, outcome(b).await];
    outcomes.sort();

    // One delivery wins the conditional transition; the other reports noop
    assert_eq!(outcomes, vec!["noop".to_string(), "sent".to_string()]);
    let doc = app.notification_doc(&nid).await.unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "sent");
}
