use serde_json::Value;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn listing_shows_full_history_newest_first() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_history").await;

    let subtask_id = app
        .create_subtask(
            &seeded.project_id,
            &seeded.leader.access_token,
            &seeded.member.id,
            10,
        )
        .await;
    let (status, first) = app
        .schedule_subtask_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &subtask_id,
            3,
        )
        .await;
    assert_eq!(status, 201);

    // Terminal rows stay visible
    let first_id = first["id"].as_str().unwrap();
    let resp = app
        .auth_delete(
            &format!(
                "/api/project/{}/notification/{first_id}",
                seeded.project_id
            ),
            &seeded.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let event_id = app
        .create_event(&seeded.project_id, &seeded.leader.access_token, 7)
        .await;
    let (status, _) = app
        .schedule_event_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &event_id,
            1,
            &[&seeded.member.id],
        )
        .await;
    assert_eq!(status, 201);

    let resp = app
        .auth_get(
            &format!("/api/project/{}/notification", seeded.project_id),
            &seeded.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();

    assert_eq!(json["total"], 2);
    assert_eq!(json["page"], 1);
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["kind"], "event");
    assert_eq!(items[1]["kind"], "subtask");
    assert_eq!(items[1]["status"], "cancelled");
}

#[tokio::test]
async fn pagination_limits_the_page() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_pages").await;

    for i in 0..3 {
        let subtask_id = app
            .create_subtask(
                &seeded.project_id,
                &seeded.leader.access_token,
                &seeded.member.id,
                20 + i,
            )
            .await;
        let (status, _) = app
            .schedule_subtask_notification(
                &seeded.project_id,
                &seeded.leader.access_token,
                &subtask_id,
                3,
            )
            .await;
        assert_eq!(status, 201);
    }

    let resp = app
        .auth_get(
            &format!(
                "/api/project/{}/notification?page=2&per_page=2",
                seeded.project_id
            ),
            &seeded.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();

    assert_eq!(json["total"], 3);
    assert_eq!(json["page"], 2);
    assert_eq!(json["per_page"], 2);
    assert_eq!(json["total_pages"], 2);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_pagination_params_are_clamped() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_zero").await;
    let subtask_id = app
        .create_subtask(
            &seeded.project_id,
            &seeded.leader.access_token,
            &seeded.member.id,
            10,
        )
        .await;
    let (status, _) = app
        .schedule_subtask_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &subtask_id,
            3,
        )
        .await;
    assert_eq!(status, 201);

    let resp = app
        .auth_get(
            &format!(
                "/api/project/{}/notification?page=0&per_page=0",
                seeded.project_id
            ),
            &seeded.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();

    assert_eq!(json["page"], 1);
    assert_eq!(json["per_page"], 1);
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn non_member_cannot_list() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_outsider").await;
    let outsider = app
        .register_user("outsider@list.test", "list_outsider", "Out123!")
        .await;

    let resp = app
        .auth_get(
            &format!("/api/project/{}/notification", seeded.project_id),
            &outsider.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_phantom").await;

    let phantom = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .auth_get(
            &format!("/api/project/{phantom}/notification"),
            &seeded.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn single_notification_is_fetchable_by_id() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_project("list_single").await;
    let subtask_id = app
        .create_subtask(
            &seeded.project_id,
            &seeded.leader.access_token,
            &seeded.member.id,
            10,
        )
        .await;
    let (status, created) = app
        .schedule_subtask_notification(
            &seeded.project_id,
            &seeded.leader.access_token,
            &subtask_id,
            3,
        )
        .await;
    assert_eq!(status, 201);
    let nid = created["id"].as_str().unwrap();

    let resp = app
        .auth_get(
            &format!("/api/project/{}/notification/{nid}", seeded.project_id),
            &seeded.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["id"], nid);
    assert_eq!(json["entity_id"], subtask_id);

    let phantom = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .auth_get(
            &format!("/api/project/{}/notification/{phantom}", seeded.project_id),
            &seeded.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
