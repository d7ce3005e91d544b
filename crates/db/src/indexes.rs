use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Users
    create_indexes(
        db,
        "users",
        vec![
            index_unique(bson::doc! { "email": 1 }),
            index_unique(bson::doc! { "username": 1 }),
        ],
    )
    .await?;

    // Projects
    create_indexes(
        db,
        "projects",
        vec![index(bson::doc! { "leader_id": 1 })],
    )
    .await?;

    // Project Members
    create_indexes(
        db,
        "project_members",
        vec![
            index_unique(bson::doc! { "project_id": 1, "user_id": 1 }),
            index(bson::doc! { "user_id": 1 }),
        ],
    )
    .await?;

    // Subtasks
    create_indexes(
        db,
        "subtasks",
        vec![
            index(bson::doc! { "project_id": 1, "created_at": -1 }),
            index(bson::doc! { "project_id": 1, "assignee_id": 1 }),
        ],
    )
    .await?;

    // Events
    create_indexes(
        db,
        "events",
        vec![index(bson::doc! { "project_id": 1, "starts_at": 1 })],
    )
    .await?;

    // Scheduled Notifications
    create_indexes(
        db,
        "scheduled_notifications",
        vec![
            index(bson::doc! { "project_id": 1, "created_at": -1 }),
            index(bson::doc! { "entity_id": 1, "status": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}
