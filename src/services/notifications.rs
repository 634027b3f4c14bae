use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, chama_id, type, title, message, data, is_read, created_at";

pub async fn insert_notification(
    conn: &mut PgConnection,
    notification: NewNotification,
) -> Result<Notification, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO chama_notifications (user_id, chama_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        NOTIFICATION_COLUMNS
    );
    sqlx::query_as::<_, Notification>(&sql)
        .bind(notification.user_id)
        .bind(notification.chama_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(conn)
        .await
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM chama_notifications
        WHERE user_id = $1 AND ($2 = false OR is_read = false)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
        NOTIFICATION_COLUMNS
    );
    sqlx::query_as::<_, Notification>(&sql)
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Returns false when the notification does not exist or belongs to someone else.
pub async fn mark_read(pool: &PgPool, user_id: Uuid, notification_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE chama_notifications SET is_read = true WHERE id = $1 AND user_id = $2",
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
