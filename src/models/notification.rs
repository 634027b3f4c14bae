use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    PaymentSuccess,
    PaymentFailed,
    ChamaPurchased,
    P2pSend,
    P2pReceive,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PaymentSuccess => "payment_success",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::ChamaPurchased => "chama_purchased",
            NotificationKind::P2pSend => "p2p_send",
            NotificationKind::P2pReceive => "p2p_receive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub chama_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chama_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
