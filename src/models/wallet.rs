use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CentralWallet {
    pub user_id: Uuid,
    pub balance: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletEntryKind {
    Deposit,
    TransferIn,
    TransferOut,
}

impl WalletEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletEntryKind::Deposit => "deposit",
            WalletEntryKind::TransferIn => "transfer_in",
            WalletEntryKind::TransferOut => "transfer_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub r#type: String,
    pub amount: i64,
    pub description: Option<String>,
    pub status: String,
    pub reference_id: String,
    pub payment_method: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}
