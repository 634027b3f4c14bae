use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Only pending payments move, and only to a terminal status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(self, PaymentStatus::Pending) && next.is_terminal()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    ChamaPurchase,
    WalletTopup,
    AddMoney,
    Other,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::ChamaPurchase => "chama_purchase",
            PaymentPurpose::WalletTopup => "wallet_topup",
            PaymentPurpose::AddMoney => "add_money",
            PaymentPurpose::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chama_purchase" => Some(PaymentPurpose::ChamaPurchase),
            "wallet_topup" => Some(PaymentPurpose::WalletTopup),
            "add_money" => Some(PaymentPurpose::AddMoney),
            "other" => Some(PaymentPurpose::Other),
            _ => None,
        }
    }

    pub fn credits_wallet(&self) -> bool {
        matches!(
            self,
            PaymentPurpose::WalletTopup | PaymentPurpose::AddMoney | PaymentPurpose::Other
        )
    }
}

/// Channel as reported by Paystack (`mobile_money`, `bank`, `card`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentChannel {
    MobileMoney,
    Bank,
    Card,
    Other(String),
}

impl PaymentChannel {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "mobile_money" => PaymentChannel::MobileMoney,
            "bank" => PaymentChannel::Bank,
            "card" => PaymentChannel::Card,
            other => PaymentChannel::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentChannel::MobileMoney => "mobile_money",
            PaymentChannel::Bank => "bank",
            PaymentChannel::Card => "card",
            PaymentChannel::Other(s) => s.as_str(),
        }
    }

    /// Label used in wallet ledger descriptions.
    pub fn short_label(&self) -> &'static str {
        match self {
            PaymentChannel::MobileMoney => "M-Pesa",
            PaymentChannel::Bank => "Bank Transfer",
            PaymentChannel::Card => "Card",
            PaymentChannel::Other(_) => "Paystack",
        }
    }

    /// Label used in user notifications.
    pub fn long_label(&self) -> &'static str {
        match self {
            PaymentChannel::MobileMoney => "M-Pesa/Airtel Money",
            PaymentChannel::Bank => "Bank Transfer",
            PaymentChannel::Card => "Card Payment",
            PaymentChannel::Other(_) => "Paystack",
        }
    }
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chama_id: Option<Uuid>,
    pub reference: String,
    pub purpose: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub channel: Option<String>,
    pub result_desc: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status).unwrap_or(PaymentStatus::Pending)
    }

    /// Unknown purposes never touch the wallet.
    pub fn purpose(&self) -> Option<PaymentPurpose> {
        PaymentPurpose::from_str(&self.purpose)
    }

    /// Caller-supplied id that the platform fee row points back to.
    pub fn source_transaction_id(&self) -> Option<String> {
        match self.metadata.get("transaction_id") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Success));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Success.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Success));
    }

    #[test]
    fn wallet_crediting_purposes() {
        assert!(PaymentPurpose::Other.credits_wallet());
        assert!(PaymentPurpose::WalletTopup.credits_wallet());
        assert!(PaymentPurpose::AddMoney.credits_wallet());
        assert!(!PaymentPurpose::ChamaPurchase.credits_wallet());
        assert_eq!(PaymentPurpose::from_str("contribution"), None);
    }

    #[test]
    fn channel_labels() {
        let mm = PaymentChannel::parse(Some("mobile_money"));
        assert_eq!(mm.short_label(), "M-Pesa");
        assert_eq!(mm.long_label(), "M-Pesa/Airtel Money");
        let ussd = PaymentChannel::parse(Some("ussd"));
        assert_eq!(ussd.short_label(), "Paystack");
        assert_eq!(ussd.as_str(), "ussd");
        assert_eq!(PaymentChannel::parse(None), PaymentChannel::Other(String::new()));
    }
}
