//! Webhook envelope and the charge payload shared with `/transaction/verify`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    ChargeSuccess,
    ChargeFailed,
    Other(String),
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookKind {
        match self.event.as_str() {
            "charge.success" => WebhookKind::ChargeSuccess,
            "charge.failed" => WebhookKind::ChargeFailed,
            other => WebhookKind::Other(other.to_string()),
        }
    }

    pub fn charge(&self) -> Result<ChargeData, serde_json::Error> {
        ChargeData::deserialize(&self.data)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Customer {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChargeData {
    pub reference: String,
    /// Minor units, as Paystack sends them.
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChargeData {
    /// `paid_at` arrives as RFC 3339 (`2024-05-01T10:00:00.000Z`); anything else is dropped.
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.email.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_charge_success_payload() {
        let raw = r#"{
            "event": "charge.success",
            "data": {
                "id": 302961,
                "reference": "CHM-abc",
                "amount": 100000,
                "currency": "KES",
                "channel": "mobile_money",
                "status": "success",
                "paid_at": "2024-05-01T10:00:00.000Z",
                "gateway_response": "Approved",
                "customer": {"email": "wanjiku@example.com", "id": 1},
                "metadata": {"transaction_id": "tx-9"}
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind(), WebhookKind::ChargeSuccess);
        let charge = event.charge().unwrap();
        assert_eq!(charge.reference, "CHM-abc");
        assert_eq!(charge.amount, 100_000);
        assert_eq!(charge.customer_email(), Some("wanjiku@example.com"));
        assert_eq!(charge.paid_at().unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn tolerates_sparse_payloads() {
        let raw = r#"{"event":"charge.failed","data":{"reference":"CHM-x","metadata":"","paid_at":null}}"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind(), WebhookKind::ChargeFailed);
        let charge = event.charge().unwrap();
        assert_eq!(charge.amount, 0);
        assert!(charge.paid_at().is_none());
        assert!(charge.customer_email().is_none());
    }

    #[test]
    fn other_events_keep_their_name() {
        let event: WebhookEvent = serde_json::from_str(r#"{"event":"transfer.success","data":{}}"#).unwrap();
        assert_eq!(event.kind(), WebhookKind::Other("transfer.success".to_string()));
        assert!(event.charge().is_err());
    }
}
