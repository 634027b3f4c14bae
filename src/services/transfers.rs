//! Send money: wallet-to-wallet transfers between users, or a provider checkout for
//! M-Pesa / Airtel / card / bank payments to someone outside the platform.

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ServiceError;
use crate::models::ids::new_transfer_reference;
use crate::models::money::format_minor;
use crate::models::{NewNotification, Notification, NotificationKind, PaymentPurpose, WalletEntryKind};
use crate::paystack::PaymentGateway;
use crate::services::notifications::insert_notification;
use crate::services::payments::{start_checkout, CheckoutStarted, NewPayment};
use crate::services::wallets::{credit_wallet, debit_wallet, lock_wallets, record_entry, WalletEntry};

pub const MAX_DESCRIPTION_CHARS: usize = 200;

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());
static PHONE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\+?[0-9]{9,15}$").ok());

fn regex_matches(re: &Lazy<Option<Regex>>, value: &str) -> bool {
    match &**re {
        Some(re) => re.is_match(value).unwrap_or(false),
        None => {
            tracing::error!("Validation regex failed to compile");
            false
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    regex_matches(&EMAIL_RE, email)
}

/// Spaces and dashes are tolerated; what remains must be 9-15 digits with an optional `+`.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if regex_matches(&PHONE_RE, &compact) {
        Some(compact)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    Wallet,
    Mpesa,
    Airtel,
    CardBank,
}

impl TransferMethod {
    /// Paystack checkout channels offered for an external transfer.
    pub fn provider_channels(&self) -> Vec<String> {
        let channels: &[&str] = match self {
            TransferMethod::Wallet => &[],
            TransferMethod::Mpesa | TransferMethod::Airtel => &["mobile_money"],
            TransferMethod::CardBank => &["card", "bank", "bank_transfer", "ussd"],
        };
        channels.iter().map(|c| c.to_string()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMoneyRequest {
    pub method: TransferMethod,
    /// Recipient email for wallet transfers, free-text name otherwise.
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    /// Payer email for the provider receipt. Falls back to the token's email.
    #[serde(default)]
    pub email: Option<String>,
    /// Minor units.
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Amount must be greater than 0")]
    InvalidAmount,
    #[error("Description must be at most 200 characters")]
    DescriptionTooLong,
    #[error("Please enter recipient email")]
    MissingRecipient,
    #[error("Please enter a valid email address")]
    InvalidRecipientEmail,
    #[error("Please enter recipient phone number")]
    MissingPhone,
    #[error("Please enter a valid phone number")]
    InvalidPhone,
    #[error("Email is required for payment")]
    MissingPayerEmail,
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    Internal {
        recipient_email: String,
        amount: i64,
        description: Option<String>,
    },
    External {
        method: TransferMethod,
        payer_email: String,
        recipient: Option<String>,
        recipient_phone: Option<String>,
        amount: i64,
        description: Option<String>,
    },
}

impl SendMoneyRequest {
    pub fn validate(&self, payer_email: Option<&str>) -> Result<TransferPlan, ValidationError> {
        if self.amount <= 0 {
            return Err(ValidationError::InvalidAmount);
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        if description.as_ref().map_or(false, |d| d.chars().count() > MAX_DESCRIPTION_CHARS) {
            return Err(ValidationError::DescriptionTooLong);
        }

        if self.method == TransferMethod::Wallet {
            let recipient = non_blank(self.recipient.as_deref()).ok_or(ValidationError::MissingRecipient)?;
            if !is_valid_email(recipient) {
                return Err(ValidationError::InvalidRecipientEmail);
            }
            return Ok(TransferPlan::Internal {
                recipient_email: recipient.to_lowercase(),
                amount: self.amount,
                description,
            });
        }

        let recipient_phone = match non_blank(self.recipient_phone.as_deref()) {
            Some(phone) => Some(normalize_phone(phone).ok_or(ValidationError::InvalidPhone)?),
            None if self.method == TransferMethod::CardBank => None,
            None => return Err(ValidationError::MissingPhone),
        };

        let payer_email = non_blank(self.email.as_deref())
            .or_else(|| non_blank(payer_email))
            .ok_or(ValidationError::MissingPayerEmail)?
            .to_string();

        Ok(TransferPlan::External {
            method: self.method,
            payer_email,
            recipient: non_blank(self.recipient.as_deref()).map(str::to_string),
            recipient_phone,
            amount: self.amount,
            description,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientLookup {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: Uuid,
    full_name: Option<String>,
}

async fn find_recipient<'e, E>(executor: E, email: &str) -> Result<Option<RecipientRow>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, RecipientRow>(
        "SELECT id, full_name FROM profiles WHERE LOWER(email) = LOWER($1) LIMIT 1",
    )
    .bind(email.trim())
    .fetch_optional(executor)
    .await
}

/// Whether an email belongs to a platform user, i.e. whether a wallet transfer is possible.
pub async fn lookup_recipient(pool: &PgPool, email: &str) -> Result<RecipientLookup, ServiceError> {
    if !is_valid_email(email.trim()) {
        return Err(ValidationError::InvalidRecipientEmail.into());
    }
    let row = find_recipient(pool, email).await?;
    Ok(match row {
        Some(r) => RecipientLookup {
            registered: true,
            user_id: Some(r.id),
            full_name: r.full_name,
        },
        None => RecipientLookup {
            registered: false,
            user_id: None,
            full_name: None,
        },
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct InternalTransferResult {
    pub success: bool,
    pub reference: String,
    pub recipient_id: Uuid,
    pub amount: i64,
    pub new_balance: i64,
    #[serde(skip)]
    pub notifications: Vec<Notification>,
}

pub async fn internal_transfer(
    pool: &PgPool,
    config: &Config,
    sender_id: Uuid,
    recipient_email: &str,
    amount: i64,
    description: Option<&str>,
) -> Result<InternalTransferResult, ServiceError> {
    let mut tx = pool.begin().await?;

    let recipient = find_recipient(&mut *tx, recipient_email)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Recipient not found".to_string()))?;

    if recipient.id == sender_id {
        return Err(ServiceError::Validation(
            "You cannot send money to yourself".to_string(),
        ));
    }

    let sender_name = sqlx::query_scalar::<_, Option<String>>(
        "SELECT COALESCE(full_name, email) FROM profiles WHERE id = $1",
    )
    .bind(sender_id)
    .fetch_optional(&mut *tx)
    .await?
    .flatten()
    .unwrap_or_else(|| "A chama member".to_string());
    let recipient_name = recipient
        .full_name
        .clone()
        .unwrap_or_else(|| recipient_email.to_string());

    let currency = config.default_currency.as_str();
    let reference = new_transfer_reference();
    let note = description.unwrap_or("Wallet transfer");

    lock_wallets(&mut tx, &[sender_id, recipient.id], recipient.id, currency).await?;
    let new_balance = debit_wallet(&mut tx, sender_id, amount).await?;
    credit_wallet(&mut tx, recipient.id, amount, currency).await?;

    record_entry(
        &mut tx,
        WalletEntry {
            user_id: sender_id,
            kind: WalletEntryKind::TransferOut,
            amount,
            description: format!("Sent to {}: {}", recipient_name, note),
            reference: &reference,
            payment_method: Some("wallet"),
            currency,
        },
    )
    .await?;
    record_entry(
        &mut tx,
        WalletEntry {
            user_id: recipient.id,
            kind: WalletEntryKind::TransferIn,
            amount,
            description: format!("Received from {}: {}", sender_name, note),
            reference: &reference,
            payment_method: Some("wallet"),
            currency,
        },
    )
    .await?;

    let data = json!({ "amount": amount, "reference": reference });
    let sent = insert_notification(
        &mut tx,
        NewNotification {
            user_id: sender_id,
            chama_id: None,
            kind: NotificationKind::P2pSend,
            title: "💸 Money Sent".to_string(),
            message: format!("You sent {} {} to {}", currency, format_minor(amount), recipient_name),
            data: Some(data.clone()),
        },
    )
    .await?;
    let received = insert_notification(
        &mut tx,
        NewNotification {
            user_id: recipient.id,
            chama_id: None,
            kind: NotificationKind::P2pReceive,
            title: "💰 Money Received".to_string(),
            message: format!("You received {} {} from {}", currency, format_minor(amount), sender_name),
            data: Some(data),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(%sender_id, recipient_id = %recipient.id, amount, %reference, "Wallet transfer completed");

    Ok(InternalTransferResult {
        success: true,
        reference,
        recipient_id: recipient.id,
        amount,
        new_balance,
        notifications: vec![sent, received],
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn external_transfer(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &Config,
    sender_id: Uuid,
    method: TransferMethod,
    payer_email: &str,
    recipient: Option<&str>,
    recipient_phone: Option<&str>,
    amount: i64,
    description: Option<&str>,
) -> Result<CheckoutStarted, ServiceError> {
    let metadata = json!({
        "payment_type": "send_money",
        "method": method,
        "recipient": recipient_phone.or(recipient),
        "recipient_name": recipient,
        "notes": description,
        "user_id": sender_id,
    });

    start_checkout(
        pool,
        gateway,
        config,
        NewPayment {
            user_id: sender_id,
            chama_id: None,
            purpose: PaymentPurpose::Other,
            amount,
            currency: config.default_currency.to_string(),
            metadata,
        },
        payer_email,
        method.provider_channels(),
    )
    .await
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendMoneyOutcome {
    Internal(InternalTransferResult),
    External(CheckoutStarted),
}

impl SendMoneyOutcome {
    pub fn notifications(&self) -> &[Notification] {
        match self {
            SendMoneyOutcome::Internal(r) => &r.notifications,
            SendMoneyOutcome::External(_) => &[],
        }
    }
}

/// Validate and dispatch to the wallet or provider path.
pub async fn send_money(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &Config,
    sender_id: Uuid,
    sender_email: Option<&str>,
    request: &SendMoneyRequest,
) -> Result<SendMoneyOutcome, ServiceError> {
    match request.validate(sender_email)? {
        TransferPlan::Internal {
            recipient_email,
            amount,
            description,
        } => internal_transfer(pool, config, sender_id, &recipient_email, amount, description.as_deref())
            .await
            .map(SendMoneyOutcome::Internal),
        TransferPlan::External {
            method,
            payer_email,
            recipient,
            recipient_phone,
            amount,
            description,
        } => external_transfer(
            pool,
            gateway,
            config,
            sender_id,
            method,
            &payer_email,
            recipient.as_deref(),
            recipient_phone.as_deref(),
            amount,
            description.as_deref(),
        )
        .await
        .map(SendMoneyOutcome::External),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: TransferMethod) -> SendMoneyRequest {
        SendMoneyRequest {
            method,
            recipient: None,
            recipient_phone: None,
            email: None,
            amount: 50_000,
            description: None,
        }
    }

    #[test]
    fn wallet_transfer_needs_valid_recipient_email() {
        let mut req = request(TransferMethod::Wallet);
        assert_eq!(req.validate(None), Err(ValidationError::MissingRecipient));

        req.recipient = Some("not-an-email".into());
        assert_eq!(req.validate(None), Err(ValidationError::InvalidRecipientEmail));

        req.recipient = Some("  Jane@Example.com ".into());
        assert_eq!(
            req.validate(None),
            Ok(TransferPlan::Internal {
                recipient_email: "jane@example.com".into(),
                amount: 50_000,
                description: None,
            })
        );
    }

    #[test]
    fn amount_must_be_positive() {
        let mut req = request(TransferMethod::Mpesa);
        req.amount = 0;
        assert_eq!(req.validate(Some("a@b.co")), Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn description_limit_counts_characters() {
        let mut req = request(TransferMethod::Wallet);
        req.recipient = Some("jane@example.com".into());
        req.description = Some("é".repeat(200));
        assert!(req.validate(None).is_ok());
        req.description = Some("x".repeat(201));
        assert_eq!(req.validate(None), Err(ValidationError::DescriptionTooLong));
    }

    #[test]
    fn mobile_money_needs_phone_and_payer_email() {
        let mut req = request(TransferMethod::Airtel);
        assert_eq!(req.validate(Some("payer@example.com")), Err(ValidationError::MissingPhone));

        req.recipient_phone = Some("12ab".into());
        assert_eq!(req.validate(Some("payer@example.com")), Err(ValidationError::InvalidPhone));

        req.recipient_phone = Some("+254 712-345-678".into());
        assert_eq!(req.validate(None), Err(ValidationError::MissingPayerEmail));

        match req.validate(Some("payer@example.com")) {
            Ok(TransferPlan::External { recipient_phone, payer_email, .. }) => {
                assert_eq!(recipient_phone.as_deref(), Some("+254712345678"));
                assert_eq!(payer_email, "payer@example.com");
            }
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[test]
    fn card_bank_does_not_need_phone() {
        let mut req = request(TransferMethod::CardBank);
        req.email = Some("payer@example.com".into());
        assert!(matches!(req.validate(None), Ok(TransferPlan::External { recipient_phone: None, .. })));
    }

    #[test]
    fn channels_per_method() {
        assert_eq!(TransferMethod::Mpesa.provider_channels(), vec!["mobile_money"]);
        assert_eq!(
            TransferMethod::CardBank.provider_channels(),
            vec!["card", "bank", "bank_transfer", "ussd"]
        );
        assert!(TransferMethod::Wallet.provider_channels().is_empty());
    }

    #[test]
    fn method_deserializes_snake_case() {
        let req: SendMoneyRequest =
            serde_json::from_str(r#"{"method":"card_bank","amount":100}"#).unwrap();
        assert_eq!(req.method, TransferMethod::CardBank);
    }
}
