pub mod health;
pub mod notifications;
pub mod payments;
pub mod transfers;
pub mod wallet;
pub mod webhooks;

pub use health::health_check;
pub use notifications::{get_notifications, mark_notification_read};
pub use payments::{get_payment_status, initialize_payment};
pub use transfers::{lookup_recipient, send_money};
pub use wallet::{get_wallet, get_wallet_transactions, sync_wallet_balance};
pub use webhooks::paystack_webhook;
