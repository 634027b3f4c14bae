//! Shared types: currency, money, references and the row types the services read back.

pub mod currency;
pub mod ids;
pub mod money;
pub mod notification;
pub mod payment;
pub mod wallet;

pub use currency::Currency;
pub use notification::{NewNotification, Notification, NotificationKind};
pub use payment::{PaymentChannel, PaymentPurpose, PaymentStatus, PaymentTransaction};
pub use wallet::{CentralWallet, WalletEntryKind, WalletTransaction};
