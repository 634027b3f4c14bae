pub mod fees;
pub mod notifications;
pub mod payments;
pub mod reconciliation;
pub mod transfers;
pub mod wallets;
pub mod webhook_processor;
