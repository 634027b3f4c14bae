//! Paystack integration: webhook signatures and payloads, gateway messages, and the REST client.

pub mod client;
pub mod events;
pub mod gateway_message;
pub mod signature;

pub use client::{
    GatewayError, InitializeTransaction, InitializedTransaction, PaymentGateway, PaystackClient,
    ProviderBalance,
};
pub use events::{ChargeData, WebhookEvent, WebhookKind};
