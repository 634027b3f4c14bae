//! Turning raw `gateway_response` text from failed charges into something a user can act on.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

use crate::models::money::{format_minor, parse_major_to_minor};
use crate::models::PaymentChannel;

// "Your Airtel Money balance is Ksh 35.00"
static BALANCE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)balance is\s+(?:ksh|kes)\.?\s*([0-9][0-9,]*(?:\.[0-9]+)?)").ok());

/// Available balance quoted by the mobile-money operator, in minor units.
pub fn extract_available_balance(message: &str) -> Option<i64> {
    let re = match &*BALANCE_RE {
        Some(re) => re,
        None => {
            tracing::error!("Balance regex failed to compile");
            return None;
        }
    };
    let captures = re.captures(message).ok()??;
    parse_major_to_minor(captures.get(1)?.as_str())
}

pub fn user_failure_message(
    gateway_response: Option<&str>,
    channel: &PaymentChannel,
    available_balance: Option<i64>,
    currency: &str,
) -> String {
    let raw = gateway_response
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("Payment failed");

    if let Some(balance) = available_balance {
        let source = if *channel == PaymentChannel::MobileMoney {
            "mobile money"
        } else {
            "account"
        };
        return format!(
            "💳 Payment failed: Insufficient {} balance\n💼 Available balance: {} {}\n🔁 Please top up your account or try a smaller amount.",
            source,
            currency,
            format_minor(balance)
        );
    }

    if *channel == PaymentChannel::MobileMoney {
        return format!(
            "💳 Mobile Money transaction failed\n{}\n🔁 Please try again or contact your provider.",
            raw
        );
    }

    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_operator_balance() {
        assert_eq!(
            extract_available_balance("Your Airtel Money balance is Ksh 35.00"),
            Some(3500)
        );
        assert_eq!(
            extract_available_balance("Insufficient funds. BALANCE IS KES1,250.5"),
            Some(125_050)
        );
        assert_eq!(extract_available_balance("Balance is Ksh. 12"), Some(1200));
    }

    #[test]
    fn no_balance_in_plain_failures() {
        assert_eq!(extract_available_balance("Declined by issuer"), None);
        assert_eq!(extract_available_balance("balance is low"), None);
    }

    #[test]
    fn insufficient_balance_message() {
        let msg = user_failure_message(
            Some("Your Airtel Money balance is Ksh 35.00"),
            &PaymentChannel::MobileMoney,
            Some(3500),
            "KES",
        );
        assert!(msg.contains("Insufficient mobile money balance"));
        assert!(msg.contains("Available balance: KES 35.00"));
    }

    #[test]
    fn mobile_money_wrapper_and_passthrough() {
        let mm = user_failure_message(Some("Request cancelled by user"), &PaymentChannel::MobileMoney, None, "KES");
        assert!(mm.starts_with("💳 Mobile Money transaction failed\nRequest cancelled by user"));

        let card = user_failure_message(Some("Declined"), &PaymentChannel::Card, None, "KES");
        assert_eq!(card, "Declined");

        let empty = user_failure_message(Some("  "), &PaymentChannel::Card, None, "KES");
        assert_eq!(empty, "Payment failed");
    }
}
