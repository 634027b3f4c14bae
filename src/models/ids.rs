//! Provider and ledger references.

use uuid::Uuid;

/// New provider reference. Paystack accepts `[A-Za-z0-9=.-]`, unique per payment.
pub fn new_payment_reference() -> String {
    format!("CHM-{}", Uuid::new_v4().simple())
}

pub fn new_transfer_reference() -> String {
    format!("TRF-{}", Uuid::new_v4().simple())
}
