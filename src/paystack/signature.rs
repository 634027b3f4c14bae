//! `x-paystack-signature` is the hex HMAC-SHA512 of the raw request body,
//! keyed with the account's secret key.

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against the body.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let expected = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"charge.success","data":{"reference":"CHM-1"}}"#;

    #[test]
    fn accepts_own_signature() {
        let sig = sign("sk_test_abc", BODY);
        assert_eq!(sig.len(), 128);
        assert!(verify("sk_test_abc", BODY, &sig));
        assert!(verify("sk_test_abc", BODY, &sig.to_uppercase()));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_body() {
        let sig = sign("sk_test_abc", BODY);
        assert!(!verify("sk_test_other", BODY, &sig));
        let tampered = br#"{"event":"charge.success","data":{"reference":"CHM-2"}}"#;
        assert!(!verify("sk_test_abc", tampered, &sig));
    }

    #[test]
    fn rejects_malformed_signature() {
        assert!(!verify("sk_test_abc", BODY, "not-hex"));
        assert!(!verify("sk_test_abc", BODY, ""));
        assert!(!verify("sk_test_abc", BODY, "abcd"));
    }
}
