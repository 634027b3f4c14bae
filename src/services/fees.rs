//! Platform fee on provider deposits. Basis points, rounded half-up, in minor units.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

pub fn platform_fee(amount: i64, fee_bps: i64) -> i64 {
    if amount <= 0 || fee_bps <= 0 {
        return 0;
    }
    let fee = (amount as i128 * fee_bps as i128 + 5_000) / 10_000;
    fee.min(amount as i128) as i64
}

pub fn split(amount: i64, fee_bps: i64) -> FeeSplit {
    let fee = platform_fee(amount, fee_bps);
    FeeSplit {
        gross: amount,
        fee,
        net: amount - fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_two_and_a_half_percent() {
        // KES 1,000.00 -> fee 25.00, net 975.00
        assert_eq!(split(100_000, 250), FeeSplit { gross: 100_000, fee: 2_500, net: 97_500 });
    }

    #[test]
    fn rounds_half_up() {
        // 2.5% of 0.20 = 0.005 -> 0.01
        assert_eq!(platform_fee(20, 250), 1);
        // 2.5% of 0.19 = 0.00475 -> 0.00
        assert_eq!(platform_fee(19, 250), 0);
        assert_eq!(platform_fee(10_050, 250), 251);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(platform_fee(0, 250), 0);
        assert_eq!(platform_fee(-100, 250), 0);
        assert_eq!(platform_fee(1_000, 0), 0);
        assert_eq!(split(1_000, 20_000).net, 0);
    }
}
