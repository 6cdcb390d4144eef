use alloy_primitives::{Address, U256};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::DEFAULT_DECIMALS;

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const PERCENT: u64 = 100;

/// rust_decimal keeps at most 28 fractional digits.
const MAX_DECIMAL_SCALE: u8 = 28;

pub fn ten_pow(decimals: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(decimals))
}

/// Borrowable tcUSD (1e18) for an 18-decimal collateral amount.
///
/// `collateral * unit_price_usd * collateral_factor_bps / (10_000 * 1e18)`; every
/// multiplication happens before the single division so no precision is lost
/// ahead of formatting. `None` on overflow.
pub fn borrow_capacity(
    collateral_amount: U256,
    unit_price_usd: U256,
    collateral_factor_bps: u32,
) -> Option<U256> {
    borrow_capacity_scaled(
        collateral_amount,
        unit_price_usd,
        DEFAULT_DECIMALS,
        collateral_factor_bps,
    )
}

pub fn borrow_capacity_scaled(
    collateral_amount: U256,
    unit_price_usd: U256,
    collateral_decimals: u8,
    collateral_factor_bps: u32,
) -> Option<U256> {
    let numerator = collateral_amount
        .checked_mul(unit_price_usd)?
        .checked_mul(U256::from(collateral_factor_bps))?;
    let denominator = ten_pow(collateral_decimals)?.checked_mul(U256::from(BPS_DENOMINATOR))?;
    Some(numerator / denominator)
}

/// USD value (1e18) of `amount` base units priced at `unit_price_usd` per whole token.
pub fn usd_value(amount: U256, unit_price_usd: U256, decimals: u8) -> Option<U256> {
    Some(amount.checked_mul(unit_price_usd)? / ten_pow(decimals)?)
}

pub fn percent_of_max(amount: U256, max: U256) -> U256 {
    if max.is_zero() {
        return U256::ZERO;
    }
    amount.saturating_mul(U256::from(PERCENT)) / max
}

pub fn scaled_borrow_amount(percent: U256, max: U256) -> U256 {
    max.saturating_mul(percent) / U256::from(PERCENT)
}

/// Slider preview on the deposit step: the share of `capacity` matching the
/// share of the wallet balance selected.
pub fn preview_borrowable(input: U256, wallet_balance: U256, capacity: U256) -> U256 {
    if wallet_balance.is_zero() {
        return U256::ZERO;
    }
    scaled_borrow_amount(percent_of_max(input, wallet_balance), capacity)
}

/// Renders a fixed-point amount with `dp` fractional digits, rounding half up.
/// Presentation only; never feed the result back into arithmetic.
pub fn format_units(amount: U256, decimals: u8, dp: u32) -> String {
    let Some(base) = ten_pow(decimals) else {
        return amount.to_string();
    };
    let mut whole = amount / base;
    let mut frac = amount % base;
    let mut scale = decimals;
    if scale > MAX_DECIMAL_SCALE {
        if let Some(cut) = ten_pow(scale - MAX_DECIMAL_SCALE) {
            frac /= cut;
        }
        scale = MAX_DECIMAL_SCALE;
    }
    let mantissa = u128::try_from(frac).unwrap_or_default() as i128;
    let mut frac_dec = Decimal::from_i128_with_scale(mantissa, scale as u32)
        .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    if frac_dec >= Decimal::ONE {
        whole += U256::from(1u8);
        frac_dec -= Decimal::ONE;
    }
    if dp == 0 {
        return whole.to_string();
    }
    let rendered = format!("{:.*}", dp as usize, frac_dec);
    let digits = rendered.split_once('.').map(|(_, d)| d).unwrap_or("");
    format!("{}.{}", whole, digits)
}

/// Parses a decimal token string ("1.5") into base units. Rejects signs,
/// exponents and more fractional digits than the token carries.
pub fn parse_units(text: &str, decimals: u8) -> Option<U256> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return None;
    }
    let base = ten_pow(decimals)?;
    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let padded = format!("{:0<width$}", frac, width = decimals as usize);
    let frac = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).ok()?
    };
    whole.checked_mul(base)?.checked_add(frac)
}

pub fn shorten_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..5], &full[full.len() - 5..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * ten_pow(18).unwrap()
    }

    #[test]
    fn capacity_example_vault_zero() {
        let capacity = borrow_capacity(wad(1000), wad(2), 4500).unwrap();
        assert_eq!(capacity, wad(900));
        assert_eq!(format_units(capacity, 18, 2), "900.00");
    }

    #[test]
    fn capacity_respects_collateral_decimals() {
        // 2.5 WBTC-like (8 decimals) at $30_000
        let amount = U256::from(250_000_000u64);
        let capacity = borrow_capacity_scaled(amount, wad(30_000), 8, 4500).unwrap();
        assert_eq!(capacity, wad(33_750));
    }

    #[test]
    fn capacity_monotonic_in_collateral() {
        let price = wad(2);
        let mut last = U256::ZERO;
        for step in 0..200u64 {
            let collateral = U256::from(step) * U256::from(7_919_000_000_000_000u64);
            let capacity = borrow_capacity(collateral, price, 4500).unwrap();
            assert!(capacity >= last, "capacity dropped at step {}", step);
            last = capacity;
        }
    }

    #[test]
    fn capacity_overflow_is_none() {
        assert_eq!(borrow_capacity(U256::MAX, wad(2), 4500), None);
    }

    #[test]
    fn percent_of_zero_max_is_zero() {
        assert_eq!(percent_of_max(wad(5), U256::ZERO), U256::ZERO);
        assert_eq!(percent_of_max(U256::ZERO, U256::ZERO), U256::ZERO);
    }

    #[test]
    fn percent_round_trip_within_one_point() {
        let maxes = [
            U256::from(100u64),
            U256::from(101u64),
            U256::from(999u64),
            U256::from(12_345_678_901_234_567_890u128),
            wad(900),
        ];
        for max in maxes {
            for p in 0..=100u64 {
                let percent = U256::from(p);
                let back = percent_of_max(scaled_borrow_amount(percent, max), max);
                assert!(back <= percent);
                assert!(percent - back <= U256::from(1u8), "max={} p={}", max, p);
            }
        }
    }

    #[test]
    fn percent_round_trip_small_max_bounded_by_granularity() {
        for m in 1..100u64 {
            let max = U256::from(m);
            let bound = U256::from((100 + m - 1) / m);
            for p in 0..=100u64 {
                let percent = U256::from(p);
                let back = percent_of_max(scaled_borrow_amount(percent, max), max);
                assert!(percent - back <= bound, "max={} p={}", m, p);
            }
        }
    }

    #[test]
    fn amount_round_trip_within_one_percent_of_max() {
        let max = wad(37);
        let tolerance = max / U256::from(100u64) + U256::from(1u8);
        for i in 0..=50u64 {
            let amount = max * U256::from(i) / U256::from(50u64);
            let back = scaled_borrow_amount(percent_of_max(amount, max), max);
            assert!(back <= amount);
            assert!(amount - back <= tolerance);
        }
    }

    #[test]
    fn preview_tracks_slider_share() {
        let capacity = wad(900);
        assert_eq!(preview_borrowable(wad(500), wad(1000), capacity), wad(450));
        assert_eq!(preview_borrowable(wad(1), U256::ZERO, capacity), U256::ZERO);
    }

    #[test]
    fn usd_value_of_whole_tokens() {
        assert_eq!(usd_value(wad(3), wad(2), 18), Some(wad(6)));
    }

    #[test]
    fn format_rounds_half_up_and_carries() {
        let v = U256::from(1_005_000_000_000_000_000u128);
        assert_eq!(format_units(v, 18, 2), "1.01");
        let v = U256::from(999_000_000_000_000_000u128);
        assert_eq!(format_units(v, 18, 2), "1.00");
        assert_eq!(format_units(U256::from(1_234_567u64), 6, 2), "1.23");
        assert_eq!(format_units(wad(42), 18, 0), "42");
        assert_eq!(format_units(U256::ZERO, 18, 2), "0.00");
        assert_eq!(format_units(U256::from(7u64), 0, 2), "7.00");
    }

    #[test]
    fn parse_units_accepts_decimal_strings() {
        assert_eq!(parse_units("10", 18), Some(wad(10)));
        assert_eq!(parse_units("1.5", 18), Some(wad(15) / U256::from(10u64)));
        assert_eq!(parse_units(".5", 6), Some(U256::from(500_000u64)));
        assert_eq!(parse_units("2.10", 1), Some(U256::from(21u64)));
    }

    #[test]
    fn parse_units_rejects_garbage() {
        assert_eq!(parse_units("", 18), None);
        assert_eq!(parse_units(".", 18), None);
        assert_eq!(parse_units("-1", 18), None);
        assert_eq!(parse_units("1e18", 18), None);
        assert_eq!(parse_units("1.1234567", 6), None);
    }

    #[test]
    fn shorten_keeps_both_ends() {
        let addr: Address = "0xDD15Ec62C853E492a6E31b7EBa2e9A2ECFBc123F".parse().unwrap();
        assert_eq!(shorten_address(&addr).to_lowercase(), "0xdd1...c123f");
    }
}
