//! Money helpers. Prices are kept as integer minor units (cents) everywhere;
//! decimal strings only exist at the edges.

/// Parse a decimal dollar amount such as `"0.5"` or `"12.345"` into cents.
///
/// Digits beyond the second decimal place round half up. Negative values,
/// exponents, empty strings and overflow all yield `None`.
pub fn parse_price_minor_units(input: &str) -> Option<i64> {
    let input = input.trim();
    let (int_part, frac_part) = match input.split_once('.') {
        Some((i, f)) => (i, f),
        None => (input, ""),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = int_part.parse().ok()?;
    let frac = frac_part.as_bytes();
    let digit = |i: usize| frac.get(i).map(|b| (b - b'0') as i64).unwrap_or(0);

    let mut cents = digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        cents += 1;
    }

    whole.checked_mul(100)?.checked_add(cents)
}

/// Render cents as a two-decimal dollar string: `50` -> `"0.50"`.
pub fn format_minor_units(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Convert cents to the smallest unit of a token with `decimals` places.
///
/// USDC has 6 decimals, so one cent is 10_000 atomic units.
pub fn minor_units_to_atomic(minor_units: i64, decimals: u32) -> Option<u128> {
    let cents = u128::try_from(minor_units).ok()?;
    if decimals >= 2 {
        cents.checked_mul(10u128.checked_pow(decimals - 2)?)
    } else {
        Some(cents / 10u128.pow(2 - decimals))
    }
}
