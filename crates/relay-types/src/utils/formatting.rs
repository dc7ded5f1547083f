//! String formatting utilities.
//!
//! Helpers for shortening object ids and digests in log fields, managing
//! hex prefixes, and rendering coin amounts in whole units.

/// Shortens an identifier for display: the first 10 characters followed by
/// `..` when longer.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Adds a `0x` prefix unless one is already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Strips a leading `0x` or `0X`.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders a raw coin amount with `decimals` fractional digits.
///
/// Trailing zeros in the fraction are dropped, keeping at least one digit,
/// e.g. `format_coin_amount(1_500_000_000, 9) == "1.5"`.
pub fn format_coin_amount(amount: u64, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}

	let scale = 10u128.pow(decimals as u32);
	let amount = amount as u128;
	let whole = amount / scale;
	let fraction = format!("{:0width$}", amount % scale, width = decimals as usize);
	let trimmed = fraction.trim_end_matches('0');

	if trimmed.is_empty() {
		format!("{}.0", whole)
	} else {
		format!("{}.{}", whole, trimmed)
	}
}
