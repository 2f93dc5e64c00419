//! Common utility functions used across modules.

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use asnwall::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    format_scaled(count as u128)
}

fn format_scaled(count: u128) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format an address count, switching to a power of two past `u64`.
///
/// # Examples
/// ```
/// use asnwall::utils::format_addresses;
/// assert_eq!(format_addresses(512), "512");
/// assert_eq!(format_addresses(1u128 << 96), "2^96");
/// ```
pub fn format_addresses(count: u128) -> String {
    if count > u128::from(u64::MAX) {
        if count.is_power_of_two() {
            format!("2^{}", count.trailing_zeros())
        } else {
            format!("~2^{}", 127 - count.leading_zeros())
        }
    } else {
        format_scaled(count)
    }
}
