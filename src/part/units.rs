//! Byte quantities with k/M/G/T suffixes.
//!
//! Units are binary (1024-based) in both directions so that a value formatted
//! here parses back to the same count.

use crate::error::InstallerError;

const UNITS: [&str; 5] = ["b", "k", "M", "G", "T"];

/// Formats `bytes` with the largest unit that keeps the value below 1024.
///
/// `format(1048576, 0) == "1M"`, `format(1536, 1) == "1.5k"`.
pub fn format(bytes: u64, precision: usize) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.*}{}", precision, value, UNITS[unit])
}

fn multiplier(suffix: char) -> u64 {
    match suffix.to_ascii_lowercase() {
        'k' => 1 << 10,
        'm' => 1 << 20,
        'g' => 1 << 30,
        't' => 1 << 40,
        _ => 1,
    }
}

/// Parses a size typed by the user.
///
/// Digits and one decimal point form the number; commas are skipped. The first
/// other character is the unit suffix and ends the scan. The fractional part is
/// dropped before scaling, so `"1.5G"` is one gibibyte.
pub fn parse(text: &str) -> Result<u64, InstallerError> {
    let invalid = || InstallerError::InvalidSize(text.to_string());

    let mut number = String::new();
    let mut seen_dot = false;
    let mut mul = 1;

    for c in text.trim().chars() {
        match c {
            '0'..='9' => number.push(c),
            ',' => {}
            '.' if !seen_dot => {
                seen_dot = true;
                number.push(c);
            }
            '.' => return Err(invalid()),
            other => {
                mul = multiplier(other);
                break;
            }
        }
    }

    let whole = number.split('.').next().unwrap_or("");
    if whole.is_empty() {
        return Err(invalid());
    }
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    whole.checked_mul(mul).ok_or_else(invalid)
}
