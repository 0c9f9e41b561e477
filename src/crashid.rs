//! Component B: crash identifier minting and validation.
//!
//! A crash id is a 36-character string shaped like a UUID:
//! `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxDDDDDD` where the final two hex
//! digits encode the day-of-month, the digit before that encodes the
//! throttle depth, and the rest is random.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

const HEX_DIGITS: &[u8] = b"0123456789abcdef";

/// Mint a new crash id for `now`, stamping in `throttle_depth` (the
/// numeric scheme returned by the throttler, e.g. 0 for accept, 1 for
/// defer) and the day-of-month.
pub fn mint(now: DateTime<Utc>, throttle_depth: u8) -> String {
    let mut rng = rand::rng();
    let mut random_hex = |n: usize| -> String {
        (0..n)
            .map(|_| HEX_DIGITS[rng.random_range(0..16)] as char)
            .collect()
    };

    let group1 = random_hex(8);
    let group2 = random_hex(4);
    let group3 = random_hex(4);
    let group4 = random_hex(4);

    // Last group is 12 hex digits: 9 random + 1 throttle-depth digit +
    // 2 day-of-month digits.
    let depth_digit = std::char::from_digit((throttle_depth % 16) as u32, 16).unwrap();
    let day_digits = format!("{:02}", now.day());
    let group5_prefix = random_hex(9);

    format!("{group1}-{group2}-{group3}-{group4}-{group5_prefix}{depth_digit}{day_digits}")
}

/// Validate that `candidate` has the dash-grouped 8-4-4-4-12 hex shape
/// and that its day-of-month digits are a plausible day (01-31).
pub fn validate(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split('-').collect();
    if groups.len() != 5 {
        return false;
    }
    let expected_lens = [8, 4, 4, 4, 12];
    for (group, expected_len) in groups.iter().zip(expected_lens) {
        if group.len() != expected_len || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
    }
    let last = groups[4];
    let day_str = &last[10..12];
    match day_str.parse::<u32>() {
        Ok(day) => (1..=31).contains(&day),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minted_id_is_valid() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let id = mint(now, 0);
        assert_eq!(id.len(), 36);
        assert!(validate(&id), "minted id {id} should validate");
        assert!(id.ends_with("15"));
    }

    #[test]
    fn minted_id_encodes_day_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let id = mint(now, 1);
        assert!(id.ends_with("05"));
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(!validate("not-a-crash-id"));
        assert!(!validate(""));
    }

    #[test]
    fn rejects_implausible_day() {
        // last group replaced so day digits are "99"
        let bad = "aaaaaaaa-bbbb-cccc-dddd-aaaaaaaaaa99";
        assert!(!validate(bad));
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "zzzzzzzz-bbbb-cccc-dddd-aaaaaaaaaa15";
        assert!(!validate(bad));
    }
}
