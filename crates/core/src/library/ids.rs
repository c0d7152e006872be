//! Client-side identifier generation.
//!
//! Ids look like `<millis base36>-<6 random base36 chars>-<0..999>`. They are
//! unique with overwhelming probability on one device; nothing more is promised.

use chrono::Utc;
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a new opaque local id.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random = Uuid::new_v4();
    let bytes = random.as_bytes();

    let random_part: String = bytes[..6]
        .iter()
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect();
    let random_num = u16::from_le_bytes([bytes[6], bytes[7]]) % 1000;

    format!("{}-{}-{}", to_base36(millis), random_part, random_num)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
