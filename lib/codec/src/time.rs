//! BCD-encoded timestamps: `YY MM DD HH mm SS`, local wall-clock time.

use super::bcd::{bcd_read, bcd_write};
use chrono::{Datelike, Local, Timelike};

/// Current local wall time -> 6 BCD bytes `YY MM DD HH mm SS` (2-digit year).
pub fn bcd_time_encode() -> Vec<u8> {
    let now = Local::now();
    let digits = format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}",
        now.year() % 100,
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    );
    bcd_write(&digits)
}

/// Encode a 6-byte BCD report time field from raw bytes (used by callers
/// that already hold a `(bytes, offset)` pair, e.g. the builder).
pub fn bcd_time_bytes_from_digits(digits: &str) -> Vec<u8> {
    bcd_write(digits)
}

/// 10- or 12-digit BCD string -> `"YYYY-MM-DD HH:MM:SS"`. Years below 10
/// digits are returned unmodified (caller's malformed input passes through,
/// matching the reference's behavior of returning the raw string).
pub fn bcd_time_decode(time_bcd: &str) -> String {
    if time_bcd.len() < 10 {
        return time_bcd.to_string();
    }

    let year = 2000 + time_bcd[0..2].parse::<i32>().unwrap_or(0);
    let month = &time_bcd[2..4];
    let day = &time_bcd[4..6];
    let hour = &time_bcd[6..8];
    let minute = &time_bcd[8..10];
    let second = if time_bcd.len() >= 12 {
        &time_bcd[10..12]
    } else {
        "00"
    };

    format!("{}-{}-{} {}:{}:{}", year, month, day, hour, minute, second)
}

/// Decode a 6-byte BCD report-time field directly from frame bytes at
/// `offset`, as the parser needs when reading `body[2..8]`.
pub fn bcd_time_decode_bytes(data: &[u8], offset: usize) -> String {
    bcd_time_decode(&bcd_read(data, offset, 6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_twelve_digit() {
        assert_eq!(bcd_time_decode("221229102215"), "2022-12-29 10:22:15");
    }

    #[test]
    fn decode_ten_digit_defaults_seconds() {
        assert_eq!(bcd_time_decode("2212291022"), "2022-12-29 10:22:00");
    }

    #[test]
    fn decode_too_short_passes_through() {
        assert_eq!(bcd_time_decode("123"), "123");
    }

    #[test]
    fn encode_is_six_bytes() {
        assert_eq!(bcd_time_encode().len(), 6);
    }
}
