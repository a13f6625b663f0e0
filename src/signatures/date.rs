//! PDF date strings (ISO 32000-1:2008, Section 7.9.4).
//!
//! `D:YYYYMMDDHHmmSSOHH'mm'` where every field after the year is optional
//! and `O` is `+`, `-` or `Z`.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// Parse a PDF date. Returns `None` for malformed input.
pub fn parse_pdf_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let bytes = s.as_bytes();

    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits < 4 {
        return None;
    }
    let field = |start: usize, len: usize, default: u32| -> Option<u32> {
        if start + len <= digits {
            s[start..start + len].parse().ok()
        } else {
            Some(default)
        }
    };

    let year: i32 = s[..4].parse().ok()?;
    let month = field(4, 2, 1)?;
    let day = field(6, 2, 1)?;
    let hour = field(8, 2, 0)?;
    let minute = field(10, 2, 0)?;
    let second = field(12, 2, 0)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    let offset_seconds = match bytes.get(digits) {
        None | Some(b'Z') => 0,
        Some(sign @ (b'+' | b'-')) => {
            let rest: String = s[digits + 1..]
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            let hours: i32 = rest.get(..2).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = rest.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let total = hours * 3600 + minutes * 60;
            if *sign == b'-' {
                -total
            } else {
                total
            }
        },
        Some(_) => return None,
    };

    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a UTC time as a PDF date string.
pub fn format_pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}
