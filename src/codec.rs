use chrono::{Datelike, Local, TimeZone, Timelike};
use crc32fast::Hasher as Crc32;

/// Read a little-endian u16 at `off`, or None when the buffer is too short.
pub fn read_u16_le(buf: &[u8], off: usize) -> Option<u16> {
    let bytes = buf.get(off..off + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian u32 at `off`, or None when the buffer is too short.
pub fn read_u32_le(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn crc32_ieee(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Decode DOS date/time fields into (year, month, day, hour, minute, second).
/// No validation: out-of-range fields are reported to the caller as-is.
pub fn dos_datetime_decode(date: u16, time: u16) -> (u16, u8, u8, u8, u8, u8) {
    let year = ((date >> 9) & 0x7f) + 1980;
    let month = ((date >> 5) & 0x0f) as u8;
    let day = (date & 0x1f) as u8;
    let hour = ((time >> 11) & 0x1f) as u8;
    let minute = ((time >> 5) & 0x3f) as u8;
    let second = ((time & 0x1f) * 2) as u8;
    (year, month, day, hour, minute, second)
}

pub fn dos_datetime_encode(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> (u16, u16) {
    let date = (year.saturating_sub(1980) & 0x7f) << 9
        | (u16::from(month) & 0x0f) << 5
        | u16::from(day) & 0x1f;
    let time =
        (u16::from(hour) & 0x1f) << 11 | (u16::from(minute) & 0x3f) << 5 | u16::from(second / 2);
    (date, time)
}

/// Convert a Unix timestamp to DOS (date, time) in local time. Timestamps
/// before the DOS epoch clamp to 1980-01-01.
pub fn unix_mtime_to_dos(mtime: i64) -> (u16, u16) {
    match Local.timestamp_opt(mtime, 0).single() {
        Some(dt) if dt.year() >= 1980 => dos_datetime_encode(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        ),
        _ => dos_datetime_encode(1980, 1, 1, 0, 0, 0),
    }
}

/// Render a DOS date/time pair like "2024-05-01 13:37:42", or None when the
/// stored fields do not form a real calendar date.
pub fn format_dos_datetime(date: u16, time: u16) -> Option<String> {
    let (y, mo, d, h, mi, s) = dos_datetime_decode(date, time);
    if mo == 0 || mo > 12 || d == 0 || d > 31 || h > 23 || mi > 59 || s > 59 {
        return None;
    }
    Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
}

pub fn format_epoch(mtime: i64) -> String {
    match Local.timestamp_opt(mtime, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "INVALID_DATE".to_string(),
    }
}

/// Decode bytes as UTF-8 for display without losing information: every
/// undecodable byte is rendered as a `\xNN` escape instead of U+FFFD, so the
/// printed form still identifies the original bytes.
pub fn escape_non_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(text) => {
                out.push_str(text);
                return out;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(std::str::from_utf8(&rest[..valid]).expect("validated prefix"));
                let bad_len = err.error_len().unwrap_or(rest.len() - valid);
                for &b in &rest[valid..valid + bad_len] {
                    out.push_str(&format!("\\x{b:02x}"));
                }
                rest = &rest[valid + bad_len..];
            }
        }
    }
}

/// OR the setuid/setgid/sticky bits into `mode`.
pub fn apply_special_bits(mode: u32, setuid: bool, setgid: bool, sticky: bool) -> u32 {
    let mut mode = mode;
    if setuid {
        mode |= 0o4000;
    }
    if setgid {
        mode |= 0o2000;
    }
    if sticky {
        mode |= 0o1000;
    }
    mode
}

/// Format a Unix mode as the ten-character `ls -l` permission string,
/// honoring setuid/setgid/sticky and the file-type nibble.
pub fn format_mode(mode: u32) -> String {
    let type_char = match mode & 0o170000 {
        0o120000 => 'l',
        0o040000 => 'd',
        0o060000 => 'b',
        0o020000 => 'c',
        0o010000 => 'p',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(type_char);

    out.push(if mode & 0o400 != 0 { 'r' } else { '-' });
    out.push(if mode & 0o200 != 0 { 'w' } else { '-' });
    out.push(match (mode & 0o100 != 0, mode & 0o4000 != 0) {
        (true, true) => 's',
        (false, true) => 'S',
        (true, false) => 'x',
        (false, false) => '-',
    });

    out.push(if mode & 0o040 != 0 { 'r' } else { '-' });
    out.push(if mode & 0o020 != 0 { 'w' } else { '-' });
    out.push(match (mode & 0o010 != 0, mode & 0o2000 != 0) {
        (true, true) => 's',
        (false, true) => 'S',
        (true, false) => 'x',
        (false, false) => '-',
    });

    out.push(if mode & 0o004 != 0 { 'r' } else { '-' });
    out.push(if mode & 0o002 != 0 { 'w' } else { '-' });
    out.push(match (mode & 0o001 != 0, mode & 0o1000 != 0) {
        (true, true) => 't',
        (false, true) => 'T',
        (true, false) => 'x',
        (false, false) => '-',
    });

    out
}
