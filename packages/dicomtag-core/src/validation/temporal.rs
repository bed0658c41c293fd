//! Date / DateTime / Time literal parsing
//!
//! Each VR accepts a fixed, ordered list of format patterns. A pattern is a
//! sequence of fixed-width digit fields and literal separators:
//!
//! | token | meaning                                   |
//! |-------|-------------------------------------------|
//! | `yyyy`| year (4 digits, 0001..=9999)               |
//! | `MM`  | month                                     |
//! | `dd`  | day of month                              |
//! | `HH`  | hour (00..=23)                            |
//! | `mm`  | minute                                    |
//! | `ss`  | second                                    |
//! | `f…`  | fractional seconds, one digit per `f`     |
//! | `z…`  | UTC offset: `z` = ±H/±HH, `zz` = ±HH, `zzz` = ±HHMM or ±HH:MM |
//!
//! Any other character must match literally. The whole input must be
//! consumed. The same tables back ingestion validation and query literal
//! parsing, so both paths accept exactly the same literals.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;

/// DA
pub const DATE_PATTERNS: &[&str] = &["yyyyMMdd"];

/// DT, including reduced precision and offset variants
pub const DATE_TIME_PATTERNS: &[&str] = &[
    "yyyyMMddHHmmss",
    "yyyyMMddHHmmsszzz",
    "yyyyMMddHHmmsszz",
    "yyyyMMddHHmmssz",
    "yyyyMMddHHmmss.ffffff",
    "yyyyMMddHHmmss.fffff",
    "yyyyMMddHHmmss.ffff",
    "yyyyMMddHHmmss.fff",
    "yyyyMMddHHmmss.ff",
    "yyyyMMddHHmmss.f",
    "yyyyMMddHHmm",
    "yyyyMMddHH",
    "yyyyMMdd",
    "yyyyMM",
    "yyyy",
    "yyyyMMddHHmmss.ffffffzzz",
    "yyyyMMddHHmmss.fffffzzz",
    "yyyyMMddHHmmss.ffffzzz",
    "yyyyMMddHHmmss.fffzzz",
    "yyyyMMddHHmmss.ffzzz",
    "yyyyMMddHHmmss.fzzz",
    "yyyyMMddHHmmzzz",
    "yyyyMMddHHzzz",
    "yyyy.MM.dd",
    "yyyy/MM/dd",
];

/// TM, including ACR-NEMA separator variants
pub const TIME_PATTERNS: &[&str] = &[
    "HHmmss",
    "HH",
    "HHmm",
    "HHmmssf",
    "HHmmssff",
    "HHmmssfff",
    "HHmmssffff",
    "HHmmssfffff",
    "HHmmssffffff",
    "HHmmss.f",
    "HHmmss.ff",
    "HHmmss.fff",
    "HHmmss.ffff",
    "HHmmss.fffff",
    "HHmmss.ffffff",
    "HH.mm",
    "HH.mm.ss",
    "HH.mm.ss.f",
    "HH.mm.ss.ff",
    "HH.mm.ss.fff",
    "HH.mm.ss.ffff",
    "HH.mm.ss.fffff",
    "HH.mm.ss.ffffff",
    "HH:mm",
    "HH:mm:ss",
    "HH:mm:ss:f",
    "HH:mm:ss:ff",
    "HH:mm:ss:fff",
    "HH:mm:ss:ffff",
    "HH:mm:ss:fffff",
    "HH:mm:ss:ffffff",
    "HH:mm:ss.f",
    "HH:mm:ss.ff",
    "HH:mm:ss.fff",
    "HH:mm:ss.ffff",
    "HH:mm:ss.fffff",
    "HH:mm:ss.ffffff",
];

/// 100ns ticks per second, the ordinal unit times are compared in
pub const TICKS_PER_SECOND: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Fraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Digits(Field, usize),
    Offset(usize),
    Literal(char),
}

#[derive(Debug, Clone)]
struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    fn compile(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }
            let field = match c {
                'y' => Some(Field::Year),
                'M' => Some(Field::Month),
                'd' => Some(Field::Day),
                'H' => Some(Field::Hour),
                'm' => Some(Field::Minute),
                's' => Some(Field::Second),
                'f' => Some(Field::Fraction),
                _ => None,
            };
            match (field, c) {
                (Some(field), _) => tokens.push(Token::Digits(field, run)),
                (None, 'z') => tokens.push(Token::Offset(run)),
                (None, _) => {
                    // Literals never repeat in the tables; push each one
                    for _ in 0..run {
                        tokens.push(Token::Literal(c));
                    }
                }
            }
            i += run;
        }
        Self { tokens }
    }

    fn parse(&self, input: &str) -> Option<Components> {
        let bytes = input.as_bytes();
        let mut pos = 0;
        let mut parts = Components::default();

        for token in &self.tokens {
            match *token {
                Token::Literal(c) => {
                    if bytes.get(pos).copied() != Some(c as u8) {
                        return None;
                    }
                    pos += 1;
                }
                Token::Digits(field, width) => {
                    let value = take_digits(bytes, &mut pos, width)?;
                    match field {
                        Field::Year => parts.year = value,
                        Field::Month => parts.month = value,
                        Field::Day => parts.day = value,
                        Field::Hour => parts.hour = value,
                        Field::Minute => parts.minute = value,
                        Field::Second => parts.second = value,
                        Field::Fraction => {
                            parts.nanos = value * 10u32.pow(9 - width as u32);
                        }
                    }
                }
                Token::Offset(width) => {
                    parts.offset_minutes = Some(take_offset(bytes, &mut pos, width)?);
                }
            }
        }

        if pos != bytes.len() {
            return None;
        }
        Some(parts)
    }
}

#[derive(Debug, Clone, Copy)]
struct Components {
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
    offset_minutes: Option<i32>,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            year: 1,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            nanos: 0,
            offset_minutes: None,
        }
    }
}

impl Components {
    fn date(&self) -> Option<NaiveDate> {
        if self.year == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)
    }

    fn time(&self) -> Option<NaiveTime> {
        // Reject leap seconds; chrono would accept second 59 + 1s nanos
        if self.second > 59 {
            return None;
        }
        NaiveTime::from_hms_nano_opt(self.hour, self.minute, self.second, self.nanos)
    }
}

fn take_digits(bytes: &[u8], pos: &mut usize, width: usize) -> Option<u32> {
    let end = *pos + width;
    let slice = bytes.get(*pos..end)?;
    if !slice.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = slice
        .iter()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
    *pos = end;
    Some(value)
}

fn take_offset(bytes: &[u8], pos: &mut usize, width: usize) -> Option<i32> {
    let sign = match bytes.get(*pos)? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    *pos += 1;

    let (hours, minutes) = match width {
        1 => {
            // One or two hour digits
            let two = bytes.get(*pos + 1).map_or(false, u8::is_ascii_digit);
            (take_digits(bytes, pos, if two { 2 } else { 1 })?, 0)
        }
        2 => (take_digits(bytes, pos, 2)?, 0),
        _ => {
            let hours = take_digits(bytes, pos, 2)?;
            if bytes.get(*pos) == Some(&b':') {
                *pos += 1;
            }
            (hours, take_digits(bytes, pos, 2)?)
        }
    };

    if hours > 14 || minutes > 59 {
        return None;
    }
    Some(sign * (hours as i32 * 60 + minutes as i32))
}

static DATE_TABLE: Lazy<Vec<Pattern>> =
    Lazy::new(|| DATE_PATTERNS.iter().map(|p| Pattern::compile(p)).collect());
static DATE_TIME_TABLE: Lazy<Vec<Pattern>> =
    Lazy::new(|| DATE_TIME_PATTERNS.iter().map(|p| Pattern::compile(p)).collect());
static TIME_TABLE: Lazy<Vec<Pattern>> =
    Lazy::new(|| TIME_PATTERNS.iter().map(|p| Pattern::compile(p)).collect());

fn first_match(table: &[Pattern], input: &str) -> Option<Components> {
    table.iter().find_map(|pattern| pattern.parse(input))
}

/// Parse a DA literal
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    first_match(&DATE_TABLE, input)?.date()
}

/// Parse a DT literal to its local clock time
///
/// A UTC offset is validated but not applied: the value is indexed and
/// compared as the wall-clock time written in the literal.
pub fn parse_date_time(input: &str) -> Option<NaiveDateTime> {
    let parts = first_match(&DATE_TIME_TABLE, input)?;
    Some(NaiveDateTime::new(parts.date()?, parts.time()?))
}

/// Parse a TM literal to 100ns ticks since midnight
pub fn parse_time_ticks(input: &str) -> Option<i64> {
    let time = first_match(&TIME_TABLE, input)?.time()?;
    Some(
        i64::from(time.num_seconds_from_midnight()) * TICKS_PER_SECOND
            + i64::from(time.nanosecond() / 100),
    )
}
