use crate::errors::InputError;
use std::time::Duration;

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Digits of a fraction beyond this precision cannot change a nanosecond count.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a duration string such as `"600s"`, `"1m30s"`, `"1.5h"` or `"0"`.
///
/// Each component is a decimal number with an optional fraction followed by
/// a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`). Negative durations are
/// rejected.
pub fn parse_duration(input: &str) -> Result<Duration, InputError> {
    let err = |why: &str| InputError::DurationParse(format!("{input:?}: {why}"));

    let mut s = input.trim();
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(err("empty duration"));
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, rest) = s.split_at(int_len);
        s = rest;

        let mut frac_part = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &rest[..frac_len];
            s = &rest[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err("expected a number"));
        }

        let unit_len = s
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let (unit, rest) = s.split_at(unit_len);
        s = rest;
        if unit.is_empty() {
            return Err(err("missing unit"));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, nanos)| *nanos)
            .ok_or_else(|| err(&format!("unknown unit {unit:?}")))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err("number out of range"))?
        };
        total = whole
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| err("duration out of range"))?;

        let frac_digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().map_err(|_| err("bad fraction"))?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            total = total
                .checked_add(numerator * scale / denominator)
                .ok_or_else(|| err("duration out of range"))?;
        }
    }

    if negative && total > 0 {
        return Err(err("negative durations are not allowed"));
    }
    let nanos = u64::try_from(total).map_err(|_| err("duration out of range"))?;
    Ok(Duration::from_nanos(nanos))
}
