//! ISO 8601 duration handling for recipe cook/prep times
//!
//! Durations travel as strings in the `P[nD]T[nH][nM][n[.n]S]` grammar.
//! Parsing accepts only non-negative values; the derived total time is the
//! formatted sum of cook and prep, absent when both are missing or zero.

use chrono::Duration;

/// Parse a non-negative ISO 8601 duration such as `PT20M` or `P1DT2H30M`.
///
/// Returns `None` for anything outside the grammar, including signed values,
/// out-of-order components, and a bare `P`/`PT`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim().to_ascii_uppercase();
    let rest = s.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    if matches!(time_part, Some("")) {
        return None;
    }

    let mut total = Duration::zero();

    if !date_part.is_empty() {
        let digits = date_part.strip_suffix('D')?;
        let days = parse_int_component(digits)?;
        total = total.checked_add(&Duration::try_days(days)?)?;
    }

    if let Some(t) = time_part {
        total = total.checked_add(&parse_time_part(t)?)?;
    }

    Some(total)
}

/// Format a non-negative duration back into canonical `PT..` form.
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.num_seconds();
    let nanos = d.subsec_nanos();
    if total_secs == 0 && nanos == 0 {
        return "PT0S".to_string();
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if secs > 0 || nanos > 0 {
        if nanos > 0 {
            let frac = format!("{:09}", nanos);
            out.push_str(&format!("{}.{}S", secs, frac.trim_end_matches('0')));
        } else {
            out.push_str(&format!("{}S", secs));
        }
    }
    out
}

/// Derived total time: formatted cook + prep, `None` when both are absent,
/// zero, or unparseable (stale stored values must not break reads).
pub fn total_time(cook: Option<&str>, prep: Option<&str>) -> Option<String> {
    let parse_or_zero = |v: Option<&str>| match v {
        Some(s) if !s.is_empty() => parse_duration(s),
        _ => Some(Duration::zero()),
    };

    let total = parse_or_zero(cook)?.checked_add(&parse_or_zero(prep)?)?;
    if total.is_zero() {
        None
    } else {
        Some(format_duration(total))
    }
}

/// Unsigned integer component; rejects signs, empty strings, and overflow.
fn parse_int_component(digits: &str) -> Option<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_time_part(t: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut rest = t;
    // Components must appear in H, M, S order, each at most once.
    let mut rank = 0u8;

    while !rest.is_empty() {
        let unit_pos = rest.find(|c: char| c.is_ascii_alphabetic())?;
        let (num, tail) = rest.split_at(unit_pos);
        let unit = tail.as_bytes()[0] as char;
        rest = &tail[1..];

        let component = match unit {
            'H' if rank < 1 => {
                rank = 1;
                Duration::try_hours(parse_int_component(num)?)?
            }
            'M' if rank < 2 => {
                rank = 2;
                Duration::try_minutes(parse_int_component(num)?)?
            }
            'S' if rank < 3 => {
                rank = 3;
                parse_seconds_component(num)?
            }
            _ => return None,
        };
        total = total.checked_add(&component)?;
    }

    if rank == 0 {
        return None;
    }
    Some(total)
}

/// Seconds allow a fractional part, e.g. `1.5S`.
fn parse_seconds_component(num: &str) -> Option<Duration> {
    match num.split_once('.') {
        None => Duration::try_seconds(parse_int_component(num)?),
        Some((whole, frac)) => {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let secs = Duration::try_seconds(parse_int_component(whole)?)?;
            let nanos: i64 = format!("{:0<9}", frac).parse().ok()?;
            secs.checked_add(&Duration::nanoseconds(nanos))
        }
    }
}
