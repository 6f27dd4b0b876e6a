// Utility helpers for parsing and basic statistics.
//
// This module centralizes the forgiving CSV cell handling and the small
// numeric helpers so the rest of the code can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Parse an integer cell.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Accepts a float spelling with no fractional part (`"3.0"`), which some
///   exports produce for integer columns.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a 0/1 flag cell. `true`/`false` spellings are accepted too.
pub fn parse_flag_safe(s: Option<&str>) -> Option<bool> {
    let s = s?.trim();
    match s.to_ascii_lowercase().as_str() {
        "true" => return Some(true),
        "false" => return Some(false),
        _ => {}
    }
    match parse_i64_safe(Some(s))? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

pub fn is_blank(s: Option<&str>) -> bool {
    s.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Arithmetic mean; `None` for an empty slice so callers never divide by zero.
pub fn average(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn median(v: Vec<f64>) -> Option<f64> {
    let mut v = v;
    sort_floats(&mut v);
    quantile_sorted(&v, 0.5)
}

/// Quantile of an already sorted slice using linear interpolation between
/// the two closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn sort_floats(v: &mut [f64]) {
    // Use `partial_cmp` and fall back to equality if either side is NaN.
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

pub fn round_to(v: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (v * factor).round() / factor
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    if !n.is_finite() {
        return "n/a".to_string();
    }
    let s = format!("{:.*}", decimals, n.abs());
    // `-0.00` prints as `0.00`
    let neg = n.is_sign_negative() && s.chars().any(|c| c != '0' && c != '.');
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Upper-case the first letter of every alphabetic run and lower-case the
/// rest (`"sales & marketing"` -> `"Sales & Marketing"`, `"m"` -> `"M"`).
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
