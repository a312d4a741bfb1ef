// Utility helpers for parsing, text normalization and number formatting.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports from different locales.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (other than an
///   exponent marker).
/// - Understands both `1,234.5` and `1.234,5`; a lone comma is treated as the
///   decimal separator (`45,07` is `45.07`).
/// - Returns `None` for anything that cannot be safely parsed or is not finite.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace() && *c != '\'').collect();

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();
    let cleaned = match (commas, dots) {
        (0, _) if dots > 1 => s.replace('.', ""),
        (0, _) => s,
        (1, 0) => s.replace(',', "."),
        (_, 0) => s.replace(',', ""),
        _ => {
            // Both separators present: whichever comes last is the decimal one.
            let last_comma = s.rfind(',').unwrap_or(0);
            let last_dot = s.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce a raw counter cell into a non-negative number. Missing, garbage or
/// negative values become `0.0`; aggregation never stops on a bad cell.
pub fn coerce_counter(s: Option<&str>) -> f64 {
    match parse_f64_safe(s) {
        Some(v) if v > 0.0 => v,
        _ => 0.0,
    }
}

/// Lowercase, strip diacritics, collapse inner whitespace and trim.
///
/// `"  Milano   Centrale "` and `"MILANO CENTRALE"` normalize to the same key,
/// as do `"Forlì"` and `"Forli"`.
pub fn normalize_text(s: &str) -> String {
    let ascii = unidecode::unidecode(s).to_lowercase();
    ascii.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the `YYYY-MM` prefix of a month or day label, if it has one.
pub fn month_of(period: &str) -> &str {
    let p = period.trim();
    p.get(..7).unwrap_or(p)
}

/// Parse a month bound written as `YYYY-MM` (or a full day), returning the
/// zero-padded `YYYY-MM` form so that it compares correctly with row labels.
pub fn parse_month(s: &str) -> Option<String> {
    let mut parts = s.trim().splitn(3, '-');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let d = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(d.format("%Y-%m").to_string())
}

/// Percentage of `part` over `total`, `0.0` when `total` is zero.
pub fn pct(part: f64, total: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        (part / total) * 100.0
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - Italian thousands/decimal separators (e.g., `1.234.567,89`).
    if !n.is_finite() {
        return String::new();
    }
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::it);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push_str(Locale::it.decimal());
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
    n.to_formatted_string(&Locale::it)
}

/// Round and format a counter (stored as `f64`) as an Italian integer.
pub fn format_count(n: f64) -> String {
    if !n.is_finite() {
        return String::new();
    }
    format_int(n.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_blank() {
        assert_eq!(parse_f64_safe(Some("42")), Some(42.0));
        assert_eq!(parse_f64_safe(Some("  7.5 ")), Some(7.5));
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(Some("   ")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn test_parse_comma_decimal() {
        assert_eq!(parse_f64_safe(Some(" 45,4642 ")), Some(45.4642));
        assert_eq!(parse_f64_safe(Some("1.234,5")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("1,234.5")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("1.234.567")), Some(1234567.0));
    }

    #[test]
    fn test_parse_rejects_text_and_non_finite() {
        assert_eq!(parse_f64_safe(Some("abc")), None);
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(Some("inf")), None);
        assert_eq!(parse_f64_safe(Some("1e3")), Some(1000.0));
    }

    #[test]
    fn test_coerce_counter_is_non_negative() {
        assert_eq!(coerce_counter(Some("-3")), 0.0);
        assert_eq!(coerce_counter(Some("n/d")), 0.0);
        assert_eq!(coerce_counter(None), 0.0);
        assert_eq!(coerce_counter(Some("12")), 12.0);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Milano   Centrale "), "milano centrale");
        assert_eq!(normalize_text("Forlì"), "forli");
        assert_eq!(normalize_text("FORLI'"), "forli'");
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(month_of("2023-06-14"), "2023-06");
        assert_eq!(month_of("2023-06"), "2023-06");
        assert_eq!(month_of("23"), "23");
        assert_eq!(parse_month("2023-13"), None);
        assert_eq!(parse_month("2023-02-28"), Some("2023-02".to_string()));
        assert_eq!(parse_month("giugno"), None);
    }

    #[test]
    fn test_parse_month_pads_single_digit_month() {
        assert_eq!(parse_month("2023-1"), Some("2023-01".to_string()));
        assert_eq!(parse_month(" 2023-9 "), Some("2023-09".to_string()));
        assert_eq!(parse_month("2023-3-15"), Some("2023-03".to_string()));
    }

    #[test]
    fn test_pct_zero_total() {
        assert_eq!(pct(5.0, 0.0), 0.0);
        assert_eq!(pct(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_format_number_italian() {
        assert_eq!(format_number(1234567.891, 2), "1.234.567,89");
        assert_eq!(format_number(-12.5, 1), "-12,5");
        assert_eq!(format_count(9855.4), "9.855");
    }
}
