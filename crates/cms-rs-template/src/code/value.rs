//! Loose value semantics for the inline-code language.
//!
//! Values are plain [`serde_json::Value`]s. This module supplies the
//! conversions the language needs on top of them: string rendering, numeric
//! coercion, loose equality and ordering.

use std::cmp::Ordering;

use serde_json::Value;

pub use cms_rs_core::options::is_truthy;

/// Renders a value the way `echo` prints it.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => "Array".to_string(),
    }
}

/// Formats a float with 14 significant digits and no trailing zeros.
pub fn format_float(f: f64) -> String {
    if !f.is_finite() {
        return if f.is_nan() { "NAN" } else if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    #[allow(clippy::cast_possible_truncation)]
    let magnitude = f.abs().log10().floor() as i32 + 1;
    let decimals = usize::try_from((14 - magnitude).clamp(0, 14)).unwrap_or(0);
    let formatted = format!("{f:.decimals$}");
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Parses a fully numeric string (surrounding whitespace allowed).
pub fn numeric_str(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// The leading numeric prefix of a string, or zero.
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        end = i + 1;
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Numeric coercion.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_number(s),
        Value::Array(items) => f64::from(u8::from(!items.is_empty())),
        Value::Object(map) => f64::from(u8::from(!map.is_empty())),
    }
}

/// Integer coercion, used where a whole number is required.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null => Some(0),
        _ => None,
    }
}

/// Builds a number value, keeping integers integral.
#[allow(clippy::cast_possible_truncation)]
pub fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

/// The string used when a value serves as an array key.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => to_display(other),
    }
}

/// `==`
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other),
        (Value::Bool(x), other) | (other, Value::Bool(x)) => is_truthy(other) == *x,
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::String(x), Value::String(y)) => match (numeric_str(x), numeric_str(y)) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            let n = if let Value::Number(_) = a { a } else { b };
            numeric_str(s).map_or_else(|| to_display(n) == *s, |f| f == to_number(n))
        }
        _ => a == b,
    }
}

/// `===`
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.is_f64() == y.is_f64() && to_number(a) == to_number(b)
        }
        _ => a == b,
    }
}

/// Ordering for `<`, `>`, `<=`, `>=`: numeric when both sides are numeric,
/// byte-wise for two non-numeric strings.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        if numeric_str(x).is_none() || numeric_str(y).is_none() {
            return x.cmp(y);
        }
    }
    to_number(a)
        .partial_cmp(&to_number(b))
        .unwrap_or(Ordering::Equal)
}

/// Escapes text for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a number with grouped thousands.
pub fn number_format(n: f64, decimals: usize, point: &str, separator: &str) -> String {
    let formatted = format!("{:.decimals$}", n.abs());
    let (int_part, frac_part) = formatted
        .split_once('.')
        .map_or((formatted.as_str(), None), |(i, f)| (i, Some(f)));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if n < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push_str(point);
        out.push_str(frac);
    }
    out
}

/// Counts the elements of an array-like value.
pub fn count(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(to_display(&json!(null)), "");
        assert_eq!(to_display(&json!(true)), "1");
        assert_eq!(to_display(&json!(false)), "");
        assert_eq!(to_display(&json!(42)), "42");
        assert_eq!(to_display(&json!(2.5)), "2.5");
        assert_eq!(to_display(&json!([1])), "Array");
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(-1.25), "-1.25");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!("12abc")), 12.0);
        assert_eq!(to_number(&json!(" 3.5")), 3.5);
        assert_eq!(to_number(&json!("abc")), 0.0);
        assert_eq!(to_number(&json!(true)), 1.0);
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(&json!("1"), &json!(1)));
        assert!(loose_eq(&json!("1.0"), &json!("1")));
        assert!(loose_eq(&json!(null), &json!(false)));
        assert!(loose_eq(&json!(0), &json!(null)));
        assert!(!loose_eq(&json!("abc"), &json!(0)));
        assert!(loose_eq(&json!("abc"), &json!(true)));
        assert!(!loose_eq(&json!("a"), &json!("b")));
    }

    #[test]
    fn test_strict_equality() {
        assert!(strict_eq(&json!(1), &json!(1)));
        assert!(!strict_eq(&json!(1), &json!(1.0)));
        assert!(!strict_eq(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!(2), &json!("10")), Ordering::Less);
        assert_eq!(compare(&json!("apple"), &json!("banana")), Ordering::Less);
        assert_eq!(compare(&json!("10"), &json!("9")), Ordering::Greater);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number_format(1_234_567.891, 2, ".", ","), "1,234,567.89");
        assert_eq!(number_format(999.0, 0, ".", ","), "999");
        assert_eq!(number_format(-1234.5, 1, ",", " "), "-1 234,5");
        assert_eq!(number_format(-0.001, 2, ".", ","), "0.00");
    }
}
