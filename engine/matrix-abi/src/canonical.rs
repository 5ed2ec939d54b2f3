//! Deterministic text encoding of canonical values.
//!
//! The output is JSON-shaped and agrees byte for byte with the encoding used
//! by existing JavaScript ABI producers: object keys are ordered by UTF-16 code
//! units, strings use `JSON.stringify` escaping and numbers are rendered with
//! the ECMAScript `Number#toString` algorithm.

use std::cmp::Ordering;
use std::fmt::Write;

use serde::Serialize;

use crate::error::MatrixResult;
use crate::serde_support::to_value;
use crate::value::Value;

/// Render a canonical value.
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical_value(value, &mut out);
    out
}

/// Convert a serializable value into the canonical model and render it.
pub fn canonicalize<T>(value: &T) -> MatrixResult<String>
where
    T: Serialize + ?Sized,
{
    let value = to_value(value)?;
    Ok(to_canonical_string(&value))
}

/// Order two strings by UTF-16 code units, the order JavaScript sorts in.
pub fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// Sort a string list the way JavaScript producers sort allowlists.
pub fn sort_utf16(items: &mut [String]) {
    items.sort_by(|a, b| utf16_cmp(a, b));
}

fn write_canonical_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&format_number(number.into_inner())),
        Value::String(text) => write_string(text, out),
        Value::List(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical_value(item, out);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            let mut ordered: Vec<(&String, &Value)> = entries.iter().collect();
            ordered.sort_by(|a, b| utf16_cmp(a.0, b.0));
            out.push('{');
            for (index, (key, item)) in ordered.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
}

/// Render a finite number the way `Number#toString` does.
pub fn format_number(raw: f64) -> String {
    if raw == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{:e}", raw.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return raw.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return raw.to_string();
    };
    let digits: String = mantissa.chars().filter(|ch| *ch != '.').collect();
    let k = digits.len() as i32;
    let n = exponent + 1;

    let mut out = String::new();
    if raw < 0.0 {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let shown = n - 1;
        out.push('e');
        out.push(if shown < 0 { '-' } else { '+' });
        out.push_str(&shown.abs().to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{canonicalize, format_number};

    #[test]
    fn sorts_object_keys() {
        let rendered = canonicalize(&json!({"b": 1, "a": 2})).expect("canonicalize");
        assert_eq!(rendered, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn nested_structures_keep_list_order() {
        let rendered =
            canonicalize(&json!({"z": [3, 1, 2], "m": {"y": null, "x": true}})).expect("canon");
        assert_eq!(rendered, r#"{"m":{"x":true,"y":null},"z":[3,1,2]}"#);
    }

    #[test]
    fn numbers_follow_ecmascript_rendering() {
        let cases = [
            (1.0, "1"),
            (-2.5, "-2.5"),
            (0.1, "0.1"),
            (123456789.0, "123456789"),
            (1e20, "100000000000000000000"),
            (1e21, "1e+21"),
            (1.5e22, "1.5e+22"),
            (0.000001, "0.000001"),
            (1e-7, "1e-7"),
            (-1.25e-9, "-1.25e-9"),
            (-0.0, "0"),
        ];
        for (raw, expected) in cases {
            assert_eq!(format_number(raw), expected, "rendering {raw}");
        }
    }

    #[test]
    fn strings_use_json_escapes() {
        let rendered = canonicalize("a\"b\\c\n\u{1}é").expect("canonicalize");
        assert_eq!(rendered, "\"a\\\"b\\\\c\\n\\u0001é\"");
    }

    #[test]
    fn keys_order_by_utf16_code_units() {
        // U+FF21 precedes U+1F600 in UTF-8 byte order but follows it in UTF-16.
        let rendered = canonicalize(&json!({"\u{1F600}": 1, "\u{FF21}": 2})).expect("canon");
        assert_eq!(rendered, "{\"\u{1F600}\":1,\"\u{FF21}\":2}");
    }
}
