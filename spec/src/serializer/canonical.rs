//! Canonical encoding for identity signatures.
//!
//! Produces one byte string per JSON value, independent of any JSON library's
//! key ordering or float formatting, so any reimplementation hashes the same
//! inputs to the same digest:
//!
//! - objects: keys sorted by UTF-8 byte order, `{"k":v,...}`
//! - arrays: `[v,...]`
//! - no whitespace anywhere
//! - numbers: integral values (|x| < 2^53) as plain integers, everything
//!   else as the shortest round-trip decimal without exponent
//! - strings: `"` and `\` escaped, control characters as `\b \f \n \r \t`
//!   or `\u00XX`, everything else emitted as raw UTF-8

use std::fmt::Write as FmtWrite;

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Encodes `value` canonically.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut out = String::with_capacity(128);
    write_value(&mut out, value);
    out
}

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Encodes `value` canonically and returns its SHA-256 hex digest.
#[must_use]
pub fn digest(value: &Value) -> String {
    sha256_hex(encode(value).as_bytes())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_value(out, v);
                }
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
            // -0.0 collapses to 0
            let _ = write!(out, "{}", f as i64);
        } else {
            let _ = write!(out, "{f}");
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_sorted_without_whitespace() {
        let v = json!({"taxon_id": "tx:p", "part_id": "part:fruit", "steps": []});
        assert_eq!(
            encode(&v),
            r#"{"part_id":"part:fruit","steps":[],"taxon_id":"tx:p"}"#
        );
    }

    #[test]
    fn integral_floats_encode_as_integers() {
        assert_eq!(encode(&json!(140.0)), "140");
        assert_eq!(encode(&json!(140)), "140");
        assert_eq!(encode(&json!(-0.0)), "0");
        assert_eq!(encode(&json!(2.5)), "2.5");
        assert_eq!(encode(&json!(0.1)), "0.1");
    }

    #[test]
    fn strings_escape_minimally() {
        assert_eq!(encode(&json!("a\"b\\c\nd\u{01}é")), "\"a\\\"b\\\\c\\nd\\u0001é\"");
    }

    #[test]
    fn key_order_does_not_change_digest() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"b":2,"a":3}}"#).expect("json");
        let b: Value = serde_json::from_str(r#"{"y":{"a":3,"b":2},"x":1}"#).expect("json");
        assert_eq!(digest(&a), digest(&b));
        assert_eq!(digest(&a).len(), 64);
    }
}
