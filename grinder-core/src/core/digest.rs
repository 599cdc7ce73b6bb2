//! Canonical JSON and content digests
//!
//! Every artifact that feeds a digest or SHA-256 check is serialized the
//! same way: keys sorted (serde_json's map is ordered), decimals rendered
//! as strings, compact separators for digest input, 2-space indent plus a
//! single trailing newline for persisted files. Two independent runs over
//! the same input must produce byte-identical output.

use rust_decimal::Decimal;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Compact canonical form used as digest input: sorted keys, no spaces.
pub fn canonical_compact(value: &Value) -> String {
    // serde_json's Map is BTreeMap-backed, so key order is already sorted.
    value.to_string()
}

/// Pretty canonical form for persisted artifacts: sorted keys, 2-space
/// indent, single trailing newline.
pub fn canonical_pretty(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(value, &mut ser).expect("JSON value serialization is infallible");
    let mut out = String::from_utf8(buf).expect("serde_json emits UTF-8");
    out.push('\n');
    out
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 16-char hex digest over the compact canonical form. This is the
/// regression oracle for paper runs.
pub fn short_digest(value: &Value) -> String {
    let content = canonical_compact(value);
    sha256_hex(content.as_bytes())[..16].to_string()
}

/// Decimal rendered as a JSON string, preserving scale exactly.
pub fn dec_value(d: &Decimal) -> Value {
    Value::String(d.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_compact_sorts_keys() {
        let value = json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        assert_eq!(
            canonical_compact(&value),
            r#"{"alpha":2,"mid":{"a":2,"b":1},"zeta":1}"#
        );
    }

    #[test]
    fn test_pretty_has_trailing_newline_and_indent() {
        let value = json!({"b": 1, "a": [1, 2]});
        let out = canonical_pretty(&value);
        assert!(out.ends_with('\n'));
        assert!(!out.ends_with("\n\n"));
        assert!(out.contains("\n  \"a\": ["));
        // "a" sorts before "b"
        assert!(out.find("\"a\"").unwrap() < out.find("\"b\"").unwrap());
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_short_digest_is_stable_16_hex() {
        let value = json!([{"ts": 1, "symbol": "BTCUSDT"}]);
        let a = short_digest(&value);
        let b = short_digest(&value);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_dec_value_round_trips_scale() {
        assert_eq!(dec_value(&dec!(1.50)), json!("1.50"));
        assert_eq!(dec_value(&dec!(100)), json!("100"));
    }
}
