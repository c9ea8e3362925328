//! Canonical JSON encoding used to compute `args_sha256`.
//!
//! Uses `serde_jcs` (RFC 8785 JSON Canonicalization Scheme), which
//! guarantees lexicographically sorted object keys, no insignificant
//! whitespace, and a stable number representation — so the arg hash is a
//! deterministic function of the arguments alone, independent of key order.

use serde_json::Value;

/// Canonicalize `args` (substituting `Value::Null` for an absent value) and
/// return the RFC 8785 byte encoding.
pub fn canonicalize_args(args: Option<&Value>) -> Vec<u8> {
    let value = args.cloned().unwrap_or(Value::Null);
    // serde_jcs only fails on values it cannot represent (e.g. NaN floats,
    // which serde_json itself refuses to produce from valid JSON input), so
    // a parsed argument object can never trigger this path in practice.
    serde_jcs::to_vec(&value).unwrap_or_else(|_| value.to_string().into_bytes())
}
