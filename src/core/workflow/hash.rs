// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Deterministic identifiers for flattened configuration rows

use crate::core::record::DELIMITER;
use sha2::{Digest, Sha256};

const HASH_SEED: i64 = 1_125_899_906_842_597;
const HASH_MULTIPLIER: i64 = 31;

/// 64-bit polynomial hash of a string
///
/// Iterates UTF-16 code units so ids stay identical to the ones already
/// loaded into the warehouse.
pub fn string_hash(value: &str) -> i64 {
    value.encode_utf16().fold(HASH_SEED, |h, unit| {
        h.wrapping_mul(HASH_MULTIPLIER).wrapping_add(i64::from(unit))
    })
}

/// Hash of several fields, each prefixed with the delimiter
///
/// # Examples
///
/// ```
/// use datawh::core::workflow::hash::stable_hash;
///
/// let a = stable_hash(&["Exome", "1.0"]);
/// assert_eq!(a, stable_hash(&["Exome", "1.0"]));
/// assert_ne!(a, stable_hash(&["Exome1", ".0"]));
/// ```
pub fn stable_hash<S: AsRef<str>>(fields: &[S]) -> i64 {
    let mut joined = String::new();
    for field in fields {
        joined.push(DELIMITER);
        joined.push_str(field.as_ref());
    }
    string_hash(&joined)
}

/// SHA-256 over ids in ascending order, hex encoded
pub fn aggregate_hash(ids: impl IntoIterator<Item = i64>) -> String {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.to_string().as_bytes());
        hasher.update(b"\n");
    }
    let result = hasher.finalize();
    format!("{result:x}")
}
