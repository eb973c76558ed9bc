//! # Identity Bridge Utilities
//!
//! Deterministic cache fingerprints, identity key generation and identifier
//! validation.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use uuid::Uuid;

static SQL_IDENTIFIER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex is valid")
});

/// Canonical JSON text for `args`.
///
/// Object keys come out sorted (`serde_json::Map` is ordered), so two
/// argument lists that differ only in map insertion order canonicalize the
/// same.
pub fn canonical_json<T: Serialize + ?Sized>(args: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(args)?;
    serde_json::to_string(&value)
}

/// Deterministic fingerprint of an operation name and its arguments.
///
/// ```
/// use utils::fingerprint;
///
/// let a = fingerprint("search", &("alp", 10, 0)).unwrap();
/// let b = fingerprint("search", &("alp", 10, 0)).unwrap();
/// assert_eq!(a, b);
/// assert!(a.starts_with("search:"));
/// ```
pub fn fingerprint<T: Serialize + ?Sized>(
    operation: &str,
    args: &T
) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(args)?;
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());
    Ok(format!("{}:{}", operation, &hash[..32]))
}

/// Generate an opaque 28-character identity key.
#[must_use]
pub fn generate_identity_key() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..28].to_string()
}

/// Whether `name` is safe to splice into SQL as a table or column name.
#[must_use]
pub fn is_valid_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}
