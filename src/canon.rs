//! Canonical JSON bytes for metadata digests.
//!
//! Canonical rules:
//! - object keys sorted by UTF-8 byte order (serde_json's default map)
//! - no insignificant whitespace
//! - non-finite floats rejected (enforced by `Scalar`'s serializer)

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("canonical json encode failed: {0}")]
pub struct CanonJsonError(#[from] serde_json::Error);

/// Serialize a value to canonical JSON bytes.
pub fn to_canon_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonJsonError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

pub fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn canon_bytes_are_stable_across_key_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("z", 1);
        a.insert("a", 2);
        let mut b = BTreeMap::new();
        b.insert("a", 2);
        b.insert("z", 1);
        assert_eq!(
            to_canon_json_bytes(&a).unwrap(),
            to_canon_json_bytes(&b).unwrap()
        );
    }

    #[test]
    fn digest_differs_on_content_change() {
        let a = sha256_bytes(&to_canon_json_bytes(&vec![1, 2, 3]).unwrap());
        let b = sha256_bytes(&to_canon_json_bytes(&vec![1, 2, 4]).unwrap());
        assert_ne!(a, b);
    }
}
