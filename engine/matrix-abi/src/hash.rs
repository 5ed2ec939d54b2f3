use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_string;
use crate::error::MatrixResult;
use crate::serde_support::to_value;
use crate::value::Value;

/// Length in hex characters of every digest produced here.
pub const DIGEST_HEX_LEN: usize = 64;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 over the canonical encoding of `value`.
pub fn canonical_digest<T>(value: &T) -> MatrixResult<String>
where
    T: Serialize + ?Sized,
{
    let value = to_value(value)?;
    Ok(value_digest(&value))
}

/// SHA-256 over the canonical encoding of `{namespace: value}`.
///
/// Component hashes are namespaced so that two components with identical
/// content never share an identity.
pub fn namespaced_digest<T>(namespace: &str, value: &T) -> MatrixResult<String>
where
    T: Serialize + ?Sized,
{
    let inner = to_value(value)?;
    let mut wrapper = BTreeMap::new();
    wrapper.insert(namespace.to_string(), inner);
    Ok(value_digest(&Value::Map(wrapper)))
}

pub fn value_digest(value: &Value) -> String {
    sha256_hex(to_canonical_string(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{canonical_digest, namespaced_digest, sha256_hex, DIGEST_HEX_LEN};

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_ignores_key_order() {
        let left = canonical_digest(&json!({"b": 1, "a": 2})).expect("digest");
        let right = canonical_digest(&json!({"a": 2, "b": 1})).expect("digest");
        assert_eq!(left, right);
        assert_eq!(left.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn namespace_changes_identity() {
        let plain = canonical_digest(&json!(["idb"])).expect("digest");
        let wrapped = namespaced_digest("plugins", &json!(["idb"])).expect("digest");
        let explicit = canonical_digest(&json!({"plugins": ["idb"]})).expect("digest");
        assert_ne!(plain, wrapped);
        assert_eq!(wrapped, explicit);
    }
}
