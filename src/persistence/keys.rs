//! Composite key encoding for the Object keyspace.
//!
//! The object keyspace is keyed by `bucket + "/" + key`, but the bucket
//! name is length-prefixed first so that a bucket name containing `/`
//! can never be confused with a key-prefix boundary — a case the
//! original Go implementation's plain string concatenation does not
//! guard against. The scheme mirrors `tikv_key_from_3_chunk` in
//! `rust-libs/db/src/types.rs` of the `muprotocol-mu` pack.

/// Encodes `(bucket, key)` as `[bucket_len: u8][bucket][key]`.
pub fn object_key(bucket: &str, key: &str) -> Vec<u8> {
    assert!(bucket.len() <= u8::MAX as usize, "bucket name too long");
    let mut out = Vec::with_capacity(1 + bucket.len() + key.len());
    out.push(bucket.len() as u8);
    out.extend_from_slice(bucket.as_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

/// Encodes the prefix `[bucket_len: u8][bucket][key_prefix]` used to scan
/// every object in `bucket` whose key begins with `key_prefix`.
pub fn object_key_prefix(bucket: &str, key_prefix: &str) -> Vec<u8> {
    object_key(bucket, key_prefix)
}

/// Decodes a key produced by [`object_key`] back into `(bucket, key)`.
pub fn decode_object_key(raw: &[u8]) -> Option<(String, String)> {
    let bucket_len = *raw.first()? as usize;
    if raw.len() < 1 + bucket_len {
        return None;
    }
    let bucket = String::from_utf8(raw[1..1 + bucket_len].to_vec()).ok()?;
    let key = String::from_utf8(raw[1 + bucket_len..].to_vec()).ok()?;
    Some((bucket, key))
}

/// Smallest key that is lexicographically greater than every key prefixed
/// by `prefix`, or `None` if `prefix` is all-`0xFF` (unbounded above).
/// Ported from `subset_range` in `rust-libs/db/src/types.rs`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    if prefix.is_empty() {
        return None;
    }
    let mut upper = Vec::with_capacity(prefix.len());
    let mut carried = true;
    for byte in prefix.iter().rev() {
        if carried {
            if *byte == u8::MAX {
                upper.push(0);
            } else {
                upper.push(byte + 1);
                carried = false;
            }
        } else {
            upper.push(*byte);
        }
    }
    if carried {
        None
    } else {
        upper.reverse();
        Some(upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bucket_and_key() {
        let k = object_key("bucket1", "photos/2006/sample.jpg");
        assert_eq!(
            decode_object_key(&k),
            Some(("bucket1".to_string(), "photos/2006/sample.jpg".to_string()))
        );
    }

    #[test]
    fn bucket_containing_delimiter_does_not_collide() {
        // Without length-prefixing, bucket="a/b" key="c" and bucket="a" key="b/c"
        // would both encode to the same "a/b/c" string.
        let k1 = object_key("a/b", "c");
        let k2 = object_key("a", "b/c");
        assert_ne!(k1, k2);
    }

    #[test]
    fn prefix_upper_bound_increments_last_non_max_byte() {
        assert_eq!(prefix_upper_bound(&[0, 0, 0, 1]), Some(vec![0, 0, 0, 2]));
        assert_eq!(
            prefix_upper_bound(&[0, 255, 255, 255]),
            Some(vec![1, 0, 0, 0])
        );
        assert_eq!(prefix_upper_bound(&[255, 255, 255, 255]), None);
        assert_eq!(prefix_upper_bound(&[]), None);
    }
}
