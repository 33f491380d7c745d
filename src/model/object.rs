//! Represents an object descriptor — location, size and sealed offset of a
//! blob that lives in an external object store. The metadata service never
//! touches the bytes themselves.

use serde::{Deserialize, Serialize};

pub const KEY_DELIMITER: char = '/';

/// Globally identifies an object as `(bucket, key)`.
///
/// `key` is a delimiter-delimited path. Leading and trailing delimiters are
/// stripped on construction so that `"/a/b/"`, `"a/b"` and `"a/b/"` all
/// normalize to the same id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub bucket: String,
    pub key: String,
}

impl ObjectId {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: normalize_key(&key.into()),
        }
    }

    /// Splits `key` on [`KEY_DELIMITER`] into an ordered list of segments.
    ///
    /// An empty key (referring to the bucket root) yields an empty list,
    /// matching `split(key)` in the prefix-tree component design.
    pub fn segments(&self) -> Vec<&str> {
        if self.key.is_empty() {
            Vec::new()
        } else {
            self.key.split(KEY_DELIMITER).collect()
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim_matches(KEY_DELIMITER).to_string()
}

/// Location, size and sealed-offset of an object's backing bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub location: String,
    pub size: u64,
    pub sealed_offset: u64,
}

/// An object: its id plus its descriptor info.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Object {
    pub id: ObjectId,
    pub info: ObjectInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_and_trailing_delimiters() {
        assert_eq!(ObjectId::new("b", "/a/b/").key, "a/b");
        assert_eq!(ObjectId::new("b", "a/b").key, "a/b");
        assert_eq!(ObjectId::new("b", "///a///").key, "a");
    }

    #[test]
    fn segments_of_empty_key_is_empty() {
        assert!(ObjectId::new("b", "").segments().is_empty());
        assert!(ObjectId::new("b", "/").segments().is_empty());
    }

    #[test]
    fn segments_split_on_delimiter() {
        assert_eq!(
            ObjectId::new("b", "photos/2006/sample.jpg").segments(),
            vec!["photos", "2006", "sample.jpg"]
        );
    }
}
