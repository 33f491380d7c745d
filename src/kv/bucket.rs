//! A single bucket's in-memory index: a prefix tree behind its own lock.
//!
//! Grounded on `keyvaluestore_structs.go`'s `Bucket` struct (tree + mutex)
//! and `spec.md` §4.4.1 ("each Bucket carries its own read/write lock
//! guarding its tree"). No lock here is ever held across an `.await` —
//! every method is synchronous — so `std::sync::RwLock` is correct and
//! cheaper than an async-aware lock (`spec.md` §5).

use std::sync::RwLock;

use crate::kv::prefixtree::{self, Directory, ListResult};
use crate::model::{Object, ObjectId};

pub struct BucketContainer {
    tree: RwLock<Directory>,
}

impl BucketContainer {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Directory::root()),
        }
    }

    /// Create or overwrite; there is no create-vs-update distinction in
    /// tree state (`spec.md` §4.4.4), last write wins.
    pub fn put_object(&self, object: Object) {
        let mut tree = self.tree.write().expect("bucket tree lock poisoned");
        prefixtree::traverse_create(&mut tree, object);
    }

    pub fn lookup_object(&self, id: &ObjectId) -> Option<Object> {
        let tree = self.tree.read().expect("bucket tree lock poisoned");
        prefixtree::lookup(&tree, id).cloned()
    }

    pub fn delete_object(&self, id: &ObjectId) {
        let mut tree = self.tree.write().expect("bucket tree lock poisoned");
        prefixtree::traverse_delete(&mut tree, id);
    }

    pub fn delete_object_prefix(&self, prefix_id: &ObjectId) -> Vec<Object> {
        let mut tree = self.tree.write().expect("bucket tree lock poisoned");
        prefixtree::traverse_delete_prefix(&mut tree, prefix_id)
    }

    pub fn list_objects(&self, prefix_id: &ObjectId, delimiter: Option<char>) -> ListResult {
        let tree = self.tree.read().expect("bucket tree lock poisoned");
        match delimiter {
            None => prefixtree::list_no_delimiter(&tree, prefix_id),
            Some('/') => prefixtree::list_with_delimiter(&tree, prefix_id),
            // Any delimiter other than '/' is unsupported: empty response,
            // not an error (spec.md §9 open question #5, kept as-is).
            Some(_) => ListResult::default(),
        }
    }
}

impl Default for BucketContainer {
    fn default() -> Self {
        Self::new()
    }
}
