//! The per-bucket prefix tree: a nested-directory index answering `List`
//! queries with S3-style `CommonPrefixes` semantics.
//!
//! Ported line-for-line from `prefixtree.go` in the original Go service.
//! Locking is the caller's responsibility (see `kv::bucket::BucketState`);
//! every function here assumes exclusive or shared access to the whole
//! tree has already been acquired, matching the per-bucket `RwLock` in
//! `spec.md` §4.4.1 and §5.

use std::collections::HashMap;

use crate::model::{Object, ObjectId};

pub const ROOT_NAME: &str = "root";

/// A single directory node. Root is named [`ROOT_NAME`].
///
/// Invariants (spec.md §3.2):
/// 1. An object's full key path is mirrored in every ancestor directory's
///    `subtree_objects`, and in exactly one descendant's `own_objects`.
/// 2. Empty interior directories are left in place after deletion — they
///    are benign for semantics and simplify concurrent walks (this is
///    intentional, not a bug: see `spec.md` §9 open question #4).
#[derive(Debug, Default)]
pub struct Directory {
    pub name: String,
    pub own_objects: HashMap<String, Object>,
    pub subtree_objects: HashMap<String, Object>,
    pub children: HashMap<String, Directory>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            own_objects: HashMap::new(),
            subtree_objects: HashMap::new(),
            children: HashMap::new(),
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_NAME)
    }
}

/// Create or overwrite (last-write-wins) an object at its full path.
///
/// Walks from `root`, creating any missing intermediate directory, and
/// inserts the object into `subtree_objects` of every directory on the
/// path plus `own_objects` of the terminal directory.
pub fn traverse_create(root: &mut Directory, object: Object) {
    let segments: Vec<String> = object
        .id
        .segments()
        .into_iter()
        .map(str::to_string)
        .collect();
    let full_key = object.id.key.clone();

    root.subtree_objects.insert(full_key.clone(), object.clone());
    let mut current = root;
    // Descend through every segment except the last (which names the
    // terminal directory's own object, not a child directory).
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current = current
            .children
            .entry(segment.clone())
            .or_insert_with(|| Directory::new(segment.clone()));
        current.subtree_objects.insert(full_key.clone(), object.clone());
    }
    current.own_objects.insert(full_key, object);
}

/// Traverse to the directory that would contain `id`'s own object,
/// without mutating the tree. Returns `None` if any intermediate segment
/// is missing.
fn descend<'a>(root: &'a Directory, segments: &[String]) -> Option<&'a Directory> {
    let mut current = root;
    for segment in segments {
        current = current.children.get(segment)?;
    }
    Some(current)
}

/// Look up an object by its full id. Returns `None` if the object does not
/// exist (either an intermediate directory is missing, or the terminal
/// directory has no such own object).
pub fn lookup<'a>(root: &'a Directory, id: &ObjectId) -> Option<&'a Object> {
    let segments: Vec<String> = id.segments().into_iter().map(str::to_string).collect();
    let parent_segments = &segments[..segments.len().saturating_sub(1)];
    let terminal = descend(root, parent_segments)?;
    terminal.own_objects.get(&id.key)
}

/// Remove an object by its full id. No-op (beyond partial, already-applied
/// removals) if the object is not present.
pub fn traverse_delete(root: &mut Directory, id: &ObjectId) {
    let segments: Vec<String> = id.segments().into_iter().map(str::to_string).collect();
    root.subtree_objects.remove(&id.key);
    let mut current = root;
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        match current.children.get_mut(segment) {
            Some(child) => current = child,
            None => return,
        }
        current.subtree_objects.remove(&id.key);
    }
    current.own_objects.remove(&id.key);
}

/// Delete every object whose key begins with `prefix_id.key`, returning
/// the objects that were deleted (for publication fan-out).
///
/// First collects the full match set from the directory named by the
/// prefix (`subtree_objects`), then walks from the root removing each
/// matched key from every directory along its path — matching
/// `traverseDeleteObjectPrefix` in `prefixtree.go`, including its
/// iterate-then-delete order (the original's persistent-mode variant in
/// one draft skipped the collection step; this reimplementation always
/// collects first, per `spec.md` §9 open question #3).
pub fn traverse_delete_prefix(root: &mut Directory, prefix_id: &ObjectId) -> Vec<Object> {
    let segments: Vec<String> = prefix_id
        .segments()
        .into_iter()
        .map(str::to_string)
        .collect();

    let deleted: Vec<Object> = match descend(root, &segments) {
        Some(dir) => dir.subtree_objects.values().cloned().collect(),
        None => return Vec::new(),
    };

    for object in &deleted {
        root.own_objects.remove(&object.id.key);
        root.subtree_objects.remove(&object.id.key);
    }
    let mut current = root;
    for segment in &segments {
        current = match current.children.get_mut(segment) {
            Some(child) => child,
            None => break,
        };
        for object in &deleted {
            current.own_objects.remove(&object.id.key);
            current.subtree_objects.remove(&object.id.key);
        }
    }

    deleted
}

/// Result of a `List` query: matched objects plus common (child-directory)
/// prefixes, each suffixed with the delimiter.
#[derive(Debug, Default, Clone)]
pub struct ListResult {
    pub results: Vec<Object>,
    pub common_prefixes: Vec<String>,
}

/// `List` without a delimiter: every object in the subtree named by
/// `prefix_id`. `common_prefixes` is always empty.
pub fn list_no_delimiter(root: &Directory, prefix_id: &ObjectId) -> ListResult {
    let segments: Vec<String> = prefix_id
        .segments()
        .into_iter()
        .map(str::to_string)
        .collect();
    match descend(root, &segments) {
        Some(dir) => ListResult {
            results: dir.subtree_objects.values().cloned().collect(),
            common_prefixes: Vec::new(),
        },
        None => ListResult::default(),
    }
}

/// `List` with the `/` delimiter. Matches `listObjects`/`traverseListObjects`
/// in `prefixtree.go`: an empty prefix lists the root's own objects plus
/// immediate child names; a non-empty prefix traverses to the named
/// directory and returns its full subtree as `results`, with each child's
/// full path (accumulated while descending) as a common prefix.
pub fn list_with_delimiter(root: &Directory, prefix_id: &ObjectId) -> ListResult {
    if prefix_id.key.is_empty() {
        return ListResult {
            results: root.own_objects.values().cloned().collect(),
            common_prefixes: root
                .children
                .keys()
                .map(|name| format!("{name}/"))
                .collect(),
        };
    }

    let segments: Vec<String> = prefix_id
        .segments()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut current = root;
    let mut longest_path = String::new();
    for segment in &segments {
        current = match current.children.get(segment) {
            Some(child) => child,
            None => return ListResult::default(),
        };
        longest_path.push_str(&current.name);
        longest_path.push('/');
    }

    ListResult {
        results: current.subtree_objects.values().cloned().collect(),
        common_prefixes: current
            .children
            .keys()
            .map(|name| format!("{longest_path}{name}/"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectInfo;

    fn obj(bucket: &str, key: &str) -> Object {
        Object {
            id: ObjectId::new(bucket, key),
            info: ObjectInfo {
                location: format!("geds://{key}"),
                size: 4000,
                sealed_offset: 4000,
            },
        }
    }

    fn scenario_b_tree() -> Directory {
        let mut root = Directory::root();
        for (bucket, key) in [
            ("bucket2", "sample.jpg"),
            ("bucket2", "photos/2006/january/sample.jpg"),
            ("bucket2", "photos/2006/february/sample2.jpg"),
            ("bucket2", "photos/2006/february/sample3.jpg"),
            ("bucket2", "photos/2006/february/sample4.jpg"),
        ] {
            traverse_create(&mut root, obj(bucket, key));
        }
        root
    }

    #[test]
    fn lookup_finds_created_object_and_misses_after_delete() {
        let mut root = Directory::root();
        let o = obj("b", "a/b/c.txt");
        traverse_create(&mut root, o.clone());
        assert_eq!(lookup(&root, &o.id), Some(&o));
        traverse_delete(&mut root, &o.id);
        assert_eq!(lookup(&root, &o.id), None);
    }

    #[test]
    fn update_is_idempotent_last_write_wins() {
        let mut root = Directory::root();
        let id = ObjectId::new("b", "k");
        traverse_create(
            &mut root,
            Object {
                id: id.clone(),
                info: ObjectInfo {
                    location: "geds://v1".into(),
                    size: 1,
                    sealed_offset: 1,
                },
            },
        );
        traverse_create(
            &mut root,
            Object {
                id: id.clone(),
                info: ObjectInfo {
                    location: "geds://v2".into(),
                    size: 2,
                    sealed_offset: 2,
                },
            },
        );
        assert_eq!(lookup(&root, &id).unwrap().info.location, "geds://v2");
        assert_eq!(root.subtree_objects.len(), 1);
    }

    // Scenario B, spec.md §8.
    #[test]
    fn list_no_delimiter_returns_whole_subtree() {
        let root = scenario_b_tree();
        let result = list_no_delimiter(&root, &ObjectId::new("bucket2", "photos/2006/february/"));
        assert_eq!(result.results.len(), 3);
        assert!(result.common_prefixes.is_empty());
    }

    #[test]
    fn list_with_delimiter_at_root() {
        let root = scenario_b_tree();
        let result = list_with_delimiter(&root, &ObjectId::new("bucket2", ""));
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].id.key, "sample.jpg");
        assert_eq!(result.common_prefixes, vec!["photos/".to_string()]);
    }

    #[test]
    fn list_with_delimiter_nested_prefix() {
        let root = scenario_b_tree();
        let result = list_with_delimiter(&root, &ObjectId::new("bucket2", "photos/2006/"));
        assert_eq!(result.results.len(), 4);
        let mut prefixes = result.common_prefixes.clone();
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![
                "photos/2006/february/".to_string(),
                "photos/2006/january/".to_string(),
            ]
        );
    }

    // Scenario C, spec.md §8.
    #[test]
    fn delete_prefix_removes_matching_objects_only() {
        let mut root = scenario_b_tree();
        let deleted = traverse_delete_prefix(
            &mut root,
            &ObjectId::new("bucket2", "photos/2006/february/"),
        );
        assert_eq!(deleted.len(), 3);
        let result = list_no_delimiter(&root, &ObjectId::new("bucket2", "photos/2006/"));
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].id.key, "photos/2006/january/sample.jpg");
    }

    #[test]
    fn empty_interior_directories_are_left_in_place_after_delete() {
        let mut root = Directory::root();
        let o = obj("b", "a/b/c.txt");
        traverse_create(&mut root, o.clone());
        traverse_delete(&mut root, &o.id);
        assert!(root.children.contains_key("a"));
        assert!(root.children["a"].children.contains_key("b"));
    }
}
