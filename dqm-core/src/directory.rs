//! The [`Directory`] tree underlying [`crate::storage::Storage`].
//!
//! A directory owns its children (by name, insertion order preserved) and an
//! ordered list of `contents` handles. The link back to the parent is a
//! non-owning [`Weak`] reference, so the tree can never contain a cycle that
//! keeps itself alive: drop every `Arc<Directory<T>>` reachable from the
//! root and the whole subtree is freed, parent pointers notwithstanding.

use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use crate::path::PathSegment;

pub struct Directory<T> {
    name: Option<PathSegment>,
    parent: Weak<Directory<T>>,
    children: RwLock<IndexMap<String, Arc<Directory<T>>>>,
    contents: RwLock<Vec<Arc<T>>>,
}

impl<T> Directory<T> {
    /// Creates a fresh, empty root directory (no name, no parent).
    pub fn new_root() -> Arc<Self> {
        Arc::new(Self {
            name: None,
            parent: Weak::new(),
            children: RwLock::new(IndexMap::new()),
            contents: RwLock::new(Vec::new()),
        })
    }

    fn new_child(name: PathSegment, parent: &Arc<Directory<T>>) -> Arc<Self> {
        Arc::new(Self {
            name: Some(name),
            parent: Arc::downgrade(parent),
            children: RwLock::new(IndexMap::new()),
            contents: RwLock::new(Vec::new()),
        })
    }

    /// The root iff this directory has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.upgrade().is_none()
    }

    pub fn name(&self) -> &str {
        self.name.as_ref().map(PathSegment::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Option<Arc<Directory<T>>> {
        self.parent.upgrade()
    }

    /// Concatenation of segment names from the root down to (and including)
    /// this directory.
    pub fn full_path(self: &Arc<Self>) -> crate::path::Path {
        let mut segs = Vec::new();
        let mut cur = self.clone();
        loop {
            if let Some(name) = &cur.name {
                segs.push(name.clone());
            }
            match cur.parent() {
                Some(p) => cur = p,
                None => break,
            }
        }
        segs.reverse();
        let mut p = crate::path::Path::root();
        for s in segs {
            p = p.join(&s);
        }
        p
    }

    /// Returns the existing child named `name`, if any.
    pub fn child(&self, name: &str) -> Option<Arc<Directory<T>>> {
        self.children.read().unwrap().get(name).cloned()
    }

    /// Returns the existing child named `name`, creating it (and inserting
    /// it in creation order) if absent.
    pub fn child_or_create(self: &Arc<Self>, name: PathSegment) -> Arc<Directory<T>> {
        let mut children = self.children.write().unwrap();
        children
            .entry(name.as_str().to_string())
            .or_insert_with(|| Directory::new_child(name, self))
            .clone()
    }

    pub fn remove_child(&self, name: &str) -> Option<Arc<Directory<T>>> {
        self.children.write().unwrap().shift_remove(name)
    }

    /// Children in creation (insertion) order.
    pub fn children(&self) -> Vec<Arc<Directory<T>>> {
        self.children.read().unwrap().values().cloned().collect()
    }

    pub fn contents(&self) -> Vec<Arc<T>> {
        self.contents.read().unwrap().clone()
    }

    /// Appends `item` to `contents`, unless an entry with the same owning
    /// handle (`Arc::ptr_eq`) is already present.
    pub fn add_content(&self, item: Arc<T>) -> bool {
        let mut contents = self.contents.write().unwrap();
        if contents.iter().any(|existing| Arc::ptr_eq(existing, &item)) {
            return false;
        }
        contents.push(item);
        true
    }

    /// Removes every content entry matching `pred`, returning the removed
    /// entries.
    pub fn remove_content(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        let mut contents = self.contents.write().unwrap();
        let mut removed = Vec::new();
        contents.retain(|item| {
            if pred(item) {
                removed.push(item.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn clear(&self) {
        self.children.write().unwrap().clear();
        self.contents.write().unwrap().clear();
    }

    /// Pre-order traversal of this directory and its descendants, visiting
    /// children in insertion order. Stops early when `visit` returns
    /// `false`.
    pub fn walk_preorder(self: &Arc<Self>, visit: &mut impl FnMut(&Arc<Directory<T>>) -> bool) -> bool {
        if !visit(self) {
            return false;
        }
        for child in self.children() {
            if !child.walk_preorder(visit) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(s: &str) -> PathSegment {
        PathSegment::new(s).unwrap()
    }

    #[test]
    fn root_has_no_parent_and_empty_name() {
        let root = Directory::<u32>::new_root();
        assert!(root.is_root());
        assert_eq!(root.name(), "");
    }

    #[test]
    fn child_creation_preserves_insertion_order() {
        let root = Directory::<u32>::new_root();
        root.child_or_create(seg("b"));
        root.child_or_create(seg("a"));
        root.child_or_create(seg("c"));
        let names: Vec<_> = root.children().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn full_path_concatenates_from_root() {
        let root = Directory::<u32>::new_root();
        let a = root.child_or_create(seg("a"));
        let b = a.child_or_create(seg("b"));
        assert_eq!(b.full_path().to_string(), "/a/b");
    }

    #[test]
    fn content_duplicate_detection_is_by_handle() {
        let root = Directory::<u32>::new_root();
        let item = Arc::new(42u32);
        assert!(root.add_content(item.clone()));
        assert!(!root.add_content(item.clone()));
        assert_eq!(root.contents().len(), 1);

        // A different handle with the same value is not a duplicate.
        assert!(root.add_content(Arc::new(42u32)));
        assert_eq!(root.contents().len(), 2);
    }
}
