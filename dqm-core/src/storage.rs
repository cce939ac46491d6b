//! [`Storage`]: a per-workspace view over a [`Directory`] tree, with a
//! working-directory cursor.
//!
//! Navigation is cooperative and single-threaded by contract: the
//! cursor is ordinary state, not a lock. `Storage` is `Send` so it can be
//! handed to the task that owns it, but callers sharing one across threads
//! must serialize externally (e.g. behind a `Mutex`) — this crate does not
//! impose that for them.

use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::directory::Directory;
use crate::path::Path;
use crate::status::{Error, Result, Status};

pub struct Storage<T> {
    root: Arc<Directory<T>>,
    cursor: Mutex<Arc<Directory<T>>>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Storage<T> {
    pub fn new() -> Self {
        let root = Directory::new_root();
        Self {
            cursor: Mutex::new(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> Arc<Directory<T>> {
        self.root.clone()
    }

    fn cursor(&self) -> Arc<Directory<T>> {
        self.cursor.lock().unwrap().clone()
    }

    /// Returns the name of the current directory (`""` at the root).
    pub fn pwd(&self) -> String {
        self.cursor().name().to_string()
    }

    /// Resolves `path` against `base`, without creating missing
    /// directories. An absolute path resolves from the root; a relative one
    /// from `base`.
    fn resolve(&self, base: &Arc<Directory<T>>, path: &Path) -> Option<Arc<Directory<T>>> {
        let start = if path.is_relative() {
            base.clone()
        } else {
            self.root.clone()
        };
        let mut cur = start;
        for seg in path.segments() {
            cur = cur.child(seg.as_str())?;
        }
        Some(cur)
    }

    /// Walks `path`, creating missing intermediate directories.
    ///
    /// A `..` that climbs past the root is a [`Error::Failure`], distinct
    /// from the [`Error::InvalidParameter`] returned for an empty or
    /// otherwise malformed path — the former is a navigation failure, the
    /// latter a bad argument.
    #[instrument(skip(self), fields(path = %path))]
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let path = Path::parse(path).map_err(|e| match e {
            crate::path::PathError::EscapesRoot => Error::Failure(e.to_string()),
            _ => Error::InvalidParameter(e.to_string()),
        })?;
        let start = if path.is_relative() {
            self.cursor()
        } else {
            self.root.clone()
        };
        let mut cur = start;
        for seg in path.segments() {
            cur = cur.child_or_create(seg.clone());
        }
        Ok(())
    }

    /// Moves the cursor to the root.
    pub fn cd_root(&self) {
        *self.cursor.lock().unwrap() = self.root.clone();
    }

    /// Moves the cursor to `path`, without creating anything.
    #[instrument(skip(self), fields(path = %path))]
    pub fn cd(&self, path: &str) -> Result<()> {
        let path = Path::parse(path).map_err(|e| Error::InvalidParameter(e.to_string()))?;
        let base = self.cursor();
        let dir = self
            .resolve(&base, &path)
            .ok_or_else(|| Error::NotFound(format!("no such directory: {path}")))?;
        *self.cursor.lock().unwrap() = dir;
        Ok(())
    }

    /// Moves the cursor to its parent. Returns `Status::Unchanged` at the
    /// root.
    pub fn go_up(&self) -> Status {
        let cur = self.cursor();
        match cur.parent() {
            Some(p) => {
                *self.cursor.lock().unwrap() = p;
                Status::Success
            }
            None => Status::Unchanged,
        }
    }

    /// Finds the directory at `path`, relative to the cursor unless
    /// absolute.
    pub fn find(&self, path: &str) -> Result<Arc<Directory<T>>> {
        let path = Path::parse(path).map_err(|e| Error::InvalidParameter(e.to_string()))?;
        let base = self.cursor();
        self.resolve(&base, &path)
            .ok_or_else(|| Error::NotFound(format!("no such directory: {path}")))
    }

    /// Removes the directory at `path`.
    ///
    /// Refuses to remove the root, and refuses to remove any ancestor of
    /// the current cursor directory, by comparing canonicalized path
    /// prefixes (not substring containment, which would false-positive on
    /// sibling names sharing a textual prefix).
    #[instrument(skip(self), fields(path = %path))]
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let parsed = Path::parse(path).map_err(|e| Error::InvalidParameter(e.to_string()))?;
        if parsed.is_root() {
            return Err(Error::NotAllowed("cannot remove the root".into()));
        }

        let base = self.cursor();
        let target = self
            .resolve(&base, &parsed)
            .ok_or_else(|| Error::NotFound(format!("no such directory: {path}")))?;

        if target.is_root() {
            return Err(Error::NotAllowed("cannot remove the root".into()));
        }

        let cursor_path = base.full_path();
        let target_path = target.full_path();
        if is_prefix_of(&target_path, &cursor_path) {
            return Err(Error::NotAllowed(
                "cannot remove an ancestor of the current directory".into(),
            ));
        }

        let parent = target
            .parent()
            .expect("non-root directory always has a parent");
        parent
            .remove_child(target.name())
            .ok_or_else(|| Error::NotFound(format!("no such directory: {path}")))?;
        Ok(())
    }

    /// Inserts `item` into the directory addressed by `dir_path` (creating
    /// intermediate directories as needed), or into the current directory
    /// if `dir_path` is `None`. Returns the full path of the directory the
    /// item was inserted into.
    #[instrument(skip(self, item))]
    pub fn add(&self, item: Arc<T>, dir_path: Option<&str>) -> Result<Path> {
        let dir = match dir_path {
            Some(p) => {
                self.mkdir(p)?;
                self.find(p)?
            }
            None => self.cursor(),
        };
        dir.add_content(item);
        Ok(dir.full_path())
    }

    /// Removes every entry satisfying `pred` from the current directory.
    pub fn remove(&self, pred: impl FnMut(&T) -> bool) -> usize {
        self.cursor().remove_content(pred).len()
    }

    /// Removes every entry satisfying `pred` from the directory at
    /// `dir_path`.
    pub fn remove_at(&self, dir_path: &str, pred: impl FnMut(&T) -> bool) -> Result<usize> {
        let dir = self.find(dir_path)?;
        Ok(dir.remove_content(pred).len())
    }

    /// Pre-order traversal from the root; `visit` returning `false` stops
    /// the walk early. Children (and contents) are visited in insertion
    /// order.
    pub fn iterate(&self, mut visit: impl FnMut(&Arc<Directory<T>>) -> bool) {
        self.root.walk_preorder(&mut visit);
    }

    /// Resets the tree to empty and the cursor to root.
    pub fn clear(&self) {
        self.root.clear();
        *self.cursor.lock().unwrap() = self.root.clone();
    }
}

/// True if `maybe_ancestor` is `other` itself or a path-prefix of it, as
/// compared on canonicalized segments (never as a textual substring).
fn is_prefix_of(maybe_ancestor: &Path, other: &Path) -> bool {
    let a = maybe_ancestor.segments();
    let b = other.segments();
    a.len() <= b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_find_pwd_goup_scenario() {
        let s: Storage<u32> = Storage::new();
        s.mkdir("/a/b/c").unwrap();
        s.cd("/a/b").unwrap();
        assert_eq!(s.pwd(), "b");
        assert_eq!(s.go_up(), Status::Success);
        assert_eq!(s.pwd(), "a");
    }

    #[test]
    fn insert_and_find_scenario() {
        let s: Storage<u32> = Storage::new();
        let handle = Arc::new(7u32);
        let path = s.add(handle.clone(), Some("/x")).unwrap();
        assert_eq!(path.to_string(), "/x");
        let dir = s.find("/x").unwrap();
        assert_eq!(dir.contents().len(), 1);
        assert!(Arc::ptr_eq(&dir.contents()[0], &handle));
    }

    #[test]
    fn boundary_errors() {
        let s: Storage<u32> = Storage::new();
        assert!(matches!(s.mkdir(""), Err(Error::InvalidParameter(_))));
        // "a//b" normalizes fine (repeated slash is dropped) per Path::parse,
        // so this should succeed rather than error.
        assert!(s.mkdir("a//b").is_ok());
        assert_eq!(s.go_up(), Status::Unchanged);
        assert!(matches!(s.rmdir(""), Err(Error::NotAllowed(_))) || matches!(s.rmdir(""), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn mkdir_distinguishes_escapes_root_from_malformed_path() {
        let s: Storage<u32> = Storage::new();
        assert!(matches!(s.mkdir("/.."), Err(Error::Failure(_))));
        assert!(matches!(s.mkdir(""), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn rmdir_refuses_root_and_ancestors_of_cursor() {
        let s: Storage<u32> = Storage::new();
        s.mkdir("/a/b").unwrap();
        s.cd("/a/b").unwrap();
        assert!(matches!(s.rmdir("/"), Err(Error::NotAllowed(_))));
        assert!(matches!(s.rmdir("/a"), Err(Error::NotAllowed(_))));
        assert!(matches!(s.rmdir("/a/b"), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn rmdir_does_not_false_positive_on_sibling_name_prefix() {
        let s: Storage<u32> = Storage::new();
        s.mkdir("/ab/c").unwrap();
        s.mkdir("/a").unwrap();
        s.cd("/ab/c").unwrap();
        // "/a" is a textual prefix of "/ab/c" but not a path-ancestor of it.
        s.rmdir("/a").expect("must be allowed: not a real ancestor");
    }

    #[test]
    fn iterate_is_preorder_insertion_ordered() {
        let s: Storage<u32> = Storage::new();
        s.mkdir("/a/b").unwrap();
        s.mkdir("/a/c").unwrap();
        let mut seen = Vec::new();
        s.iterate(|d| {
            seen.push(d.full_path().to_string());
            true
        });
        assert_eq!(seen, vec!["/", "/a", "/a/b", "/a/c"]);
    }

    #[test]
    fn clear_resets_tree_and_cursor() {
        let s: Storage<u32> = Storage::new();
        s.mkdir("/a/b").unwrap();
        s.cd("/a/b").unwrap();
        s.clear();
        assert_eq!(s.pwd(), "");
        assert!(s.find("/a").is_err());
    }
}
