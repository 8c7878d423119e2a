//! Tracked directory entries
//!
//! Two maps kept in step: entry name -> open handle, and descriptor -> entry
//! name. The second one turns a delivered descriptor back into a name.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};

/// True for names the watcher never tracks or reacts to (dotfiles, swap and lock files).
pub fn is_ignored(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

#[derive(Debug, Default)]
pub struct WatchSet {
    files: HashMap<OsString, File>,
    names: HashMap<RawFd, OsString>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `file` under `name` and returns its descriptor.
    ///
    /// Entries are never removed; a deleted file keeps its stale handle.
    pub fn insert(&mut self, name: OsString, file: File) -> RawFd {
        let ident = file.as_raw_fd();
        self.names.insert(ident, name.clone());
        self.files.insert(name, file);
        ident
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.files.contains_key(name)
    }

    pub fn name_of(&self, ident: RawFd) -> Option<&OsStr> {
        self.names.get(&ident).map(OsString::as_os_str)
    }

    pub fn file_of(&self, ident: RawFd) -> Option<&File> {
        self.names.get(&ident).and_then(|name| self.files.get(name))
    }

    #[cfg(test)]
    pub(crate) fn ident_of(&self, name: &OsStr) -> Option<RawFd> {
        self.files.get(name).map(File::as_raw_fd)
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_is_ignored_matches_leading_dot_only() {
        assert!(is_ignored(OsStr::new(".git")));
        assert!(is_ignored(OsStr::new(".main.rs.swp")));
        assert!(is_ignored(OsStr::new(".")));
        assert!(!is_ignored(OsStr::new("main.rs")));
        assert!(!is_ignored(OsStr::new("notes.")));
        assert!(!is_ignored(OsStr::new("")));
    }

    #[test]
    fn test_insert_links_name_and_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let mut set = WatchSet::new();
        let ident = set.insert(OsString::from("a.txt"), File::open(&path).unwrap());

        assert_eq!(set.len(), 1);
        assert!(set.contains(OsStr::new("a.txt")));
        assert_eq!(set.name_of(ident), Some(OsStr::new("a.txt")));
        assert_eq!(set.ident_of(OsStr::new("a.txt")), Some(ident));
        assert_eq!(set.file_of(ident).map(File::as_raw_fd), Some(ident));
    }

    #[test]
    fn test_unknown_descriptor_resolves_to_nothing() {
        let set = WatchSet::new();
        assert_eq!(set.len(), 0);
        assert_eq!(set.name_of(12345), None);
        assert!(set.file_of(12345).is_none());
    }
}
