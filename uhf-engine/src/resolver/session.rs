use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Paths whose resolution the user declined during this session.
///
/// Written by the foreground, read by resolution workers. Reads take a
/// short read lock, so a worker sees either the old or the new set.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    paths: Arc<RwLock<HashSet<String>>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&path_key(path))
    }

    /// Returns false when the path was already blacklisted.
    pub fn insert(&self, path: &Path) -> bool {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path_key(path))
    }

    pub fn len(&self) -> usize {
        self.paths.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Directories the user pointed at while locating missing content.
#[derive(Debug, Clone, Default)]
pub struct LocationHints {
    dirs: Arc<RwLock<Vec<PathBuf>>>,
}

impl LocationHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the directory was already known.
    pub fn add(&self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        let mut dirs = self.dirs.write().unwrap_or_else(PoisonError::into_inner);
        if dirs.contains(&dir) {
            return false;
        }
        tracing::info!("Added content location hint {:?}", dir);
        dirs.push(dir);
        true
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Absolute path for a resource path stored relative to `root`.
    ///
    /// Tries `<root>/<path>`, then `<hint>/<path>` and `<hint>/<file name>`
    /// for every hint in the order they were added. The first readable
    /// candidate wins; without one the plain `<root>/<path>` comes back.
    pub fn resolve(&self, root: &Path, relative: &str) -> PathBuf {
        let direct = root.join(relative);
        if is_readable(&direct) {
            return direct;
        }
        self.find(relative).unwrap_or(direct)
    }

    /// The first readable candidate under the hint directories only.
    pub fn find(&self, relative: &str) -> Option<PathBuf> {
        let file_name = Path::new(relative).file_name();
        for hint in self.dirs() {
            let nested = hint.join(relative);
            if is_readable(&nested) {
                return Some(nested);
            }
            if let Some(name) = file_name {
                let flat = hint.join(name);
                if is_readable(&flat) {
                    return Some(flat);
                }
            }
        }
        None
    }
}

fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

/// Session-wide state shared by the foreground and every resolution worker.
#[derive(Debug, Clone, Default)]
pub struct ResolverSession {
    pub blacklist: Blacklist,
    pub hints: LocationHints,
}

impl ResolverSession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_blacklist_insert_once() {
        let blacklist = Blacklist::new();
        assert!(blacklist.insert(Path::new("/tv/a.mkv")));
        assert!(!blacklist.insert(Path::new("/tv/a.mkv")));
        assert!(blacklist.contains(Path::new("/tv/a.mkv")));
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let session = ResolverSession::new();
        let worker_view = session.clone();
        session.blacklist.insert(Path::new("x.mp4"));
        session.hints.add("/mnt/media");
        assert!(worker_view.blacklist.contains(Path::new("x.mp4")));
        assert_eq!(worker_view.hints.dirs(), vec![PathBuf::from("/mnt/media")]);
    }

    #[test]
    fn test_resolve_prefers_channel_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("shows")).unwrap();
        fs::write(root.path().join("shows/a.mp4"), b"x").unwrap();

        let hints = LocationHints::new();
        assert_eq!(
            hints.resolve(root.path(), "shows/a.mp4"),
            root.path().join("shows/a.mp4")
        );
    }

    #[test]
    fn test_resolve_through_hints() {
        let root = tempfile::tempdir().unwrap();
        let nested = tempfile::tempdir().unwrap();
        let flat = tempfile::tempdir().unwrap();
        fs::create_dir_all(nested.path().join("shows")).unwrap();
        fs::write(nested.path().join("shows/a.mp4"), b"x").unwrap();
        fs::write(flat.path().join("b.mp4"), b"x").unwrap();

        let hints = LocationHints::new();
        assert!(hints.add(nested.path()));
        assert!(hints.add(flat.path()));
        assert!(!hints.add(flat.path()));

        assert_eq!(
            hints.resolve(root.path(), "shows/a.mp4"),
            nested.path().join("shows/a.mp4")
        );
        assert_eq!(
            hints.resolve(root.path(), "movies/b.mp4"),
            flat.path().join("b.mp4")
        );
        assert_eq!(
            hints.resolve(root.path(), "movies/none.mp4"),
            root.path().join("movies/none.mp4")
        );
    }
}
