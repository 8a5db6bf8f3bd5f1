//! Depth-first directory walk with symlink resolution
//!
//! Symbolic links are followed and classified by what they point at. Memory
//! use is bounded by one open directory per level of the current path; the
//! tree is never materialized.

use crate::scan_events::SkipReason;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::FileType;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// What the walk found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Classify an entry by the type of the file it resolves to
pub fn classify(file_type: FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::RegularFile
    } else {
        EntryKind::Skipped(SkipReason::NotRegularFile)
    }
}

/// Iterator over every entry below a root directory (the root itself excluded)
///
/// Entries come sorted by file name within each directory. Creating a new
/// walk over the same root starts over from the beginning.
pub struct TreeWalk {
    inner: walkdir::IntoIter,
    excluded: Vec<Exclusion>,
}

/// A file kept out of the walk, identified by its resolved directory and name
///
/// Resolving the directory makes `sub/../x`, `./x` and `x` reached through a
/// symlinked directory all name the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Exclusion {
    dir: PathBuf,
    name: OsString,
}

impl Exclusion {
    fn new(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_os_string();
        let dir = resolve_dir(path.parent().unwrap_or(Path::new("")));
        Some(Self { dir, name })
    }

    fn matches(&self, path: &Path) -> bool {
        // Cheap name check first; directories are only resolved on a hit
        path.file_name() == Some(self.name.as_os_str())
            && resolve_dir(path.parent().unwrap_or(Path::new(""))) == self.dir
    }
}

impl TreeWalk {
    /// Walk `root`, never yielding any of the `excluded` paths
    pub fn new<'a>(root: &Path, excluded: impl IntoIterator<Item = &'a Path>) -> Self {
        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        Self {
            inner,
            excluded: excluded.into_iter().filter_map(Exclusion::new).collect(),
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|exclusion| exclusion.matches(path))
    }
}

impl Iterator for TreeWalk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(classify_error(err)),
            };

            if self.is_excluded(entry.path()) {
                continue;
            }

            return Some(Ok(WalkEntry {
                kind: classify(entry.file_type()),
                path: entry.into_path(),
            }));
        }
    }
}

/// Turn walk errors that describe an entry (rather than a failure) into skips
fn classify_error(err: walkdir::Error) -> Result<WalkEntry> {
    let Some(path) = err.path().map(Path::to_path_buf) else {
        return Err(err).context("Failed to walk directory tree");
    };

    // Problems with the root itself are always fatal
    if err.depth() > 0 {
        if err.loop_ancestor().is_some() {
            return Ok(WalkEntry {
                path,
                kind: EntryKind::Skipped(SkipReason::SymlinkLoop),
            });
        }

        if err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) {
            let reason = match std::fs::symlink_metadata(&path) {
                Ok(meta) if meta.file_type().is_symlink() => SkipReason::DanglingSymlink,
                Err(e) if e.kind() == ErrorKind::NotFound => SkipReason::Vanished,
                _ => {
                    return Err(err)
                        .with_context(|| format!("Failed to read {}", path.display()))
                }
            };
            return Ok(WalkEntry {
                path,
                kind: EntryKind::Skipped(reason),
            });
        }
    }

    Err(err).with_context(|| format!("Failed to read {}", path.display()))
}

/// Canonical form of a directory, or its lexical form if it can't be resolved
fn resolve_dir(dir: &Path) -> PathBuf {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    std::fs::canonicalize(dir).unwrap_or_else(|_| lexical_normalize(dir))
}

/// Drop `.` components and fold `..` into its parent without touching the disk
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = normalized.components().next_back();
                let at_name = matches!(last, Some(Component::Normal(_)));
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                if at_name {
                    normalized.pop();
                } else if !at_root {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect(root: &Path, excluded: &[&Path]) -> Vec<(String, EntryKind)> {
        TreeWalk::new(root, excluded.iter().copied())
            .map(|entry| {
                let entry = entry.unwrap();
                let rel = entry.path.strip_prefix(root).unwrap();
                (rel.to_string_lossy().replace('\\', "/"), entry.kind)
            })
            .collect()
    }

    #[test]
    fn test_walk_sorted_depth_first() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b/inner/c.txt"), "c").unwrap();
        fs::write(root.join("b/d.txt"), "d").unwrap();

        let entries = collect(root, &[]);
        assert_eq!(
            entries,
            vec![
                ("a.txt".to_string(), EntryKind::RegularFile),
                ("b".to_string(), EntryKind::Directory),
                ("b/d.txt".to_string(), EntryKind::RegularFile),
                ("b/inner".to_string(), EntryKind::Directory),
                ("b/inner/c.txt".to_string(), EntryKind::RegularFile),
            ]
        );
    }

    #[test]
    fn test_walk_excludes_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".sha1s"), "").unwrap();
        fs::write(root.join(".sha1s.tmp"), "").unwrap();
        fs::write(root.join("keep"), "").unwrap();

        let manifest = root.join(".sha1s");
        let temp = root.join("./.sha1s.tmp");
        let entries = collect(root, &[manifest.as_path(), temp.as_path()]);
        assert_eq!(entries, vec![("keep".to_string(), EntryKind::RegularFile)]);
    }

    #[test]
    fn test_walk_excludes_paths_with_parent_components() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join(".sha1s"), "").unwrap();
        fs::write(root.join("sub/.sha1s"), "").unwrap();

        let manifest = root.join("sub/../.sha1s");
        let entries = collect(root, &[manifest.as_path()]);
        assert_eq!(
            entries,
            vec![
                ("sub".to_string(), EntryKind::Directory),
                ("sub/.sha1s".to_string(), EntryKind::RegularFile),
            ]
        );
    }

    #[test]
    fn test_lexical_normalize() {
        assert_eq!(
            lexical_normalize(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(lexical_normalize(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(lexical_normalize(Path::new("a/..")), PathBuf::new());
        assert_eq!(lexical_normalize(Path::new("../../x")), PathBuf::from("../../x"));
        assert_eq!(lexical_normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_excludes_through_symlinked_root() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join(".sha1s"), "").unwrap();
        fs::write(real.join("keep"), "").unwrap();
        let alias = temp_dir.path().join("alias");
        symlink(&real, &alias).unwrap();

        // Walk the real directory, name the manifest through the alias
        let manifest = alias.join(".sha1s");
        let entries = collect(&real, &[manifest.as_path()]);
        assert_eq!(entries, vec![("keep".to_string(), EntryKind::RegularFile)]);
    }

    #[test]
    fn test_walk_restarts() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("x"), "").unwrap();

        assert_eq!(collect(temp_dir.path(), &[]).len(), 1);
        assert_eq!(collect(temp_dir.path(), &[]).len(), 1);
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut walk = TreeWalk::new(&temp_dir.path().join("absent"), []);
        assert!(walk.next().unwrap().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_symlinks() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("dir")).unwrap();
        fs::write(root.join("dir/file"), "x").unwrap();
        symlink(root.join("dir"), root.join("link_dir")).unwrap();
        symlink(root.join("dir/file"), root.join("link_file")).unwrap();
        symlink(root.join("nowhere"), root.join("link_dangling")).unwrap();

        let entries = collect(root, &[]);
        assert_eq!(
            entries,
            vec![
                ("dir".to_string(), EntryKind::Directory),
                ("dir/file".to_string(), EntryKind::RegularFile),
                (
                    "link_dangling".to_string(),
                    EntryKind::Skipped(SkipReason::DanglingSymlink)
                ),
                ("link_dir".to_string(), EntryKind::Directory),
                ("link_dir/file".to_string(), EntryKind::RegularFile),
                ("link_file".to_string(), EntryKind::RegularFile),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_symlink_loop_skipped() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("dir")).unwrap();
        symlink(root, root.join("dir/up")).unwrap();

        let entries = collect(root, &[]);
        assert_eq!(
            entries,
            vec![
                ("dir".to_string(), EntryKind::Directory),
                ("dir/up".to_string(), EntryKind::Skipped(SkipReason::SymlinkLoop)),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_special_file_skipped() {
        use std::os::unix::net::UnixListener;

        let temp_dir = TempDir::new().unwrap();
        let _listener = UnixListener::bind(temp_dir.path().join("sock")).unwrap();

        let entries = collect(temp_dir.path(), &[]);
        assert_eq!(
            entries,
            vec![(
                "sock".to_string(),
                EntryKind::Skipped(SkipReason::NotRegularFile)
            )]
        );
    }
}
