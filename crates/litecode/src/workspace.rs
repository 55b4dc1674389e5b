//! Filesystem collaborator: document reads and writes, the explorer tree and
//! find-in-files over the current root.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{EngineError, Result};

/// Results beyond this many are summarised as a count.
pub const FIND_RESULT_LIMIT: usize = 20;

const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

pub fn read_text(path: &Path) -> Result<String> {
    if let Ok(metadata) = fs::metadata(path) {
        if metadata.len() > LARGE_FILE_THRESHOLD {
            log::warn!(
                "Large file detected ({} bytes): {}",
                metadata.len(),
                path.display()
            );
        }
    }

    let content = fs::read_to_string(path).map_err(|e| EngineError::io("read", path, e))?;
    if content.contains('\0') {
        return Err(EngineError::io(
            "read",
            path,
            io::Error::new(io::ErrorKind::InvalidData, "file looks binary"),
        ));
    }
    log::info!("Opened {}", path.display());
    Ok(content)
}

pub fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| EngineError::io("write", path, e))?;
    log::info!("Saved {}", path.display());
    Ok(())
}

/// Move `from` to `to`, refusing to clobber an unrelated file at `to`.
pub fn rename_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(EngineError::io(
            "rename",
            to,
            io::Error::new(io::ErrorKind::AlreadyExists, "target already exists"),
        ));
    }
    fs::rename(from, to).map_err(|e| EngineError::io("rename", from, e))?;
    log::info!("Renamed {} -> {}", from.display(), to.display());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindMatch {
    pub path: PathBuf,
    /// 1-based.
    pub line: usize,
    pub text: String,
}

impl fmt::Display for FindMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Every match of one search. Rendering caps the listing at
/// [`FIND_RESULT_LIMIT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindReport {
    pub term: String,
    pub matches: Vec<FindMatch>,
}

impl FindReport {
    pub fn total(&self) -> usize {
        self.matches.len()
    }

    pub fn shown(&self) -> &[FindMatch] {
        &self.matches[..self.matches.len().min(FIND_RESULT_LIMIT)]
    }

    pub fn remainder(&self) -> usize {
        self.matches.len().saturating_sub(FIND_RESULT_LIMIT)
    }
}

impl fmt::Display for FindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matches.is_empty() {
            return write!(f, "No matches found for '{}'", self.term);
        }
        write!(f, "Found {} matches:", self.total())?;
        for found in self.shown() {
            write!(f, "\n{}", found)?;
        }
        if self.remainder() > 0 {
            write!(f, "\n...and {} more", self.remainder())?;
        }
        Ok(())
    }
}

/// Literal substring search, line by line, over every readable text file
/// under `root`. Files are visited in name order.
pub fn find_in_files(root: &Path, term: &str) -> FindReport {
    let mut report = FindReport {
        term: term.to_string(),
        matches: Vec::new(),
    };
    if term.is_empty() {
        return report;
    }

    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file());

    for entry in files {
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        if content.contains('\0') {
            continue;
        }
        for (i, line) in content.lines().enumerate() {
            if line.contains(term) {
                report.matches.push(FindMatch {
                    path: entry.path().to_path_buf(),
                    line: i + 1,
                    text: line.trim().to_string(),
                });
            }
        }
    }

    log::debug!("Search for '{}' found {} matches", term, report.total());
    report
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: PathBuf,
    /// 1 for direct children of the root.
    pub depth: usize,
    pub is_dir: bool,
}

impl TreeEntry {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn dirs_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.file_type()
        .is_dir()
        .cmp(&a.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Recursive explorer listing in display order.
pub fn list_tree(root: &Path) -> Result<Vec<TreeEntry>> {
    if !root.is_dir() {
        return Err(EngineError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|e| EngineError::io("list", root, e))?;

    let entries = WalkDir::new(root)
        .min_depth(1)
        .sort_by(dirs_first)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(TreeEntry {
                path: entry.path().to_path_buf(),
                depth: entry.depth(),
                is_dir: entry.file_type().is_dir(),
            }),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_caps_listing_at_twenty() {
        let root = TempDir::new().unwrap();
        let body: String = (0..25).map(|i| format!("  needle {}\n", i)).collect();
        std::fs::write(root.path().join("many.txt"), body).unwrap();

        let report = find_in_files(root.path(), "needle");
        assert_eq!(report.total(), 25);
        assert_eq!(report.shown().len(), 20);
        assert_eq!(report.remainder(), 5);

        let rendered = report.to_string();
        assert!(rendered.starts_with("Found 25 matches:"));
        assert!(rendered.ends_with("\n...and 5 more"));
        assert_eq!(rendered.lines().filter(|l| l.contains(" - needle")).count(), 20);
        assert!(rendered.contains("many.txt:1 - needle 0"));
    }

    #[test]
    fn test_find_reports_nothing_found() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.py"), "print(1)\n").unwrap();

        let report = find_in_files(root.path(), "absent");
        assert_eq!(report.to_string(), "No matches found for 'absent'");
    }

    #[test]
    fn test_find_skips_binary_files_and_recurses() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        std::fs::write(root.path().join("sub/b.js"), "let x; // todo\n").unwrap();
        std::fs::write(root.path().join("blob.bin"), b"todo\0\xff\xfe").unwrap();

        let report = find_in_files(root.path(), "todo");
        assert_eq!(report.total(), 1);
        assert_eq!(report.matches[0].line, 1);
        assert_eq!(report.matches[0].text, "let x; // todo");
        assert!(report.to_string().contains("b.js:1 - let x; // todo"));
    }

    #[test]
    fn test_tree_lists_directories_first() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(root.path().join("zeta")).unwrap();
        std::fs::write(root.path().join("zeta/inner.py"), "").unwrap();
        std::fs::create_dir(root.path().join("beta")).unwrap();

        let tree = list_tree(root.path()).unwrap();
        let listing: Vec<(usize, String, bool)> =
            tree.iter().map(|e| (e.depth, e.name(), e.is_dir)).collect();
        assert_eq!(
            listing,
            vec![
                (1, "beta".to_string(), true),
                (1, "zeta".to_string(), true),
                (2, "inner.py".to_string(), false),
                (1, "a.txt".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_tree_requires_directory() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("f.txt");
        std::fs::write(&file, "").unwrap();
        assert!(matches!(list_tree(&file), Err(EngineError::NotADirectory(_))));
    }

    #[test]
    fn test_read_rejects_binary_and_reports_path() {
        let root = TempDir::new().unwrap();
        let blob = root.path().join("blob.dat");
        std::fs::write(&blob, b"ab\0cd").unwrap();
        match read_text(&blob) {
            Err(EngineError::Io { op, path, .. }) => {
                assert_eq!(op, "read");
                assert_eq!(path, blob);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(read_text(&root.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_rename_refuses_to_clobber() {
        let root = TempDir::new().unwrap();
        let from = root.path().join("a.py");
        let to = root.path().join("a.html");
        std::fs::write(&from, "x").unwrap();
        std::fs::write(&to, "keep").unwrap();

        assert!(rename_file(&from, &to).is_err());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "keep");
        assert!(from.exists());
    }
}
