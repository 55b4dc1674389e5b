//! Open documents and the store that tracks them.

use langcore::{FoldChange, FoldMap, Language};
use ropey::Rope;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::workspace;

const HTML_BOILERPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Document</title>
</head>
<body>

</body>
</html>"#;

/// Canonical form of `path`. A file that does not exist yet resolves through
/// its canonical parent directory.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Identity of an open document, independent of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Gutter state of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMarker {
    /// 1-based.
    pub number: usize,
    pub breakpoint: bool,
    pub fold_start: bool,
}

#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    path: Option<PathBuf>,
    content: Rope,
    dirty: bool,
    language: String,
    folds: FoldMap,
    breakpoints: BTreeSet<usize>,
}

impl Document {
    fn new(id: DocumentId, path: Option<PathBuf>, content: &str, language: &str) -> Self {
        Self {
            id,
            path,
            content: Rope::from_str(content),
            dirty: false,
            language: language.to_string(),
            folds: FoldMap::new(),
            breakpoints: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File name, or `Untitled` before the first save.
    pub fn display_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn text(&self) -> String {
        self.content.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.content
    }

    pub fn line_count(&self) -> usize {
        self.content.len_lines()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn status_label(&self) -> &'static str {
        if self.dirty {
            "Modified"
        } else {
            "Saved"
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn folds(&self) -> &FoldMap {
        &self.folds
    }

    /// Breakpoint lines, 0-based, ascending.
    pub fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Text with every recorded fold collapsed to a placeholder line.
    pub fn displayed_text(&self) -> String {
        self.folds.project(&self.text())
    }

    /// 1-based `(line, column)` of a byte offset, clamped to the text.
    pub fn cursor_position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.content.len_bytes());
        let char_idx = self.content.byte_to_char(offset);
        let line = self.content.char_to_line(char_idx);
        let column = char_idx - self.content.line_to_char(line);
        (line + 1, column + 1)
    }

    /// Byte ranges of every literal occurrence of `term`.
    pub fn find(&self, term: &str) -> Vec<Range<usize>> {
        if term.is_empty() {
            return Vec::new();
        }
        self.text()
            .match_indices(term)
            .map(|(start, m)| start..start + m.len())
            .collect()
    }

    pub fn line_markers(&self) -> Vec<LineMarker> {
        (0..self.line_count())
            .map(|line| LineMarker {
                number: line + 1,
                breakpoint: self.breakpoints.contains(&line),
                fold_start: self.folds.is_fold_start(line),
            })
            .collect()
    }

    fn set_content(&mut self, text: &str) {
        self.content = Rope::from_str(text);
        self.dirty = true;
        self.folds.reanchor(text);
        let lines = self.content.len_lines();
        self.breakpoints.retain(|&line| line < lines);
    }
}

/// Decides whether unsaved changes in a document may be thrown away.
pub trait DiscardPrompt {
    fn confirm_discard(&mut self, document: &Document) -> bool;
}

impl<F> DiscardPrompt for F
where
    F: FnMut(&Document) -> bool,
{
    fn confirm_discard(&mut self, document: &Document) -> bool {
        self(document)
    }
}

/// Open documents in tab order plus the active one.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    active: Option<DocumentId>,
    next_id: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> DocumentId {
        let id = DocumentId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    fn index_of(&self, id: DocumentId) -> Result<usize> {
        self.documents
            .iter()
            .position(|d| d.id == id)
            .ok_or(EngineError::NotFound(id))
    }

    pub fn get(&self, id: DocumentId) -> Result<&Document> {
        let index = self.index_of(id)?;
        Ok(&self.documents[index])
    }

    fn get_mut(&mut self, id: DocumentId) -> Result<&mut Document> {
        let index = self.index_of(id)?;
        Ok(&mut self.documents[index])
    }

    pub fn active(&self) -> Option<&Document> {
        self.active.and_then(|id| self.get(id).ok())
    }

    pub fn active_id(&self) -> Option<DocumentId> {
        self.active
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<DocumentId> {
        self.documents
            .iter()
            .find(|d| d.path.as_deref() == Some(path))
            .map(|d| d.id)
    }

    /// New empty, untitled document; it becomes active.
    pub fn create(&mut self, language: &Language) -> DocumentId {
        let id = self.allocate_id();
        self.documents
            .push(Document::new(id, None, "", language.name()));
        self.active = Some(id);
        log::debug!("Created untitled document {}", id);
        id
    }

    /// Open `path` with `language`, or activate the document already showing it.
    pub fn open_from_path(&mut self, path: &Path, language: &Language) -> Result<DocumentId> {
        let path = resolve_path(path);
        if let Some(id) = self.find_by_path(&path) {
            self.active = Some(id);
            return Ok(id);
        }

        let content = workspace::read_text(&path)?;
        let id = self.allocate_id();
        self.documents.push(Document::new(
            id,
            Some(path),
            &content,
            language.name(),
        ));
        self.active = Some(id);
        Ok(id)
    }

    pub fn set_active(&mut self, id: DocumentId) -> Result<()> {
        self.index_of(id)?;
        self.active = Some(id);
        Ok(())
    }

    pub fn update_content(&mut self, id: DocumentId, text: &str) -> Result<()> {
        self.get_mut(id)?.set_content(text);
        Ok(())
    }

    /// Write the document to its path. The dirty flag survives a failed write.
    pub fn save(&mut self, id: DocumentId) -> Result<PathBuf> {
        let document = self.get_mut(id)?;
        let path = document.path.clone().ok_or(EngineError::NoPath(id))?;
        workspace::write_text(&path, &document.text())?;
        document.dirty = false;
        Ok(path)
    }

    /// Write the document to `path` and key it there. Refuses a path another
    /// open document already owns, however it is spelled.
    pub fn save_as(&mut self, id: DocumentId, path: &Path) -> Result<PathBuf> {
        let path = resolve_path(path);
        if let Some(other) = self.find_by_path(&path) {
            if other != id {
                return Err(EngineError::AlreadyOpen(path));
            }
        }
        let document = self.get_mut(id)?;
        workspace::write_text(&path, &document.text())?;
        document.path = Some(path.clone());
        document.dirty = false;
        Ok(path)
    }

    /// Assign `language`. A saved document whose extension no longer matches
    /// is renamed on disk, re-keyed and saved; returns the new path then.
    /// Nothing changes when the rename fails.
    pub fn set_language(&mut self, id: DocumentId, language: &Language) -> Result<Option<PathBuf>> {
        let index = self.index_of(id)?;
        let current = self.documents[index].path.clone();

        let Some(old_path) = current else {
            self.documents[index].language = language.name().to_string();
            return Ok(None);
        };

        let wanted = language.extension().trim_start_matches('.');
        let matches = old_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
        if matches || wanted.is_empty() {
            self.documents[index].language = language.name().to_string();
            return Ok(None);
        }

        let new_path = old_path.with_extension(wanted);
        if self.find_by_path(&new_path).is_some() {
            return Err(EngineError::AlreadyOpen(new_path));
        }
        if old_path.exists() {
            workspace::rename_file(&old_path, &new_path)?;
        }

        let document = &mut self.documents[index];
        document.language = language.name().to_string();
        document.path = Some(new_path.clone());
        self.save(id)?;
        Ok(Some(new_path))
    }

    pub fn toggle_fold(&mut self, id: DocumentId, line: usize) -> Result<FoldChange> {
        let document = self.get_mut(id)?;
        let text = document.text();
        Ok(document.folds.toggle(&text, line))
    }

    pub fn displayed_text(&self, id: DocumentId) -> Result<String> {
        Ok(self.get(id)?.displayed_text())
    }

    /// Returns whether `line` now carries a breakpoint.
    pub fn toggle_breakpoint(&mut self, id: DocumentId, line: usize) -> Result<bool> {
        let document = self.get_mut(id)?;
        if document.breakpoints.remove(&line) {
            return Ok(false);
        }
        if line >= document.line_count() {
            return Ok(false);
        }
        document.breakpoints.insert(line);
        Ok(true)
    }

    pub fn find(&self, id: DocumentId, term: &str) -> Result<Vec<Range<usize>>> {
        Ok(self.get(id)?.find(term))
    }

    /// Replace every occurrence; returns how many were replaced.
    pub fn replace_all(&mut self, id: DocumentId, find: &str, replace: &str) -> Result<usize> {
        let document = self.get_mut(id)?;
        if find.is_empty() {
            return Ok(0);
        }
        let text = document.text();
        let count = text.matches(find).count();
        if count > 0 && find != replace {
            document.set_content(&text.replace(find, replace));
        }
        Ok(count)
    }

    /// Expand a line consisting of `!` into an HTML5 skeleton.
    pub fn expand_html_boilerplate(&mut self, id: DocumentId, line: usize) -> Result<bool> {
        let document = self.get_mut(id)?;
        let text = document.text();
        let mut lines: Vec<&str> = text.split('\n').collect();
        match lines.get(line) {
            Some(current) if current.trim() == "!" => {
                lines[line] = HTML_BOILERPLATE;
                document.set_content(&lines.join("\n"));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn unsaved(&self) -> Vec<&Document> {
        self.documents.iter().filter(|d| d.dirty).collect()
    }

    /// Save every dirty document that has a path; failures are collected.
    pub fn autosave(&mut self) -> Vec<(DocumentId, EngineError)> {
        let pending: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|d| d.dirty && d.path.is_some())
            .map(|d| d.id)
            .collect();

        let mut failures = Vec::new();
        for id in pending {
            if let Err(e) = self.save(id) {
                log::warn!("Autosave failed for {}: {}", id, e);
                failures.push((id, e));
            }
        }
        failures
    }

    /// Close one document, asking before unsaved changes are dropped.
    pub fn close(&mut self, id: DocumentId, prompt: &mut dyn DiscardPrompt) -> Result<()> {
        let index = self.index_of(id)?;
        let document = &self.documents[index];
        if document.dirty && !prompt.confirm_discard(document) {
            return Err(EngineError::DiscardDeclined(document.display_name()));
        }

        self.documents.remove(index);
        if self.active == Some(id) {
            self.active = self
                .documents
                .get(index)
                .or_else(|| self.documents.last())
                .map(|d| d.id);
        }
        log::debug!("Closed document {}", id);
        Ok(())
    }

    /// Close documents in tab order, stopping at the first declined discard.
    pub fn close_all(&mut self, prompt: &mut dyn DiscardPrompt) -> Result<()> {
        let ids: Vec<DocumentId> = self.documents.iter().map(|d| d.id).collect();
        for id in ids {
            self.close(id, prompt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use langcore::LanguageRegistry;
    use tempfile::TempDir;

    fn accept(_: &Document) -> bool {
        true
    }

    fn decline(_: &Document) -> bool {
        false
    }

    #[test]
    fn test_create_gives_unique_ids_and_activates() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let a = store.create(registry.default_language());
        let b = store.create(registry.default_language());

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_id(), Some(b));
        assert_eq!(store.get(a).unwrap().display_name(), "Untitled");
        assert_eq!(store.get(a).unwrap().language(), "python");
    }

    #[test]
    fn test_open_existing_path_activates_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.js");
        std::fs::write(&path, "let x = 1;\n").unwrap();
        let registry = LanguageRegistry::builtin();
        let js = registry.for_path(&path);

        let mut store = DocumentStore::new();
        let first = store.open_from_path(&path, js).unwrap();
        let other = store.create(js);
        assert_eq!(store.active_id(), Some(other));

        let again = store.open_from_path(&path, js).unwrap();
        assert_eq!(first, again);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_id(), Some(first));
        assert_eq!(store.get(first).unwrap().language(), "javascript");
        assert!(!store.get(first).unwrap().is_dirty());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let err = store
            .open_from_path(&dir.path().join("nope.py"), registry.default_language())
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
        assert!(store.is_empty());
        assert!(store.active().is_none());
    }

    #[test]
    fn test_set_active_unknown_id() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        store.close(id, &mut accept).unwrap();
        assert!(matches!(store.set_active(id), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_update_and_save_cycle() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());

        store.update_content(id, "print('hi')").unwrap();
        assert!(store.get(id).unwrap().is_dirty());
        assert_eq!(store.get(id).unwrap().status_label(), "Modified");
        assert!(matches!(store.save(id), Err(EngineError::NoPath(_))));
        assert!(store.get(id).unwrap().is_dirty());

        let path = dir.path().join("hi.py");
        store.save_as(id, &path).unwrap();
        assert!(!store.get(id).unwrap().is_dirty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print('hi')");

        store.update_content(id, "print('bye')").unwrap();
        store.save(id).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print('bye')");
        assert_eq!(store.get(id).unwrap().status_label(), "Saved");
    }

    #[test]
    fn test_failed_save_keeps_dirty_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("a.py");
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        store.update_content(id, "x = 1").unwrap();

        assert!(store.save_as(id, &path).is_err());
        let document = store.get(id).unwrap();
        assert!(document.is_dirty());
        assert!(document.path().is_none());
    }

    #[test]
    fn test_save_as_refuses_open_path_spelled_differently() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "original").unwrap();
        let registry = LanguageRegistry::builtin();
        let python = registry.default_language();

        let mut store = DocumentStore::new();
        let first = store.open_from_path(&path, python).unwrap();
        let second = store.create(python);
        store.update_content(second, "clobber").unwrap();

        let err = store
            .save_as(second, &dir.path().join("sub").join("..").join("a.py"))
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyOpen(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert!(store.get(second).unwrap().path().is_none());
        assert_eq!(store.find_by_path(&path.canonicalize().unwrap()), Some(first));

        let fresh = dir.path().join("sub").join("..").join("b.py");
        let saved = store.save_as(second, &fresh).unwrap();
        assert_eq!(saved, dir.path().canonicalize().unwrap().join("b.py"));
    }

    #[test]
    fn test_language_change_renames_file() {
        let dir = TempDir::new().unwrap();
        let old_path = dir.path().join("foo.py");
        std::fs::write(&old_path, "<p>hi</p>").unwrap();
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store
            .open_from_path(&old_path, registry.for_path(&old_path))
            .unwrap();

        let html = registry.get("html").unwrap();
        let new_path = store.set_language(id, html).unwrap().unwrap();

        assert_eq!(new_path.file_name().unwrap(), "foo.html");
        assert!(new_path.exists());
        assert!(!old_path.exists());
        assert_eq!(store.find_by_path(&new_path), Some(id));
        assert!(store
            .iter()
            .all(|d| d.path().map_or(true, |p| !p.ends_with("foo.py"))));
        let document = store.get(id).unwrap();
        assert_eq!(document.language(), "html");
        assert!(!document.is_dirty());
    }

    #[test]
    fn test_failed_rename_leaves_document_untouched() {
        let dir = TempDir::new().unwrap();
        let old_path = dir.path().join("foo.py");
        std::fs::write(&old_path, "x").unwrap();
        std::fs::write(dir.path().join("foo.js"), "taken").unwrap();
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store
            .open_from_path(&old_path, registry.for_path(&old_path))
            .unwrap();
        let before = store.get(id).unwrap().path().unwrap().to_path_buf();

        let js = registry.get("javascript").unwrap();
        assert!(store.set_language(id, js).is_err());

        let document = store.get(id).unwrap();
        assert_eq!(document.path(), Some(before.as_path()));
        assert_eq!(document.language(), "python");
        assert_eq!(store.find_by_path(&before), Some(id));
    }

    #[test]
    fn test_untitled_language_change_does_not_touch_disk() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        let renamed = store.set_language(id, registry.get("c").unwrap()).unwrap();
        assert!(renamed.is_none());
        assert_eq!(store.get(id).unwrap().language(), "c");
    }

    #[test]
    fn test_close_asks_before_discarding() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let a = store.create(registry.default_language());
        let b = store.create(registry.default_language());
        let c = store.create(registry.default_language());
        store.update_content(b, "dirty").unwrap();
        store.set_active(b).unwrap();

        assert!(matches!(
            store.close(b, &mut decline),
            Err(EngineError::DiscardDeclined(_))
        ));
        assert_eq!(store.len(), 3);

        let mut asked = Vec::new();
        let mut record = |d: &Document| {
            asked.push(d.id());
            true
        };
        store.close(b, &mut record).unwrap();
        assert_eq!(asked, vec![b]);
        assert_eq!(store.active_id(), Some(c));

        store.close(c, &mut decline).unwrap();
        assert_eq!(store.active_id(), Some(a));
        store.close(a, &mut decline).unwrap();
        assert!(store.active().is_none());
    }

    #[test]
    fn test_close_all_stops_at_first_decline() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let a = store.create(registry.default_language());
        let b = store.create(registry.default_language());
        let c = store.create(registry.default_language());
        store.update_content(b, "keep me").unwrap();
        store.update_content(c, "me too").unwrap();

        let err = store.close_all(&mut decline).unwrap_err();
        assert!(matches!(err, EngineError::DiscardDeclined(_)));
        let left: Vec<DocumentId> = store.iter().map(|d| d.id()).collect();
        assert_eq!(left, vec![b, c]);
        assert!(store.get(a).is_err());
        assert_eq!(store.unsaved().len(), 2);

        store.close_all(&mut accept).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_folds_follow_edits_without_touching_content() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        let text = "line1\n    line2\n    line3\n    line4\n    line5\nline6";
        store.update_content(id, text).unwrap();

        assert_eq!(
            store.toggle_fold(id, 1).unwrap(),
            FoldChange::Folded { start: 1, end: 5 }
        );
        assert_eq!(store.displayed_text(id).unwrap(), "line1\n[FOLDED]\nline6");
        assert_eq!(store.get(id).unwrap().text(), text);

        store
            .update_content(id, "line1\n    line2\nline3")
            .unwrap();
        assert_eq!(store.get(id).unwrap().folds().end_of(1), Some(2));

        assert_eq!(
            store.toggle_fold(id, 1).unwrap(),
            FoldChange::Unfolded { start: 1 }
        );
        assert_eq!(store.displayed_text(id).unwrap(), "line1\n    line2\nline3");
    }

    #[test]
    fn test_breakpoints_and_gutter() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        store
            .update_content(id, "if x:\n    a()\n    b()\nc()")
            .unwrap();

        assert!(store.toggle_breakpoint(id, 3).unwrap());
        assert!(store.toggle_breakpoint(id, 0).unwrap());
        assert!(!store.toggle_breakpoint(id, 99).unwrap());
        store.toggle_fold(id, 1).unwrap();

        let document = store.get(id).unwrap();
        assert_eq!(document.breakpoints().collect::<Vec<_>>(), vec![0, 3]);
        let markers = document.line_markers();
        assert_eq!(markers.len(), 4);
        assert!(markers[0].breakpoint && !markers[0].fold_start);
        assert!(markers[1].fold_start);
        assert_eq!(markers[3].number, 4);

        assert!(!store.toggle_breakpoint(id, 3).unwrap());
        store.update_content(id, "if x:").unwrap();
        assert_eq!(store.get(id).unwrap().breakpoints().count(), 1);
    }

    #[test]
    fn test_find_and_replace_all() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        store.update_content(id, "foo bar foo").unwrap();

        assert_eq!(store.find(id, "foo").unwrap(), vec![0..3, 8..11]);
        assert!(store.find(id, "").unwrap().is_empty());

        assert_eq!(store.replace_all(id, "foo", "baz").unwrap(), 2);
        let document = store.get(id).unwrap();
        assert_eq!(document.text(), "baz bar baz");
        assert!(document.is_dirty());
        assert_eq!(store.replace_all(id, "zzz", "y").unwrap(), 0);
    }

    #[test]
    fn test_html_boilerplate_expansion() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.get("html").unwrap());
        store.update_content(id, "  !  \n<p>x</p>").unwrap();

        assert!(!store.expand_html_boilerplate(id, 1).unwrap());
        assert!(store.expand_html_boilerplate(id, 0).unwrap());
        let text = store.get(id).unwrap().text();
        assert!(text.starts_with("<!DOCTYPE html>\n<html lang=\"en\">"));
        assert!(text.ends_with("</html>\n<p>x</p>"));
    }

    #[test]
    fn test_cursor_position_is_one_based() {
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();
        let id = store.create(registry.default_language());
        store.update_content(id, "ab\ncdé\nf").unwrap();
        let document = store.get(id).unwrap();

        assert_eq!(document.cursor_position(0), (1, 1));
        assert_eq!(document.cursor_position(4), (2, 2));
        // After the two-byte é.
        assert_eq!(document.cursor_position(7), (2, 4));
        assert_eq!(document.cursor_position(1000), (3, 2));
    }

    #[test]
    fn test_autosave_collects_failures() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::builtin();
        let mut store = DocumentStore::new();

        let good = store.create(registry.default_language());
        store.save_as(good, &dir.path().join("good.py")).unwrap();
        store.update_content(good, "ok = True").unwrap();

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let bad = store.create(registry.default_language());
        store.save_as(bad, &sub.join("bad.py")).unwrap();
        store.update_content(bad, "lost = True").unwrap();
        std::fs::remove_dir_all(&sub).unwrap();

        let untitled = store.create(registry.default_language());
        store.update_content(untitled, "draft").unwrap();

        let failures = store.autosave();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, bad);
        assert!(!store.get(good).unwrap().is_dirty());
        assert!(store.get(bad).unwrap().is_dirty());
        assert!(store.get(untitled).unwrap().is_dirty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("good.py")).unwrap(),
            "ok = True"
        );
    }
}
