//! Indentation based folding.
//!
//! Lines are addressed by 0-based index into `text.split('\n')`. A fold
//! started at line `s` covers the half-open range `[s, e)`. When the next
//! non-blank line is indented deeper than `s`, `s` is a block header and `e`
//! is the first later non-blank line indented no deeper than `s`. Otherwise
//! `s` opens a run of siblings and `e` is the first later non-blank line
//! indented less than `s`. With no such line, `e` is the line count.
//! Folding never touches the text itself: [`FoldMap::project`] builds the
//! displayed view from the text and the recorded ranges.

use std::collections::BTreeMap;
use std::ops::Range;

/// Single line shown in place of a collapsed range.
pub const FOLD_PLACEHOLDER: &str = "[FOLDED]";

/// Width of the leading whitespace, one per character.
pub fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Range a fold at `line` would cover, or `None` when the line is out of
/// range, blank, or not indented.
pub fn fold_range(text: &str, line: usize) -> Option<Range<usize>> {
    let lines: Vec<&str> = text.split('\n').collect();
    let start_line = lines.get(line)?;
    if is_blank(start_line) {
        return None;
    }
    let indent = indent_width(start_line);
    if indent == 0 {
        return None;
    }

    let mut following = lines
        .iter()
        .enumerate()
        .skip(line + 1)
        .filter(|(_, l)| !is_blank(l));
    let header = following
        .clone()
        .next()
        .is_some_and(|(_, l)| indent_width(l) > indent);
    let end = following
        .find(|(_, l)| {
            let width = indent_width(l);
            if header {
                width <= indent
            } else {
                width < indent
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(lines.len());

    Some(line..end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldChange {
    Folded { start: usize, end: usize },
    Unfolded { start: usize },
    NotFoldable,
}

/// Collapsed ranges of one document, ordered by start line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldMap {
    ranges: BTreeMap<usize, usize>,
}

impl FoldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unfold when `line` already starts a fold, otherwise fold it.
    pub fn toggle(&mut self, text: &str, line: usize) -> FoldChange {
        if self.ranges.remove(&line).is_some() {
            return FoldChange::Unfolded { start: line };
        }
        match fold_range(text, line) {
            Some(range) => {
                self.ranges.insert(range.start, range.end);
                FoldChange::Folded {
                    start: range.start,
                    end: range.end,
                }
            }
            None => FoldChange::NotFoldable,
        }
    }

    pub fn is_fold_start(&self, line: usize) -> bool {
        self.ranges.contains_key(&line)
    }

    pub fn end_of(&self, start: usize) -> Option<usize> {
        self.ranges.get(&start).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.ranges.iter().map(|(&start, &end)| start..end)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Recompute every recorded fold against edited text, dropping starts
    /// that are no longer foldable.
    pub fn reanchor(&mut self, text: &str) {
        let starts: Vec<usize> = self.ranges.keys().copied().collect();
        self.ranges = starts
            .into_iter()
            .filter_map(|start| fold_range(text, start).map(|r| (r.start, r.end)))
            .collect();
    }

    /// Displayed view: each fold's lines replaced by one placeholder line.
    /// Folds nested inside an earlier fold are already hidden.
    pub fn project(&self, text: &str) -> String {
        if self.ranges.is_empty() {
            return text.to_string();
        }

        let mut shown: Vec<&str> = Vec::new();
        let mut hidden_until = 0;
        for (i, line) in text.split('\n').enumerate() {
            if i < hidden_until {
                continue;
            }
            if let Some(&end) = self.ranges.get(&i) {
                shown.push(FOLD_PLACEHOLDER);
                hidden_until = end;
                continue;
            }
            shown.push(line);
        }
        shown.join("\n")
    }
}
