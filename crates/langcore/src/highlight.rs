//! Text classification for syntax highlighting.
//!
//! Two classifiers share one span type. [`classify`] is a single-pass lexer
//! that yields non-overlapping spans, so keywords inside strings or comments
//! are never tagged. [`classify_layered`] keeps the four independent passes
//! (words, numbers, strings, comments) whose spans may overlap; renderers
//! apply them in emission order and later spans win.
//!
//! Offsets are byte offsets into the classified text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

use crate::language::Language;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"\b\d+\.?\d*\b").expect("Invalid NUMBER regex pattern");
    // Shortest run between a pair of matching quotes on one line.
    static ref STRING: Regex =
        Regex::new(r#""[^"\n]*"|'[^'\n]*'"#).expect("Invalid STRING regex pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Keyword,
    Number,
    String,
    Comment,
    Builtin,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Keyword => "keyword",
            Tag::Number => "number",
            Tag::String => "string",
            Tag::Comment => "comment",
            Tag::Builtin => "builtin",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged half-open `[start, end)` byte range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HighlightSpan {
    pub tag: Tag,
    pub start: usize,
    pub end: usize,
}

impl HighlightSpan {
    pub fn new(tag: Tag, start: usize, end: usize) -> Self {
        Self { tag, start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range()]
    }
}

/// Selects which classifier a caller wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HighlightMode {
    #[default]
    Tokenized,
    Layered,
}

pub fn classify_with(mode: HighlightMode, text: &str, language: &Language) -> Vec<HighlightSpan> {
    match mode {
        HighlightMode::Tokenized => classify(text, language),
        HighlightMode::Layered => classify_layered(text, language),
    }
}

/// Four independent passes: keywords and builtins, numbers, strings, comments.
pub fn classify_layered(text: &str, language: &Language) -> Vec<HighlightSpan> {
    let mut spans = Vec::new();

    for (tag, pattern) in &language.word_patterns {
        spans.extend(
            pattern
                .find_iter(text)
                .map(|m| HighlightSpan::new(*tag, m.start(), m.end())),
        );
    }
    // Keywords first, then builtins, regardless of table interleaving.
    spans.sort_by_key(|s| s.tag == Tag::Builtin);

    let passes: [(Tag, &Regex); 3] = [
        (Tag::Number, &NUMBER),
        (Tag::String, &STRING),
        (Tag::Comment, &language.comment),
    ];
    for (tag, pattern) in passes {
        spans.extend(
            pattern
                .find_iter(text)
                .filter(|m| !m.is_empty())
                .map(|m| HighlightSpan::new(tag, m.start(), m.end())),
        );
    }

    spans
}

/// Single left-to-right scan producing ordered, non-overlapping spans.
pub fn classify(text: &str, language: &Language) -> Vec<HighlightSpan> {
    let mut spans = Vec::new();
    let mut pos = 0;
    let mut next_comment = language.comment.find_at(text, 0);

    while pos < text.len() {
        if let Some(m) = next_comment {
            if m.start() < pos {
                next_comment = language.comment.find_at(text, pos);
                continue;
            }
            if m.start() == pos && !m.is_empty() {
                spans.push(HighlightSpan::new(Tag::Comment, m.start(), m.end()));
                pos = m.end();
                next_comment = language.comment.find_at(text, pos);
                continue;
            }
        }

        let rest = &text[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch == '"' || ch == '\'' {
            if let Some(len) = quoted_len(rest, ch) {
                spans.push(HighlightSpan::new(Tag::String, pos, pos + len));
                pos += len;
                continue;
            }
        }

        if is_word_char(ch) && at_word_start(text, pos) {
            if let Some((tag, len)) = match_lexicon(rest, language) {
                spans.push(HighlightSpan::new(tag, pos, pos + len));
                pos += len;
                continue;
            }
            if let Some(len) = number_len(rest) {
                spans.push(HighlightSpan::new(Tag::Number, pos, pos + len));
                pos += len;
                continue;
            }
            pos += word_len(rest);
            continue;
        }

        pos += ch.len_utf8();
    }

    spans
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn at_word_start(text: &str, pos: usize) -> bool {
    !text[..pos].chars().next_back().is_some_and(is_word_char)
}

fn at_word_end(rest: &str, len: usize) -> bool {
    !rest[len..].chars().next().is_some_and(is_word_char)
}

fn word_len(rest: &str) -> usize {
    rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len())
}

fn quoted_len(rest: &str, quote: char) -> Option<usize> {
    let body = &rest[quote.len_utf8()..];
    let close = body.find(|c: char| c == quote || c == '\n')?;
    body[close..]
        .starts_with(quote)
        .then(|| quote.len_utf8() * 2 + close)
}

fn match_lexicon(rest: &str, language: &Language) -> Option<(Tag, usize)> {
    language
        .lexicon
        .iter()
        .find(|(word, _)| rest.starts_with(word.as_str()) && at_word_end(rest, word.len()))
        .map(|(word, tag)| (*tag, word.len()))
}

fn number_len(rest: &str) -> Option<usize> {
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }
    let mut len = digits;
    let tail = &rest[digits..];
    if let Some(fraction) = tail.strip_prefix('.') {
        let frac_digits = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        if frac_digits > 0 {
            len += 1 + frac_digits;
        }
    }
    at_word_end(rest, len).then_some(len)
}
