//! Static table of supported languages.
//!
//! Every language carries the lexical rules consumed by the highlighter and an
//! optional runner template consumed by the execution engine. The table is
//! loaded once and never mutated; lookups that miss fall back to the first
//! entry so that opening an unknown file type never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::highlight::Tag;

#[derive(Debug, Error)]
pub enum LanguageError {
    #[error("language table is empty")]
    EmptyTable,
    #[error("duplicate language name: {0}")]
    DuplicateName(String),
    #[error("invalid comment pattern for {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to parse language table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Argument-list pattern with `{file}`, `{class}` and `{file_no_ext}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerTemplate(pub Vec<String>);

impl RunnerTemplate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    /// Substitute the placeholders in every token for `file`.
    pub fn render(&self, file: &Path) -> Vec<String> {
        let file_str = file.to_string_lossy();
        let file_no_ext = file.with_extension("");
        let file_no_ext = file_no_ext.to_string_lossy();
        let class = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.0
            .iter()
            .map(|token| {
                token
                    .replace("{file}", &file_str)
                    .replace("{class}", &class)
                    .replace("{file_no_ext}", &file_no_ext)
            })
            .collect()
    }
}

/// Serialized form of one language table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDef {
    pub name: String,
    pub ext: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub builtins: Vec<String>,
    pub comment: String,
    #[serde(default)]
    pub runner: Option<RunnerTemplate>,
    #[serde(default)]
    pub markup: bool,
}

/// A language table entry with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Language {
    def: LanguageDef,
    pub(crate) comment: Regex,
    // Whole-word pattern per keyword and builtin, in table order.
    pub(crate) word_patterns: Vec<(Tag, Regex)>,
    // Longest first, builtins ahead of keywords on equal length.
    pub(crate) lexicon: Vec<(String, Tag)>,
}

impl Language {
    pub fn new(def: LanguageDef) -> Result<Self, LanguageError> {
        let comment = Regex::new(&format!("(?m){}", def.comment)).map_err(|source| {
            LanguageError::InvalidPattern {
                name: def.name.clone(),
                source,
            }
        })?;

        let mut word_patterns = Vec::with_capacity(def.keywords.len() + def.builtins.len());
        let words = def
            .keywords
            .iter()
            .map(|w| (Tag::Keyword, w))
            .chain(def.builtins.iter().map(|w| (Tag::Builtin, w)));
        for (tag, word) in words {
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(word))).map_err(
                |source| LanguageError::InvalidPattern {
                    name: def.name.clone(),
                    source,
                },
            )?;
            word_patterns.push((tag, pattern));
        }

        let mut lexicon: Vec<(String, Tag)> = def
            .keywords
            .iter()
            .map(|w| (w.clone(), Tag::Keyword))
            .chain(def.builtins.iter().map(|w| (w.clone(), Tag::Builtin)))
            .filter(|(w, _)| !w.is_empty())
            .collect();
        lexicon.sort_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then_with(|| (b.1 == Tag::Builtin).cmp(&(a.1 == Tag::Builtin)))
        });

        Ok(Self {
            def,
            comment,
            word_patterns,
            lexicon,
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Extension including the leading dot, e.g. `.py`.
    pub fn extension(&self) -> &str {
        &self.def.ext
    }

    pub fn keywords(&self) -> &[String] {
        &self.def.keywords
    }

    pub fn builtins(&self) -> &[String] {
        &self.def.builtins
    }

    pub fn comment_pattern(&self) -> &str {
        &self.def.comment
    }

    pub fn runner(&self) -> Option<&RunnerTemplate> {
        self.def.runner.as_ref()
    }

    pub fn is_executable(&self) -> bool {
        self.def.runner.is_some()
    }

    pub fn is_markup(&self) -> bool {
        self.def.markup
    }

    pub fn def(&self) -> &LanguageDef {
        &self.def
    }
}

#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
}

impl LanguageRegistry {
    pub fn from_defs(defs: Vec<LanguageDef>) -> Result<Self, LanguageError> {
        if defs.is_empty() {
            return Err(LanguageError::EmptyTable);
        }

        let mut languages: Vec<Language> = Vec::with_capacity(defs.len());
        for def in defs {
            if languages
                .iter()
                .any(|l| l.name().eq_ignore_ascii_case(&def.name))
            {
                return Err(LanguageError::DuplicateName(def.name));
            }
            languages.push(Language::new(def)?);
        }

        Ok(Self { languages })
    }

    pub fn from_json(json: &str) -> Result<Self, LanguageError> {
        let defs: Vec<LanguageDef> = serde_json::from_str(json)?;
        Self::from_defs(defs)
    }

    pub fn builtin() -> Self {
        Self::from_defs(builtin_defs()).expect("built-in language table must compile")
    }

    /// The fallback language: the first entry of the table.
    pub fn default_language(&self) -> &Language {
        &self.languages[0]
    }

    pub fn get(&self, name: &str) -> Option<&Language> {
        self.languages
            .iter()
            .find(|l| l.name().eq_ignore_ascii_case(name))
    }

    pub fn lookup_by_name(&self, name: &str) -> &Language {
        self.get(name).unwrap_or_else(|| {
            log::debug!("Unknown language '{}', using {}", name, self.default_language().name());
            self.default_language()
        })
    }

    /// Accepts the extension with or without its leading dot.
    pub fn lookup_by_extension(&self, ext: &str) -> &Language {
        let ext = ext.trim_start_matches('.');
        self.languages
            .iter()
            .find(|l| l.extension().trim_start_matches('.').eq_ignore_ascii_case(ext))
            .unwrap_or_else(|| self.default_language())
    }

    pub fn for_path(&self, path: &Path) -> &Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.lookup_by_extension(ext),
            None => self.default_language(),
        }
    }

    pub fn markup_language(&self) -> Option<&Language> {
        self.languages.iter().find(|l| l.is_markup())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.languages.iter().map(|l| l.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Language> {
        self.languages.iter()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn def(
    name: &str,
    ext: &str,
    keywords: &[&str],
    builtins: &[&str],
    comment: &str,
    runner: &[&str],
) -> LanguageDef {
    LanguageDef {
        name: name.to_string(),
        ext: ext.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        builtins: builtins.iter().map(|s| s.to_string()).collect(),
        comment: comment.to_string(),
        runner: (!runner.is_empty()).then(|| RunnerTemplate::new(runner.iter().copied())),
        markup: false,
    }
}

pub fn builtin_defs() -> Vec<LanguageDef> {
    let mut html = def(
        "html",
        ".html",
        &["html", "head", "body", "div", "script", "style", "title", "p", "a", "img"],
        &[],
        r"<!--[\s\S]*?-->",
        &[],
    );
    html.markup = true;

    vec![
        def(
            "python",
            ".py",
            &["def", "if", "else", "for", "while", "import", "class", "try", "except", "with"],
            &["print", "len", "range", "input"],
            r"#.*$",
            &["python3", "{file}"],
        ),
        def(
            "javascript",
            ".js",
            &["function", "if", "else", "for", "let", "const", "var", "return", "async", "await"],
            &["console.log", "alert", "fetch"],
            r"//.*$",
            &["node", "{file}"],
        ),
        html,
        def(
            "java",
            ".java",
            &["public", "class", "static", "void", "if", "else", "for", "int", "new", "return"],
            &["System.out.println", "Math.random"],
            r"//.*$",
            &["sh", "-c", "javac {file} && java {class}"],
        ),
        def(
            "c",
            ".c",
            &["int", "float", "if", "else", "for", "while", "return", "void", "struct", "char"],
            &["printf", "scanf"],
            r"//.*$",
            &["sh", "-c", "gcc {file} -o a.out && ./a.out"],
        ),
        def(
            "cpp",
            ".cpp",
            &["int", "float", "if", "else", "for", "while", "return", "class", "public", "private"],
            &["cout", "cin"],
            r"//.*$",
            &["sh", "-c", "g++ {file} -o a.out && ./a.out"],
        ),
    ]
}
