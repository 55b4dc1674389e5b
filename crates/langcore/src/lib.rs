pub mod fold;
pub mod highlight;
pub mod language;

pub use fold::{fold_range, FoldChange, FoldMap, FOLD_PLACEHOLDER};
pub use highlight::{classify, classify_layered, classify_with, HighlightMode, HighlightSpan, Tag};
pub use language::{Language, LanguageDef, LanguageError, LanguageRegistry, RunnerTemplate};
