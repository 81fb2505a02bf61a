//! Language error taxonomy
//!
//! Each supported language owns a fixed set of error categories. A
//! diagnostic message is classified with case-insensitive substring rules
//! and counted in its language's bucket; anything unmatched is `syntax`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error category shared across language taxonomies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Reference,
    Type,
    Interface,
    Indentation,
    Import,
    Compilation,
    Runtime,
    Package,
    Borrow,
    Lifetime,
    Undefined,
    Gem,
}

/// Map editor language ids onto a taxonomy key.
pub fn canonical_language(language_id: &str) -> String {
    let lower = language_id.to_ascii_lowercase();
    match lower.as_str() {
        "javascriptreact" => "javascript".to_string(),
        "typescriptreact" => "typescript".to_string(),
        _ => lower,
    }
}

/// Categories tracked for a canonical language id.
pub fn taxonomy(language: &str) -> Option<&'static [ErrorCategory]> {
    use ErrorCategory::*;
    let categories: &'static [ErrorCategory] = match language {
        "javascript" => &[Syntax, Reference, Type],
        "typescript" => &[Syntax, Reference, Type, Interface],
        "python" => &[Syntax, Indentation, Import],
        "java" => &[Syntax, Compilation, Runtime],
        "go" => &[Syntax, Package, Type],
        "rust" => &[Syntax, Borrow, Lifetime],
        "php" => &[Syntax, Undefined, Type],
        "ruby" => &[Syntax, Undefined, Gem],
        _ => return None,
    };
    Some(categories)
}

/// Classify a diagnostic message for a canonical language id.
pub fn classify(language: &str, message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    match language {
        "javascript" | "typescript" => {
            if msg.contains("undefined") || msg.contains("not defined") {
                ErrorCategory::Reference
            } else if language == "typescript" && msg.contains("interface") {
                ErrorCategory::Interface
            } else if msg.contains("type") {
                ErrorCategory::Type
            } else {
                ErrorCategory::Syntax
            }
        }
        "python" => {
            if msg.contains("indentation") || msg.contains("indent") {
                ErrorCategory::Indentation
            } else if msg.contains("import") || msg.contains("no module named") {
                ErrorCategory::Import
            } else {
                ErrorCategory::Syntax
            }
        }
        "java" => {
            if msg.contains("cannot find symbol") {
                ErrorCategory::Compilation
            } else if msg.contains("runtime") || msg.contains("exception") {
                ErrorCategory::Runtime
            } else {
                ErrorCategory::Syntax
            }
        }
        "go" => {
            if msg.contains("package") || msg.contains("imported and not used") {
                ErrorCategory::Package
            } else if msg.contains("type") {
                ErrorCategory::Type
            } else {
                ErrorCategory::Syntax
            }
        }
        "rust" => {
            if msg.contains("lifetime") {
                ErrorCategory::Lifetime
            } else if msg.contains("borrow") || msg.contains("moved value") {
                ErrorCategory::Borrow
            } else {
                ErrorCategory::Syntax
            }
        }
        "php" => {
            if msg.contains("undefined") {
                ErrorCategory::Undefined
            } else if msg.contains("type") {
                ErrorCategory::Type
            } else {
                ErrorCategory::Syntax
            }
        }
        "ruby" => {
            if msg.contains("undefined") {
                ErrorCategory::Undefined
            } else if msg.contains("gem") {
                ErrorCategory::Gem
            } else {
                ErrorCategory::Syntax
            }
        }
        _ => ErrorCategory::Syntax,
    }
}

/// Per-language error counters. Buckets are only ever incremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageErrorBuckets {
    buckets: BTreeMap<String, BTreeMap<ErrorCategory, u32>>,
}

impl LanguageErrorBuckets {
    /// Zeroed buckets for every language in `languages` that has a taxonomy.
    pub fn new(languages: &[String]) -> Self {
        let buckets = languages
            .iter()
            .map(|lang| canonical_language(lang))
            .filter_map(|lang| {
                taxonomy(&lang).map(|categories| {
                    let counters = categories.iter().map(|c| (*c, 0)).collect();
                    (lang, counters)
                })
            })
            .collect();
        Self { buckets }
    }

    /// Classify and count a message. Returns the category, or `None` when
    /// the language has no bucket.
    pub fn record(&mut self, language_id: &str, message: &str) -> Option<ErrorCategory> {
        let language = canonical_language(language_id);
        let counters = self.buckets.get_mut(&language)?;
        let category = classify(&language, message);
        *counters.entry(category).or_insert(0) += 1;
        Some(category)
    }

    pub fn count(&self, language_id: &str, category: ErrorCategory) -> u32 {
        self.buckets
            .get(&canonical_language(language_id))
            .and_then(|counters| counters.get(&category))
            .copied()
            .unwrap_or(0)
    }

    /// Languages with at least one non-zero counter.
    pub fn non_zero(&self) -> BTreeMap<String, BTreeMap<ErrorCategory, u32>> {
        self.buckets
            .iter()
            .filter(|(_, counters)| counters.values().any(|n| *n > 0))
            .map(|(lang, counters)| (lang.clone(), counters.clone()))
            .collect()
    }
}
