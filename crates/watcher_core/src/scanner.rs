use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Tokens shorter than this (in characters) are dropped after normalization.
pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Built-in matchers, applied in order. Each runs over the whole normalized text.
pub const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    // Groups of 4-6 alphanumerics joined by dashes or whitespace.
    ("grouped", r"\b[A-Z0-9]{4,6}(?:[-\s][A-Z0-9]{4,6}){1,4}\b"),
    // Same shape behind a SHIFT prefix, e.g. "SHIFT-XXXX-XXXX".
    (
        "shift-prefixed",
        r"(?i)\bSHIFT[-\s]?[A-Z0-9]{4,6}(?:[-\s][A-Z0-9]{4,6}){1,4}\b",
    ),
    // Single contiguous tokens of length 10-20.
    ("contiguous", r"\b[A-Z0-9]{10,20}\b"),
];

const TRIM_CHARS: &[char] = &['-', '.', ',', ';', ':'];

static BUILTIN: LazyLock<Vec<CodePattern>> = LazyLock::new(|| {
    BUILTIN_PATTERNS
        .iter()
        .map(|(name, source)| CodePattern::new(*name, source).expect("built-in pattern compiles"))
        .collect()
});

#[derive(Debug, thiserror::Error)]
#[error("invalid code pattern `{name}`: {source}")]
pub struct PatternError {
    pub name: String,
    #[source]
    pub source: regex::Error,
}

/// One named matcher in the scanner's ordered list.
#[derive(Debug, Clone)]
pub struct CodePattern {
    name: String,
    regex: Regex,
}

impl CodePattern {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, PatternError> {
        let name = name.into();
        match Regex::new(pattern) {
            Ok(regex) => Ok(Self { name, regex }),
            Err(source) => Err(PatternError { name, source }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Extracts normalized candidate codes from plain text.
///
/// The matcher list is fixed at construction; scanning never mutates it, so a
/// scanner can be shared freely between concurrent source scans.
#[derive(Debug, Clone)]
pub struct CodeScanner {
    patterns: Vec<CodePattern>,
    min_length: usize,
}

impl Default for CodeScanner {
    fn default() -> Self {
        Self::new(BUILTIN.clone(), DEFAULT_MIN_LENGTH)
    }
}

impl CodeScanner {
    pub fn new(patterns: Vec<CodePattern>, min_length: usize) -> Self {
        Self {
            patterns,
            min_length,
        }
    }

    /// Compile user-supplied pattern sources, naming them by position.
    pub fn from_sources<S: AsRef<str>>(
        sources: &[S],
        min_length: usize,
    ) -> Result<Self, PatternError> {
        let patterns = sources
            .iter()
            .enumerate()
            .map(|(idx, source)| CodePattern::new(format!("custom-{idx}"), source.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patterns, min_length))
    }

    pub fn patterns(&self) -> &[CodePattern] {
        &self.patterns
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Returns every candidate code in `text`, deduplicated and sorted ascending.
    pub fn find_codes(&self, text: &str) -> Vec<String> {
        let normalized = normalize_text(text);
        let mut found = BTreeSet::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(&normalized) {
                let token = normalize_token(m.as_str());
                if token.chars().count() >= self.min_length {
                    found.insert(token);
                }
            }
        }
        found.into_iter().collect()
    }
}

/// Uppercase and fold en/em dashes into ASCII hyphens.
pub fn normalize_text(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Collapse whitespace runs to a single hyphen and trim edge punctuation.
pub fn normalize_token(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                collapsed.push('-');
            }
            in_whitespace = true;
        } else {
            collapsed.push(c);
            in_whitespace = false;
        }
    }
    collapsed.trim_matches(TRIM_CHARS).to_string()
}
