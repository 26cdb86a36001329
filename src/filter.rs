//! Text filter: turns raw attribute values into normalized word tokens.
//!
//! A filter is configured once per collection and shared by all of its
//! clouds. Recomputes work on a cloned snapshot, so a filter edit never
//! races a count in progress.

use std::collections::BTreeSet;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whitespace plus common punctuation. `-` and `'` are kept inside words.
pub const DEFAULT_DELIMITERS: &[&str] = &[
    " ", "\t", "\n", "\r", ",", ".", ";", ":", "!", "?", "(", ")", "[", "]", "{", "}", "\"", "“",
    "”", "‘", "’", "/", "|", "=",
];

/// Function words excluded unless the collection replaces the list.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "do", "does", "for", "from", "had", "has", "have", "he", "her",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "may", "more", "most", "no", "not",
    "of", "on", "or", "other", "our", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "those", "to", "was", "we",
    "were", "what", "when", "which", "while", "who", "will", "with", "would", "you",
];

/// Languages available for stemming. English uses the Porter2 algorithm.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemLang {
    #[default]
    En,
    De,
    Fr,
    Es,
    It,
    Nl,
    Pt,
    Sv,
    Ru,
}

impl StemLang {
    fn algorithm(self) -> Algorithm {
        match self {
            StemLang::En => Algorithm::English,
            StemLang::De => Algorithm::German,
            StemLang::Fr => Algorithm::French,
            StemLang::Es => Algorithm::Spanish,
            StemLang::It => Algorithm::Italian,
            StemLang::Nl => Algorithm::Dutch,
            StemLang::Pt => Algorithm::Portuguese,
            StemLang::Sv => Algorithm::Swedish,
            StemLang::Ru => Algorithm::Russian,
        }
    }
}

/// User-editable part of a filter: how to split and what to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub delimiters: Vec<String>,
    pub excluded_words: BTreeSet<String>,
    pub exclude_numbers: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            delimiters: DEFAULT_DELIMITERS.iter().map(|d| d.to_string()).collect(),
            excluded_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            exclude_numbers: false,
        }
    }
}

impl FilterConfig {
    pub fn new<D, W>(delimiters: D, excluded_words: W, exclude_numbers: bool) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        FilterConfig {
            delimiters: delimiters.into_iter().map(Into::into).collect(),
            excluded_words: excluded_words.into_iter().map(Into::into).collect(),
            exclude_numbers,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delimiters.is_empty() {
            return Err(ConfigError::EmptyDelimiters);
        }
        if self.delimiters.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyDelimiter);
        }
        Ok(())
    }
}

/// One word produced by [`TextFilter::tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Lower-cased (and stemmed, if enabled) form used for counting.
    pub key: String,
    /// Original-case text as it appeared in the source value.
    pub surface: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextFilter {
    config: FilterConfig,
    // Longest first, so multi-character delimiters win over their prefixes.
    split_order: Vec<String>,
    excluded: BTreeSet<String>,
    stemming: bool,
    stem_lang: StemLang,
}

impl Default for TextFilter {
    fn default() -> Self {
        TextFilter::build(FilterConfig::default(), false, StemLang::default())
    }
}

impl TextFilter {
    /// Builds a filter from `config`, rejecting an unusable delimiter set.
    pub fn with_config(config: FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TextFilter::build(config, false, StemLang::default()))
    }

    fn build(config: FilterConfig, stemming: bool, stem_lang: StemLang) -> Self {
        let mut split_order = config.delimiters.clone();
        split_order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        split_order.dedup();
        let excluded = config
            .excluded_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        TextFilter {
            config,
            split_order,
            excluded,
            stemming,
            stem_lang,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Replaces delimiters, exclusions and the numeric flag. On error the
    /// filter is left untouched.
    pub fn set_config(&mut self, config: FilterConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self = TextFilter::build(config, self.stemming, self.stem_lang);
        Ok(())
    }

    pub fn stemming(&self) -> bool {
        self.stemming
    }

    pub fn set_stemming(&mut self, stemming: bool) {
        self.stemming = stemming;
    }

    pub fn stem_lang(&self) -> StemLang {
        self.stem_lang
    }

    pub fn set_stem_lang(&mut self, lang: StemLang) {
        self.stem_lang = lang;
    }

    pub fn is_excluded(&self, word: &str) -> bool {
        self.excluded.contains(&word.to_lowercase())
    }

    /// Returns a tokenizer bound to this filter. Build one per counting pass
    /// rather than per value.
    pub fn tokenizer(&self) -> Tokenizer<'_> {
        Tokenizer {
            filter: self,
            stemmer: self
                .stemming
                .then(|| Stemmer::create(self.stem_lang.algorithm())),
        }
    }

    /// Splits, normalizes and filters a single raw value.
    ///
    /// # Example
    /// ```
    /// use semantic_summary::TextFilter;
    /// let filter = TextFilter::default();
    /// let keys: Vec<String> = filter
    ///     .tokenize("The Red car, the red TRUCK")
    ///     .into_iter()
    ///     .map(|t| t.key)
    ///     .collect();
    /// assert_eq!(keys, vec!["red", "car", "red", "truck"]);
    /// ```
    pub fn tokenize(&self, raw: &str) -> Vec<Token> {
        self.tokenizer().tokenize(raw)
    }

    fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut pieces = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < text.len() {
            let rest = &text[i..];
            match self.split_order.iter().find(|d| rest.starts_with(d.as_str())) {
                Some(delimiter) => {
                    if start < i {
                        pieces.push(&text[start..i]);
                    }
                    i += delimiter.len();
                    start = i;
                }
                None => i += rest.chars().next().map_or(1, char::len_utf8),
            }
        }
        if start < text.len() {
            pieces.push(&text[start..]);
        }
        pieces
    }
}

/// A [`TextFilter`] with its stemmer instantiated.
pub struct Tokenizer<'f> {
    filter: &'f TextFilter,
    stemmer: Option<Stemmer>,
}

impl Tokenizer<'_> {
    pub fn tokenize(&self, raw: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for piece in self.filter.split(raw) {
            let lower = piece.to_lowercase();
            if self.filter.excluded.contains(&lower) {
                continue;
            }
            if self.filter.config.exclude_numbers && is_number(&lower) {
                continue;
            }
            let key = match &self.stemmer {
                Some(stemmer) => stemmer.stem(&lower).into_owned(),
                None => lower,
            };
            if key.is_empty() {
                continue;
            }
            tokens.push(Token {
                key,
                surface: piece.to_string(),
            });
        }
        tokens
    }
}

/// True for integers and decimals with an optional sign: `42`, `-3.5`, `.5`, `+7.`
pub fn is_number(token: &str) -> bool {
    let body = token.strip_prefix(['+', '-']).unwrap_or(token);
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    !(int.is_empty() && frac.is_empty()) && all_digits(int) && all_digits(frac)
}
