//! Tokenization and lemma normalization for glossary matching.
//!
//! The crate is deliberately decoupled from any particular morphological
//! analyzer: callers hand in anything implementing [`Normalize`], which includes
//! plain closures `Fn(&str) -> String`. Two adapters ship with the crate:
//! [`Lexicon`], a file-backed `surface -> lemma` table exported from an external
//! analyzer, and [`CachedNormalizer`], which memoizes any other normalizer.
//!
//! # How it works
//! 1. [`tokenize`] splits a string into alternating word and gap runs. HTML
//!    tags and character entities always land inside gaps.
//! 2. Each word run is mapped to its canonical form via [`Normalize`].
//! 3. Gap runs are kept verbatim so the text can be re-spliced byte for byte.
//!
//! # Example
//! ```
//! use doclinker_morph::{Normalize, TokenKind, tokenize};
//!
//! let lemma = |word: &str| word.to_lowercase().trim_end_matches('а').to_string();
//! let tokens = tokenize("Отчёт <br/> банка");
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[1].kind, TokenKind::Gap);
//! assert_eq!(lemma.normalize_text("(Банка)"), "(банк)");
//! ```
//!
//! For a runnable demo, see `cargo run -p doclinker-morph --example normalize -- <lexicon> <text>`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use dashmap::DashMap;

/// Maps a surface word to its canonical form.
///
/// Implementations must be deterministic and total: unknown words come back
/// as a best-effort form (usually the lower-cased word), never as an error.
pub trait Normalize {
    fn normalize_word(&self, word: &str) -> String;

    /// Normalize every word run of `text`, keeping gaps (spaces, punctuation,
    /// parentheses, markup) untouched.
    fn normalize_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for token in tokenize(text) {
            let raw = token.text(text);
            match token.kind {
                TokenKind::Word => out.push_str(&self.normalize_word(raw)),
                TokenKind::Gap => out.push_str(raw),
            }
        }
        out
    }
}

impl<F> Normalize for F
where
    F: Fn(&str) -> String,
{
    fn normalize_word(&self, word: &str) -> String {
        self(word)
    }
}

/// Whether a run is a word or the stuff in between.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Word,
    Gap,
}

/// A run of the source text, addressed by byte offsets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// Word characters: letters, digits and underscore.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split `text` into maximal alternating word and gap runs.
///
/// A word run starts at a word character and continues over word characters
/// and apostrophes. Everything else is a gap; `<...>` tags and `&name;` /
/// `&#123;` entities are swallowed whole by the surrounding gap so that markup
/// never contributes words. Concatenating all token texts yields `text`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0usize;

    while pos < text.len() {
        let (end, kind) = if let Some(markup_end) = markup_end(text, pos) {
            (markup_end, TokenKind::Gap)
        } else {
            let c = next_char(text, pos);
            if is_word_char(c) {
                let mut end = pos;
                for (offset, ch) in text[pos..].char_indices() {
                    if is_word_char(ch) || ch == '\'' {
                        end = pos + offset + ch.len_utf8();
                    } else {
                        break;
                    }
                }
                (end, TokenKind::Word)
            } else {
                (pos + c.len_utf8(), TokenKind::Gap)
            }
        };

        match tokens.last_mut() {
            Some(last) if last.kind == TokenKind::Gap && kind == TokenKind::Gap => {
                last.end = end;
            }
            _ => tokens.push(Token {
                start: pos,
                end,
                kind,
            }),
        }
        pos = end;
    }

    tokens
}

fn next_char(text: &str, pos: usize) -> char {
    text[pos..].chars().next().unwrap_or('\0')
}

/// End offset of a tag or entity starting at `pos`, if one starts there.
fn markup_end(text: &str, pos: usize) -> Option<usize> {
    let rest = &text[pos..];
    if rest.starts_with('<') {
        let close = rest.find('>')?;
        // `a < b` in running text is not a tag.
        let inner = &rest[1..close];
        let first = inner.chars().next()?;
        if first == '/' || first == '!' || first.is_ascii_alphabetic() {
            return Some(pos + close + 1);
        }
        return None;
    }
    if rest.starts_with('&') {
        let semi = rest.bytes().take(12).position(|b| b == b';')?;
        let body = &rest[1..semi];
        let body = body.strip_prefix('#').unwrap_or(body);
        if !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Some(pos + semi + 1);
        }
    }
    None
}

/// Lower-case `text` without moving any byte offset.
///
/// Characters whose lower-case form has a different UTF-8 length are kept as
/// they are, so offsets found in the result index the original string.
pub fn fold_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) if l.len_utf8() == c.len_utf8() => out.push(l),
            _ => out.push(c),
        }
    }
    out
}

/// Lemma table produced by an external analyzer.
///
/// One `surface lemma` pair per line; lookups are case-insensitive and unknown
/// words come back lower-cased.
#[derive(Debug, Default, Clone)]
pub struct Lexicon {
    lemmas: HashMap<String, String>,
}

impl Lexicon {
    /// Load a lexicon file. Blank lines and lines without a lemma are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open lexicon {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut lemmas = HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line =
                line.with_context(|| format!("read line {} in {}", lineno + 1, path.display()))?;
            let mut parts = line.split_whitespace();
            let (Some(surface), Some(lemma)) = (parts.next(), parts.next()) else {
                continue;
            };
            lemmas.insert(surface.to_lowercase(), lemma.to_lowercase());
        }
        Ok(Self { lemmas })
    }

    pub fn from_pairs<I, S, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, L)>,
        S: AsRef<str>,
        L: AsRef<str>,
    {
        Self {
            lemmas: pairs
                .into_iter()
                .map(|(s, l)| (s.as_ref().to_lowercase(), l.as_ref().to_lowercase()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lemmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lemmas.is_empty()
    }
}

impl Normalize for Lexicon {
    fn normalize_word(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        match self.lemmas.get(&lower) {
            Some(lemma) => lemma.clone(),
            None => lower,
        }
    }
}

/// Entries a [`CachedNormalizer`] holds before it starts over.
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Memoizes another normalizer; safe to share across threads.
///
/// The cache is bounded: once it holds `capacity` forms it is cleared and
/// refilled, so a long-running service never keeps every form it has seen.
pub struct CachedNormalizer<N> {
    inner: N,
    cache: DashMap<String, String>,
    capacity: usize,
}

impl<N: Normalize> CachedNormalizer<N> {
    pub fn new(inner: N) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: N, capacity: usize) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of surface forms currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<N: Normalize> Normalize for CachedNormalizer<N> {
    fn normalize_word(&self, word: &str) -> String {
        if let Some(hit) = self.cache.get(word) {
            return hit.value().clone();
        }
        let lemma = self.inner.normalize_word(word);
        if self.cache.len() >= self.capacity {
            self.cache.clear();
        }
        self.cache.insert(word.to_string(), lemma.clone());
        lemma
    }
}
