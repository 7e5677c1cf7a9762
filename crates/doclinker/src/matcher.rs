use std::collections::HashMap;
use std::ops::Range;

use bitvec::slice::BitSlice;
use doclinker_morph::{Normalize, tokenize};
use doclinker_types::{ItemId, Span};
use tracing::debug;

use crate::glossary::Glossary;

/// A glossary term found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryMatch {
    /// Byte range in the document, from the first matched word to the last.
    pub span: Span,
    /// Token range the match covers (gaps between the words included).
    pub tokens: Range<usize>,
    pub id: ItemId,
}

struct Word {
    token: usize,
    lemma: String,
}

/// Find every glossary term in `text`, scanning left to right.
///
/// Gaps between words (spaces, punctuation, markup) are transparent, so
/// `annual <br/> report` matches the term `annual report`. At each word the
/// longest candidate tuple wins; after a match the scan resumes behind it, so
/// matches never overlap. Each distinct word form is normalized once.
pub fn find_matches<N>(text: &str, glossary: &Glossary, normalizer: &N) -> Vec<GlossaryMatch>
where
    N: Normalize + ?Sized,
{
    scan(text, glossary, normalizer, None)
}

/// Like [`find_matches`], but a candidate whose span touches a byte set in
/// `blocked` is passed over in favour of the next shorter one.
///
/// `blocked` must be at least as long as `text`.
pub fn find_matches_outside<N>(
    text: &str,
    glossary: &Glossary,
    normalizer: &N,
    blocked: &BitSlice,
) -> Vec<GlossaryMatch>
where
    N: Normalize + ?Sized,
{
    scan(text, glossary, normalizer, Some(blocked))
}

fn scan<N>(
    text: &str,
    glossary: &Glossary,
    normalizer: &N,
    blocked: Option<&BitSlice>,
) -> Vec<GlossaryMatch>
where
    N: Normalize + ?Sized,
{
    if glossary.is_empty() {
        return Vec::new();
    }

    let tokens = tokenize(text);
    let mut lemmas: HashMap<&str, String> = HashMap::new();
    let words: Vec<Word> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| token.is_word())
        .map(|(index, token)| {
            let surface = token.text(text);
            let lemma = lemmas
                .entry(surface)
                .or_insert_with(|| normalizer.normalize_word(surface))
                .clone();
            Word {
                token: index,
                lemma,
            }
        })
        .collect();
    debug!(
        "normalized {} distinct forms for {} words",
        lemmas.len(),
        words.len()
    );

    let mut matches = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let rest = &words[i..];
        let hit = glossary.candidates(&rest[0].lemma).iter().find(|key| {
            if key.len() > rest.len() || !key.iter().zip(rest).all(|(k, w)| *k == w.lemma) {
                return false;
            }
            let start = tokens[rest[0].token].start;
            let end = tokens[rest[key.len() - 1].token].end;
            match blocked.and_then(|mask| mask.get(start..end)) {
                Some(bits) if bits.any() => {
                    debug!("glossary candidate at {start}..{end} runs into a link");
                    false
                }
                _ => true,
            }
        });
        let Some(key) = hit else {
            i += 1;
            continue;
        };
        let Some(id) = glossary.get(key) else {
            i += 1;
            continue;
        };
        let first = rest[0].token;
        let last = rest[key.len() - 1].token;
        matches.push(GlossaryMatch {
            span: Span::new(tokens[first].start, tokens[last].end),
            tokens: first..last + 1,
            id: id.clone(),
        });
        i += key.len();
    }
    matches
}
