use std::collections::HashMap;

use doclinker_morph::Normalize;
use doclinker_types::{ItemId, TermRecord};
use tracing::{debug, info, warn};

use crate::error::LinkError;

/// Normalized word sequence a term is recognized by.
pub type TermKey = Vec<String>;

// Removed from every word of a term name, together with ASCII digits.
const NAME_PUNCTUATION: &str = "!#$%&'()«»*+,./:;<=>?@[\\]^_`{|}~—\"-";

/// Dictionary from normalized word sequences to glossary item ids.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    entries: HashMap<TermKey, ItemId>,
    by_first: HashMap<String, Vec<TermKey>>,
    zero_match: Vec<ItemId>,
}

/// One word of a parsed term name and whether it came from a parenthesized
/// variant group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NameWord {
    text: String,
    variant: bool,
}

impl Glossary {
    /// Build the dictionary from glossary records, in source order.
    ///
    /// A record with neither an id nor a title is rejected with its position.
    /// When two terms produce the same tuple the later record wins.
    pub fn build<N>(records: &[TermRecord], normalizer: &N) -> Result<Self, LinkError>
    where
        N: Normalize + ?Sized,
    {
        let mut entries: HashMap<TermKey, ItemId> = HashMap::new();
        let mut zero_match = Vec::new();
        let mut overridden = 0usize;

        for (position, record) in records.iter().enumerate() {
            let id = match (&record.id, &record.title) {
                (Some(id), _) => id.clone(),
                (None, Some(title)) => ItemId::Text(title.clone()),
                (None, None) => return Err(LinkError::MissingTermIdentity { position }),
            };
            let keys = match record.title.as_deref() {
                Some(title) => expand_term(title, normalizer),
                None => Vec::new(),
            };
            if keys.is_empty() {
                warn!("zero-match term {id} at position {position}");
                zero_match.push(id);
                continue;
            }
            for key in keys {
                if let Some(previous) = entries.insert(key.clone(), id.clone())
                    && previous != id
                {
                    overridden += 1;
                    debug!("term {key:?} reassigned from {previous} to {id}");
                }
            }
        }

        let mut by_first: HashMap<String, Vec<TermKey>> = HashMap::new();
        for key in entries.keys() {
            by_first.entry(key[0].clone()).or_default().push(key.clone());
        }
        for keys in by_first.values_mut() {
            keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        }

        info!(
            "glossary built: {} tuples from {} terms ({} zero-match, {} overridden)",
            entries.len(),
            records.len(),
            zero_match.len(),
            overridden
        );
        Ok(Self {
            entries,
            by_first,
            zero_match,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[String]) -> Option<&ItemId> {
        self.entries.get(key)
    }

    /// Look a tuple up by its words, e.g. `["центральный", "банк"]`.
    pub fn lookup(&self, words: &[&str]) -> Option<&ItemId> {
        let key: TermKey = words.iter().map(|w| w.to_string()).collect();
        self.entries.get(&key)
    }

    /// Tuples starting with `first`, longest first, ties broken lexicographically.
    pub fn candidates(&self, first: &str) -> &[TermKey] {
        self.by_first.get(first).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Terms that produced no tuple and therefore can never match.
    pub fn zero_match_terms(&self) -> &[ItemId] {
        &self.zero_match
    }
}

/// Expand a term name into every word tuple it should be recognized by.
///
/// `Центральный банк (ЦБ)` yields `[центральный, банк]` and `[цб]`;
/// `Министерство (Минфин, министерство финансов) РФ` yields one tuple per
/// variant, each followed by `рф`. Empty tuples are dropped and duplicates
/// removed, keeping first-seen order.
pub fn expand_term<N>(name: &str, normalizer: &N) -> Vec<TermKey>
where
    N: Normalize + ?Sized,
{
    let normalized = normalizer.normalize_text(name.trim());
    let words = split_name(&normalized);
    let rank = words.iter().filter(|w| w.variant).count();

    let tuples = match (rank, words.last()) {
        (0, _) => vec![words_to_key(words.iter().map(|w| w.text.as_str()))],
        (1, Some(last)) if last.variant => vec![
            words_to_key(words[..words.len() - 1].iter().map(|w| w.text.as_str())),
            words_to_key([last.text.as_str()]),
        ],
        _ => combine(&fold_variants(&words)),
    };

    let mut keys: Vec<TermKey> = Vec::with_capacity(tuples.len());
    for key in tuples {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn words_to_key<'a>(words: impl IntoIterator<Item = &'a str>) -> TermKey {
    words
        .into_iter()
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

fn strip_punctuation(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_digit() && !NAME_PUNCTUATION.contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split a normalized name into mandatory words and parenthesized variants.
///
/// Outside parentheses every whitespace-separated word is mandatory. Inside a
/// group each comma-separated entry is one variant (possibly several words).
/// An unclosed `(` makes the rest of the name plain text; blank groups vanish.
fn split_name(name: &str) -> Vec<NameWord> {
    let mut words = Vec::new();
    let mut rest = name;
    loop {
        let Some(open) = rest.find('(') else {
            push_mandatory(rest, &mut words);
            break;
        };
        push_mandatory(&rest[..open], &mut words);
        let inside = &rest[open + 1..];
        let Some(close) = inside.find(')') else {
            push_mandatory(inside, &mut words);
            break;
        };
        let group = &inside[..close];
        if !group.trim().is_empty() {
            for variant in group.split(',') {
                words.push(NameWord {
                    text: strip_punctuation(variant),
                    variant: true,
                });
            }
        }
        rest = &inside[close + 1..];
    }
    words
}

fn push_mandatory(text: &str, words: &mut Vec<NameWord>) {
    for raw in text.split_whitespace() {
        let text = strip_punctuation(raw);
        if !text.is_empty() {
            words.push(NameWord {
                text,
                variant: false,
            });
        }
    }
}

/// Fold a mixed name into an ordered list of choice lists.
///
/// A variant group replaces the last mandatory word before it; mandatory
/// words further back form a fixed phrase of their own. A group with no
/// mandatory word before it is a choice list by itself.
fn fold_variants(words: &[NameWord]) -> Vec<Vec<String>> {
    let mut segments: Vec<Vec<String>> = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let end = run_end(words, i);
        if words[i].variant {
            segments.push(words[i..end].iter().map(|w| w.text.clone()).collect());
        } else if end == words.len() {
            segments.push(vec![join(&words[i..end])]);
        } else {
            let fixed: Vec<&str> = words[i..end - 1].iter().map(|w| w.text.as_str()).collect();
            if !fixed.is_empty() {
                segments.push(vec![fixed.join(" ")]);
            }
            let variants_end = run_end(words, end);
            let mut choices = vec![words[end - 1].text.clone()];
            choices.extend(
                words[end..variants_end]
                    .iter()
                    .map(|v| drop_repeated_prefix(&v.text, &fixed)),
            );
            segments.push(choices);
            i = variants_end;
            continue;
        }
        i = end;
    }
    segments
}

fn run_end(words: &[NameWord], start: usize) -> usize {
    let variant = words[start].variant;
    words[start..]
        .iter()
        .position(|w| w.variant != variant)
        .map_or(words.len(), |offset| start + offset)
}

fn join(words: &[NameWord]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove the leading words of a multi-word variant that already close the
/// fixed phrase, so `мой центральный (центральный банк)` does not yield
/// `мой центральный центральный банк`. At least one word always remains.
fn drop_repeated_prefix(variant: &str, fixed: &[&str]) -> String {
    let words: Vec<&str> = variant.split_whitespace().collect();
    if words.len() < 2 {
        return variant.to_string();
    }
    let max = fixed.len().min(words.len() - 1);
    let overlap = (1..=max)
        .rev()
        .find(|&t| words[..t] == fixed[fixed.len() - t..])
        .unwrap_or(0);
    words[overlap..].join(" ")
}

/// Cartesian product of the choice lists, each choice split into words.
fn combine(segments: &[Vec<String>]) -> Vec<TermKey> {
    let Some((head, tail)) = segments.split_first() else {
        return vec![Vec::new()];
    };
    let suffixes = combine(tail);
    head.iter()
        .flat_map(|choice| {
            suffixes.iter().map(move |suffix| {
                let mut key = words_to_key([choice.as_str()]);
                key.extend(suffix.iter().cloned());
                key
            })
        })
        .collect()
}
