//! Grammar for references to other documents and to sections of the current one.
//!
//! Six families are tried in a fixed order (see [`Family::ALL`]). Detection
//! runs on an offset-preserving lower-cased copy of the text, so every span
//! indexes the original string and numbers keep their original case.

use doclinker_morph::fold_case;
use doclinker_types::{Span, date_to_iso};
use regex::{Match, Regex};
use tracing::debug;

use crate::error::LinkError;
use crate::references::{ChapterReference, DocumentReference, Family, Reference};

const NUMBER: &str = r"№+\s*[\w/-]+";
const DATE: &str = r"\d{1,2}\.\d{1,2}\.\d{4}";
const MONTHS: &str = r"(?:январ\w*|феврал\w*|март\w*|апрел\w*|ма\w*|июн\w*|июл\w*|август\w*|сентябр\w*|октябр\w*|ноябр\w*|декабр\w*)";
const YEAR_WORD: &str = r"\s*(?:год\w*|г\.)*";
const CHAPTER_KEYWORD: &str = r"(?:раздел\w*|пункт\w*|п\.+|подпункт\w*|пп\.+)";

/// Month stems in calendar order; the first stem a word starts with wins.
const MONTH_STEMS: [&str; 12] = [
    "январ", "феврал", "март", "апрел", "ма", "июн", "июл", "август", "сентябр", "октябр",
    "ноябр", "декабр",
];

impl Family {
    pub fn pattern(self) -> String {
        let word_date = format!(r"\d{{1,2}}\s+{MONTHS}\s+\d{{4}}{YEAR_WORD}");
        match self {
            Family::Regular => format!(r"(?:от)*\s*{DATE}\s+{NUMBER}"),
            Family::RegularInverse => format!(r"{NUMBER}\s+(?:от)*\s*{DATE}"),
            Family::WordDate => format!(r"(?:от)?\s*{word_date}\s+{NUMBER}"),
            Family::WordDateInverse => format!(r"{NUMBER}\s+(?:от)?\s*{word_date}"),
            Family::Short => NUMBER.to_string(),
            Family::Chapter => format!(r"{CHAPTER_KEYWORD}\s*(?:\d+[\s,.и]*)+"),
        }
    }
}

/// Compiled reference grammar, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct ReferencePatterns {
    combined: Regex,
    families: [Regex; 6],
    number: Regex,
    date: Regex,
    word_date: Regex,
    chapter_index: Regex,
}

impl ReferencePatterns {
    pub fn new() -> Result<Self, LinkError> {
        let combined = Family::ALL
            .iter()
            .map(|family| format!("(?:{})", family.pattern()))
            .collect::<Vec<_>>()
            .join("|");
        let families: [Regex; 6] = array_init::try_array_init(|i| {
            Regex::new(&format!("^(?:{})$", Family::ALL[i].pattern()))
        })?;
        Ok(Self {
            combined: Regex::new(&combined)?,
            families,
            number: Regex::new(NUMBER)?,
            date: Regex::new(DATE)?,
            word_date: Regex::new(&format!(
                r"(\d{{1,2}})\s+({MONTHS})\s+(\d{{4}}){YEAR_WORD}"
            ))?,
            chapter_index: Regex::new(r"\d+(?:\.\d+)*")?,
        })
    }

    /// First family, in detection order, that matches `hit` from end to end.
    pub fn classify(&self, hit: &str) -> Option<Family> {
        Family::ALL
            .iter()
            .zip(&self.families)
            .find(|(_, regex)| regex.is_match(hit))
            .map(|(family, _)| *family)
    }

    /// Every reference in `text`, sorted by descending start offset.
    ///
    /// Document references come back unresolved. Hits whose parts cannot be
    /// extracted (no number, a date that does not parse) are skipped.
    pub fn find(&self, text: &str) -> Vec<Reference> {
        let folded = fold_case(text);
        let mut found = Vec::new();
        for hit in self.combined.find_iter(&folded) {
            let Some(family) = self.classify(hit.as_str()) else {
                debug!("reference hit {:?} fits no family", hit.as_str());
                continue;
            };
            let before = found.len();
            match family {
                Family::Chapter => self.chapters(text, hit, &mut found),
                _ => found.extend(
                    self.document(text, &folded, hit, family)
                        .map(Reference::Document),
                ),
            }
            if found.len() == before {
                debug!("reference hit {:?} ({family:?}) yielded nothing", hit.as_str());
            }
        }
        found.sort_by(|a, b| b.span().start.cmp(&a.span().start));
        found
    }

    fn document(
        &self,
        text: &str,
        folded: &str,
        hit: Match<'_>,
        family: Family,
    ) -> Option<DocumentReference> {
        let base = hit.start();
        let hit_text = hit.as_str();

        let (date, date_span) = match family {
            Family::Regular | Family::RegularInverse => {
                let m = self.date.find(hit_text)?;
                (date_to_iso(m.as_str())?, Span::new(m.start(), m.end()))
            }
            Family::WordDate | Family::WordDateInverse => {
                let caps = self.word_date.captures(hit_text)?;
                let whole = caps.get(0)?;
                let month = month_index(caps.get(2)?.as_str())?;
                let raw = format!("{}.{month}.{}", &caps[1], &caps[3]);
                (date_to_iso(&raw)?, Span::new(whole.start(), whole.end()))
            }
            Family::Short => {
                let m = self.number.find(hit_text)?;
                let span = Span::new(m.start(), m.end()).offset(base);
                let number = clean(text, span)?;
                return Some(DocumentReference::new(family, number, None, trim(folded, span)));
            }
            Family::Chapter => return None,
        };

        let span = if family.is_inverse() {
            let m = self.number.find(hit_text)?;
            Span::new(m.start(), date_span.end)
        } else {
            let m = self.number.find(&hit_text[date_span.end..])?;
            Span::new(date_span.start, date_span.end + m.end())
        };
        let number_span = self
            .number
            .find(&hit_text[span.start..span.end])
            .map(|m| Span::new(m.start(), m.end()).offset(base + span.start))?;
        let number = clean(text, number_span)?;
        let span = trim(folded, span.offset(base));
        Some(DocumentReference::new(family, number, Some(date), span))
    }

    fn chapters(&self, text: &str, hit: Match<'_>, found: &mut Vec<Reference>) {
        let base = hit.start();
        for m in self.chapter_index.find_iter(hit.as_str()) {
            let span = Span::new(m.start(), m.end()).offset(base);
            found.push(Reference::Chapter(ChapterReference {
                chapter: text[span.start..span.end].replace('.', "_"),
                span,
            }));
        }
    }
}

fn month_index(word: &str) -> Option<usize> {
    MONTH_STEMS
        .iter()
        .position(|stem| word.starts_with(stem))
        .map(|i| i + 1)
}

fn clean(text: &str, span: Span) -> Option<String> {
    let number = crate::references::clean_number(&text[span.start..span.end]);
    (!number.is_empty()).then_some(number)
}

/// Drop trailing whitespace a greedy year suffix may have swallowed.
fn trim(folded: &str, span: Span) -> Span {
    let kept = folded[span.start..span.end].trim_end().len();
    Span::new(span.start, span.start + kept)
}
