use std::collections::HashMap;

use doclinker_types::{CatalogRecord, ItemId, Span, date_to_iso};
use serde::Serialize;
use tracing::{debug, info};

use crate::insert::Annotation;

/// Which grammar family recognized a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// `от 01.02.2020 № 145-ФЗ`
    Regular,
    /// `№ 145-ФЗ от 01.02.2020`
    RegularInverse,
    /// `от 5 марта 2021 г. № 12`
    WordDate,
    /// `№ 12 от 5 марта 2021 года`
    WordDateInverse,
    /// `№ 12`
    Short,
    /// `пункт 3.1, 4`
    Chapter,
}

impl Family {
    /// Detection order; the first family whose grammar matches a hit whole wins.
    pub const ALL: [Family; 6] = [
        Family::Regular,
        Family::RegularInverse,
        Family::WordDate,
        Family::WordDateInverse,
        Family::Short,
        Family::Chapter,
    ];

    pub fn is_inverse(self) -> bool {
        matches!(self, Family::RegularInverse | Family::WordDateInverse)
    }
}

/// A reference to another document, by number and optionally by date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    pub family: Family,
    /// Number as written, without `№` and whitespace.
    pub number: String,
    /// ISO `YYYY-MM-DD`.
    pub date: Option<String>,
    pub span: Span,
    resolved_id: Option<ItemId>,
}

/// A reference to a numbered section of the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReference {
    /// Section path with dots replaced by underscores, e.g. `3_1`.
    pub chapter: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Document(DocumentReference),
    Chapter(ChapterReference),
}

impl DocumentReference {
    pub fn new(family: Family, number: String, date: Option<String>, span: Span) -> Self {
        Self {
            family,
            number,
            date,
            span,
            resolved_id: None,
        }
    }

    pub fn resolved_id(&self) -> Option<&ItemId> {
        self.resolved_id.as_ref()
    }

    /// Look the reference up in `index` unless it was resolved already.
    pub fn resolve(&mut self, index: &ReferenceIndex) -> Option<&ItemId> {
        if self.resolved_id.is_none() {
            self.resolved_id = index.resolve(&self.number, self.date.as_deref()).cloned();
        }
        self.resolved_id.as_ref()
    }
}

impl ChapterReference {
    pub fn anchor(&self) -> String {
        format!("#chapter{}", self.chapter)
    }
}

impl Reference {
    pub fn span(&self) -> Span {
        match self {
            Reference::Document(doc) => doc.span,
            Reference::Chapter(chapter) => chapter.span,
        }
    }

    /// Markup for this reference; unresolved document references get none.
    pub fn annotation(&self) -> Option<Annotation> {
        match self {
            Reference::Document(doc) => doc
                .resolved_id()
                .map(|id| Annotation::document(doc.span, id)),
            Reference::Chapter(chapter) => {
                Some(Annotation::chapter(chapter.span, &chapter.anchor()))
            }
        }
    }
}

/// Strip `№` signs and all whitespace from a document number.
pub fn clean_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '№' && !c.is_whitespace())
        .collect()
}

fn number_key(raw: &str) -> String {
    clean_number(raw).to_lowercase()
}

/// Catalog of known documents keyed by number, then by ISO date.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    numbers: HashMap<String, NumberEntry>,
}

#[derive(Debug, Clone, Default)]
struct NumberEntry {
    by_date: HashMap<String, ItemId>,
    /// Id of the most recently inserted document with this number.
    latest: Option<ItemId>,
}

impl ReferenceIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from catalog records in source order.
    ///
    /// Records without a number or without an id are skipped. Dates in
    /// `D.M.YYYY` form are stored as ISO; unparseable dates are ignored.
    pub fn build(records: &[CatalogRecord]) -> Self {
        let mut index = Self::default();
        let mut skipped = 0usize;
        for record in records {
            let (Some(number), Some(id)) = (record.number.as_deref(), record.id.as_ref()) else {
                skipped += 1;
                continue;
            };
            let date = record.date.as_deref().and_then(date_to_iso);
            if !index.insert(number, date.as_deref(), id.clone()) {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!("skipped {skipped} catalog records without number or id");
        }
        info!(
            "reference index built: {} numbers from {} records",
            index.numbers.len(),
            records.len()
        );
        index
    }

    /// Add one document. Returns `false` when the number is blank.
    pub fn insert(&mut self, number: &str, date: Option<&str>, id: ItemId) -> bool {
        let key = number_key(number);
        if key.is_empty() {
            return false;
        }
        let entry = self.numbers.entry(key).or_default();
        if let Some(date) = date {
            entry.by_date.insert(date.to_string(), id.clone());
        }
        entry.latest = Some(id);
        true
    }

    /// Exact `(number, date)` hit first, then the latest document with that
    /// number, otherwise nothing.
    pub fn resolve(&self, number: &str, date: Option<&str>) -> Option<&ItemId> {
        let entry = self.numbers.get(&number_key(number))?;
        date.and_then(|d| entry.by_date.get(d))
            .or(entry.latest.as_ref())
    }

    /// Number of distinct document numbers.
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: Option<&str>, date: Option<&str>, id: i64) -> CatalogRecord {
        CatalogRecord {
            number: number.map(str::to_string),
            date: date.map(str::to_string),
            id: Some(ItemId::Int(id)),
        }
    }

    fn sample_index() -> ReferenceIndex {
        ReferenceIndex::build(&[
            record(Some("12"), Some("2020-02-01"), 7),
            record(Some("12"), None, 9),
        ])
    }

    #[test]
    fn resolves_exact_date_then_latest() {
        let index = sample_index();
        assert_eq!(index.resolve("12", Some("2020-02-01")), Some(&ItemId::Int(7)));
        assert_eq!(index.resolve("12", Some("2021-01-01")), Some(&ItemId::Int(9)));
        assert_eq!(index.resolve("12", None), Some(&ItemId::Int(9)));
        assert_eq!(index.resolve("13", Some("2020-02-01")), None);
    }

    #[test]
    fn numbers_are_case_insensitive_and_dates_normalized() {
        let index = ReferenceIndex::build(&[
            record(Some("145-ФЗ"), Some("01.02.2020"), 12),
            record(Some("№ 145-ФЗ"), Some("2021-03-05"), 13),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.resolve("145-фз", Some("2020-02-01")),
            Some(&ItemId::Int(12))
        );
        assert_eq!(index.resolve("145-ФЗ", None), Some(&ItemId::Int(13)));
    }

    #[test]
    fn skips_records_without_number_or_id() {
        let mut no_id = record(Some("5"), None, 0);
        no_id.id = None;
        let index = ReferenceIndex::build(&[record(None, None, 99), record(Some("  "), None, 1), no_id]);
        assert!(index.is_empty());
    }

    #[test]
    fn resolution_happens_once() {
        let index = sample_index();
        let mut reference = DocumentReference::new(
            Family::Short,
            "12".into(),
            None,
            Span::new(0, 4),
        );
        assert_eq!(reference.resolve(&index), Some(&ItemId::Int(9)));
        assert_eq!(reference.resolve(&ReferenceIndex::empty()), Some(&ItemId::Int(9)));
    }

    #[test]
    fn unresolved_documents_have_no_annotation() {
        let doc = DocumentReference::new(Family::Short, "1".into(), None, Span::new(0, 3));
        assert!(Reference::Document(doc).annotation().is_none());
        let chapter = ChapterReference {
            chapter: "3_1".into(),
            span: Span::new(6, 9),
        };
        assert_eq!(chapter.anchor(), "#chapter3_1");
        assert!(Reference::Chapter(chapter).annotation().is_some());
    }
}
