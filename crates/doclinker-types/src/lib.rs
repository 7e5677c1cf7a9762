//! Shared types for glossary and reference linking.
//!
//! The records here mirror the JSON sources the linker consumes (glossary
//! terms, the reference catalog, the layout collaborator's output) and the
//! plain values that flow between the matching stages ([`ItemId`], [`Span`]).
//! Nothing in this crate knows about tokenization or markup.
//!
//! ```rust
//! use doclinker_types::{ItemId, Span, date_to_iso};
//!
//! let id = ItemId::from(7_i64);
//! assert_eq!(id.to_string(), "7");
//! assert!(Span::new(4, 4).is_empty());
//! assert_eq!(date_to_iso("1.2.2020").as_deref(), Some("2020-02-01"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a glossary item or catalog document.
///
/// Sources carry either integers or strings; both render verbatim into markup.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(n) => write!(f, "{n}"),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        ItemId::Int(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId::Text(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId::Text(value)
    }
}

/// Half-open byte range `[start, end)` into a document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Shift both ends by `offset` (used when a match was found in a sub-slice).
    pub fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// Glossary source record: `{"id": 7, "title": "Центральный банк (ЦБ)"}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TermRecord {
    #[serde(default)]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Reference catalog record: `{"number": "145-ФЗ", "date": "01.02.2020", "id": 12}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub id: Option<ItemId>,
}

/// Output of the layout collaborator that the linker consumes.
///
/// Only the content and the document's own number/date matter here; any other
/// fields the collaborator emits are ignored on deserialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub content: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Convert `D.M.YYYY` into `YYYY-MM-DD`; ISO dates pass through unchanged.
///
/// Returns `None` for anything that is neither.
pub fn date_to_iso(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_iso_date(raw) {
        return Some(raw.to_string());
    }

    let mut parts = raw.split('.');
    let (Some(day), Some(month), Some(year), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let day: u32 = day.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    let year: u32 = year.trim().parse().ok()?;
    Some(format!("{year:02}-{month:02}-{day:02}"))
}

fn is_iso_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}
