use std::sync::Arc;

use doclinker_morph::Normalize;
use doclinker_types::{CatalogRecord, DocumentLayout, TermRecord, date_to_iso};
use tracing::{debug, info};

use crate::error::LinkError;
use crate::glossary::Glossary;
use crate::insert::{Annotation, anchor_mask, body_range, insert_annotations};
use crate::matcher::find_matches_outside;
use crate::patterns::ReferencePatterns;
use crate::references::{Reference, ReferenceIndex, clean_number};

pub type SharedNormalizer = Arc<dyn Normalize + Send + Sync>;

/// Which passes to run over a document and what it is called itself.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub glossary: bool,
    pub references: bool,
    /// Only touch the content of `<body>`; a document without one is an error.
    pub body_only: bool,
    /// The document's own number; references to it are not linked.
    pub number: Option<String>,
    pub date: Option<String>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            glossary: true,
            references: true,
            body_only: false,
            number: None,
            date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    pub html: String,
    pub glossary_links: usize,
    pub reference_links: usize,
}

/// The document's own identity, used to skip self-references.
#[derive(Debug, Clone)]
pub struct OwnReference {
    number: String,
    date: Option<String>,
}

impl OwnReference {
    pub fn new(number: &str, date: Option<&str>) -> Option<Self> {
        let number = clean_number(number).to_lowercase();
        if number.is_empty() {
            return None;
        }
        Some(Self {
            number,
            date: date.and_then(date_to_iso),
        })
    }

    fn matches(&self, number: &str, date: Option<&str>) -> bool {
        number.to_lowercase() == self.number
            && match (self.date.as_deref(), date) {
                (Some(own), Some(other)) => own == other,
                _ => true,
            }
    }
}

/// Everything needed to link documents; immutable once built and safe to
/// share between worker threads.
pub struct Linker {
    glossary: Glossary,
    index: ReferenceIndex,
    patterns: ReferencePatterns,
    normalizer: SharedNormalizer,
}

impl Linker {
    pub fn new(
        glossary: Glossary,
        index: ReferenceIndex,
        patterns: ReferencePatterns,
        normalizer: SharedNormalizer,
    ) -> Self {
        Self {
            glossary,
            index,
            patterns,
            normalizer,
        }
    }

    /// Build the glossary, the reference index and the grammar from raw records.
    pub fn from_records(
        terms: &[TermRecord],
        catalog: &[CatalogRecord],
        normalizer: SharedNormalizer,
    ) -> Result<Self, LinkError> {
        let glossary = Glossary::build(terms, &*normalizer)?;
        let index = ReferenceIndex::build(catalog);
        let patterns = ReferencePatterns::new()?;
        info!(
            "linker ready: {} glossary tuples, {} document numbers",
            glossary.len(),
            index.len()
        );
        Ok(Self::new(glossary, index, patterns, normalizer))
    }

    pub fn glossary(&self) -> &Glossary {
        &self.glossary
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    /// Detect references in `text` and resolve the document ones.
    pub fn detect_references(&self, text: &str) -> Vec<Reference> {
        let mut references = self.patterns.find(text);
        for reference in &mut references {
            if let Reference::Document(doc) = reference {
                doc.resolve(&self.index);
            }
        }
        references
    }

    /// Link document and chapter references. Unresolved documents stay plain.
    pub fn link_references(&self, text: &str, own: Option<&OwnReference>) -> LinkOutcome {
        let annotations: Vec<Annotation> = self
            .detect_references(text)
            .iter()
            .filter(|reference| match (reference, own) {
                (Reference::Document(doc), Some(own)) => {
                    let own_hit = own.matches(&doc.number, doc.date.as_deref());
                    if own_hit {
                        debug!("skipping self-reference {}", doc.number);
                    }
                    !own_hit
                }
                _ => true,
            })
            .filter_map(Reference::annotation)
            .collect();
        let inserted = insert_annotations(text, annotations);
        debug!(
            "references: {} linked, {} present, {} rejected",
            inserted.applied, inserted.present, inserted.rejected
        );
        LinkOutcome {
            html: inserted.html,
            glossary_links: 0,
            reference_links: inserted.applied,
        }
    }

    /// Wrap glossary terms, leaving anything inside an existing link alone.
    /// A term that would run into a link gives way to a shorter one that fits.
    pub fn link_glossary(&self, text: &str) -> LinkOutcome {
        let covered = anchor_mask(text);
        let annotations: Vec<Annotation> =
            find_matches_outside(text, &self.glossary, &*self.normalizer, &covered)
                .iter()
                .map(|m| Annotation::glossary(m.span, &m.id))
                .collect();
        let inserted = insert_annotations(text, annotations);
        LinkOutcome {
            html: inserted.html,
            glossary_links: inserted.applied,
            reference_links: 0,
        }
    }

    /// Run the enabled passes over `html`: references first, then glossary.
    pub fn link(&self, html: &str, options: &LinkOptions) -> Result<LinkOutcome, LinkError> {
        let range = if options.body_only {
            body_range(html).ok_or(LinkError::MissingBody)?
        } else {
            0..html.len()
        };
        let own = options
            .number
            .as_deref()
            .and_then(|number| OwnReference::new(number, options.date.as_deref()));

        let mut outcome = LinkOutcome {
            html: html[range.clone()].to_string(),
            ..LinkOutcome::default()
        };
        if options.references {
            let pass = self.link_references(&outcome.html, own.as_ref());
            outcome.reference_links = pass.reference_links;
            outcome.html = pass.html;
        }
        if options.glossary {
            let pass = self.link_glossary(&outcome.html);
            outcome.glossary_links = pass.glossary_links;
            outcome.html = pass.html;
        }

        if options.body_only {
            let mut whole = String::with_capacity(html.len() + outcome.html.len());
            whole.push_str(&html[..range.start]);
            whole.push_str(&outcome.html);
            whole.push_str(&html[range.end..]);
            outcome.html = whole;
        }
        Ok(outcome)
    }

    /// Link a layout collaborator's document, taking its own number and date
    /// from the layout unless `options` already name them.
    pub fn link_layout(
        &self,
        layout: &DocumentLayout,
        options: &LinkOptions,
    ) -> Result<LinkOutcome, LinkError> {
        let options = LinkOptions {
            number: options.number.clone().or_else(|| layout.number.clone()),
            date: options.date.clone().or_else(|| layout.date.clone()),
            ..options.clone()
        };
        self.link(&layout.content, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doclinker_types::ItemId;

    fn stem(word: &str) -> String {
        let lower = word.to_lowercase();
        match lower.as_str() {
            "банка" | "банком" => "банк".into(),
            "центрального" => "центральный".into(),
            "отчёта" => "отчёт".into(),
            _ => lower,
        }
    }

    fn linker() -> Linker {
        let terms = vec![
            TermRecord {
                id: Some(ItemId::Int(1)),
                title: Some("Центральный банк (ЦБ)".into()),
            },
            TermRecord {
                id: Some(ItemId::Int(3)),
                title: Some("annual report".into()),
            },
        ];
        let catalog = vec![
            CatalogRecord {
                number: Some("12".into()),
                date: Some("2020-02-01".into()),
                id: Some(ItemId::Int(7)),
            },
            CatalogRecord {
                number: Some("12".into()),
                date: None,
                id: Some(ItemId::Int(9)),
            },
        ];
        Linker::from_records(&terms, &catalog, Arc::new(stem)).expect("linker")
    }

    #[test]
    fn resolves_by_date_then_latest() {
        let linker = linker();
        let out = linker.link_references("от 01.02.2020 № 12 и № 12 и № 13", None);
        assert_eq!(out.reference_links, 2);
        assert!(out.html.contains(r#"href="/library/e-library/document/7">01.02.2020 № 12</a>"#));
        assert!(out.html.contains(r#"href="/library/e-library/document/9">№ 12</a>"#));
        assert!(out.html.ends_with("№ 13"));
    }

    #[test]
    fn links_glossary_across_markup() {
        let linker = linker();
        let out = linker.link_glossary("the annual <br/> report");
        assert_eq!(
            out.html,
            r#"the <span class="abbr" data-glossary-item-id="3">annual <br/> report</span>"#
        );
    }

    #[test]
    fn second_run_changes_nothing() {
        let linker = linker();
        let text = "Письмо Центрального банка № 12 от 01.02.2020, пункт 3.1.";
        let once = linker.link(text, &LinkOptions::default()).expect("link");
        assert_eq!(once.glossary_links, 1);
        assert_eq!(once.reference_links, 2);
        let twice = linker.link(&once.html, &LinkOptions::default()).expect("link");
        assert_eq!(twice.html, once.html);
        assert_eq!(twice.glossary_links + twice.reference_links, 0);
    }

    #[test]
    fn glossary_skips_terms_inside_links() {
        let linker = linker();
        let text = r#"<a href="/x">ЦБ</a> и ЦБ"#;
        let out = linker.link_glossary(text);
        assert_eq!(out.glossary_links, 1);
        assert!(out.html.starts_with(r#"<a href="/x">ЦБ</a> и <span"#));
    }

    #[test]
    fn shorter_term_is_linked_when_the_longer_one_runs_into_a_link() {
        let terms = vec![
            TermRecord {
                id: Some(ItemId::Int(1)),
                title: Some("банк".into()),
            },
            TermRecord {
                id: Some(ItemId::Int(2)),
                title: Some("банк россии".into()),
            },
        ];
        let linker = Linker::from_records(&terms, &[], Arc::new(stem)).expect("linker");
        let out = linker.link_glossary(r#"банк <a href="/d">России</a>"#);
        assert_eq!(out.glossary_links, 1);
        assert_eq!(
            out.html,
            r#"<span class="abbr" data-glossary-item-id="1">банк</span> <a href="/d">России</a>"#
        );
    }

    #[test]
    fn body_only_leaves_head_alone() {
        let linker = linker();
        let html = "<html><head><title>ЦБ</title></head><body>ЦБ</body></html>";
        let options = LinkOptions {
            body_only: true,
            ..LinkOptions::default()
        };
        let out = linker.link(html, &options).expect("link");
        assert!(out.html.starts_with("<html><head><title>ЦБ</title></head><body><span"));
        assert!(out.html.ends_with("</span></body></html>"));

        let err = linker.link("<p>ЦБ</p>", &options).unwrap_err();
        assert!(matches!(err, LinkError::MissingBody));
    }

    #[test]
    fn own_number_is_not_linked() {
        let linker = linker();
        let layout = DocumentLayout {
            content: "Письмо № 12 от 01.02.2020 ссылается на № 12".into(),
            number: Some("№ 12".into()),
            date: Some("01.02.2020".into()),
        };
        let options = LinkOptions {
            glossary: false,
            ..LinkOptions::default()
        };
        let out = linker.link_layout(&layout, &options).expect("link");
        assert_eq!(out.reference_links, 0);
        assert_eq!(out.html, layout.content);
    }

    #[test]
    fn passes_can_be_disabled() {
        let linker = linker();
        let options = LinkOptions {
            glossary: false,
            references: false,
            ..LinkOptions::default()
        };
        let out = linker.link("ЦБ № 12", &options).expect("link");
        assert_eq!(out.html, "ЦБ № 12");
    }
}
