//! Markup builders and the idempotent span inserter.

use std::ops::Range;

use bitvec::prelude::*;
use doclinker_types::{ItemId, Span};
use tracing::debug;

pub const DOCUMENT_PATH: &str = "/library/e-library/document/";
pub const CHAPTER_PATH: &str = "/library/ipoz/document";
pub const ANCHOR_CLOSE: &str = "</a>";
pub const GLOSSARY_CLOSE: &str = "</span>";

// Length, in characters, of the document-link tail used to spot an existing link.
const DOCUMENT_PROBE_CHARS: usize = 15;

/// Opening and closing markup for one span, plus the probes that tell whether
/// the span is wrapped in it already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub span: Span,
    pub open: String,
    pub close: String,
    left_probe: String,
    right_probe: String,
}

impl Annotation {
    pub fn glossary(span: Span, id: &ItemId) -> Self {
        let id = escape_attr(&id.to_string());
        Self {
            span,
            open: format!(r#"<span class="abbr" data-glossary-item-id="{id}">"#),
            close: GLOSSARY_CLOSE.to_string(),
            left_probe: format!(r#"data-glossary-item-id="{id}">"#),
            right_probe: GLOSSARY_CLOSE.to_string(),
        }
    }

    pub fn document(span: Span, id: &ItemId) -> Self {
        let href = format!("{DOCUMENT_PATH}{}", escape_attr(&id.to_string()));
        let open = format!(r#"<a data-mce-href="{href}" href="{href}">"#);
        let skip = open.chars().count().saturating_sub(DOCUMENT_PROBE_CHARS);
        Self {
            span,
            left_probe: open.chars().skip(skip).collect(),
            open,
            close: ANCHOR_CLOSE.to_string(),
            right_probe: ANCHOR_CLOSE.to_string(),
        }
    }

    /// `anchor` is the fragment of the section, e.g. `#chapter3_1`.
    pub fn chapter(span: Span, anchor: &str) -> Self {
        let anchor = escape_attr(anchor);
        let open = format!(
            concat!(
                r#"<a data-expl-link="true" data-expl-link-anchor="{anchor}" "#,
                r#"data-expl-link-doc-title="" data-expl-link-target-type="ipoz" "#,
                r#"data-mce-href="document{anchor}" href="{path}{anchor}">"#
            ),
            anchor = anchor,
            path = CHAPTER_PATH,
        );
        Self {
            span,
            left_probe: open.clone(),
            open,
            close: ANCHOR_CLOSE.to_string(),
            right_probe: ANCHOR_CLOSE.to_string(),
        }
    }

    /// True when `text` already carries this markup around the span.
    fn is_applied(&self, text: &str) -> bool {
        let bytes = text.as_bytes();
        self.span.start <= self.span.end
            && self.span.end <= bytes.len()
            && bytes[..self.span.start].ends_with(self.left_probe.as_bytes())
            && bytes[self.span.end..].starts_with(self.right_probe.as_bytes())
    }
}

/// Result of one insertion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inserted {
    pub html: String,
    /// Annotations whose markup was written.
    pub applied: usize,
    /// Annotations skipped because the markup was already there.
    pub present: usize,
    /// Annotations dropped as invalid or overlapping.
    pub rejected: usize,
}

/// Wrap each annotation's span in its markup.
///
/// Annotations are applied from the end of the text backwards, so every span
/// refers to the original `text`. An annotation is skipped when its span is
/// empty, out of bounds, not on a character boundary, overlaps one applied
/// already, or is already wrapped in identical markup. Running the same
/// annotations over the output again therefore changes nothing.
pub fn insert_annotations(text: &str, mut annotations: Vec<Annotation>) -> Inserted {
    annotations.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    let mut pieces: Vec<&str> = Vec::with_capacity(annotations.len() * 4 + 1);
    let mut cursor = text.len();
    // Start of the leftmost span handled so far, written or already present.
    let mut floor = text.len();
    let mut result = Inserted::default();

    for annotation in &annotations {
        let Span { start, end } = annotation.span;
        if start >= end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            debug!("rejected annotation with span {start}..{end}");
            result.rejected += 1;
            continue;
        }
        if end > floor {
            debug!("rejected annotation {start}..{end} overlapping {floor}");
            result.rejected += 1;
            continue;
        }
        floor = start;
        if annotation.is_applied(text) {
            result.present += 1;
            continue;
        }
        pieces.push(&text[end..cursor]);
        pieces.push(&annotation.close);
        pieces.push(&text[start..end]);
        pieces.push(&annotation.open);
        cursor = start;
        result.applied += 1;
    }
    pieces.push(&text[..cursor]);

    let capacity = pieces.iter().map(|p| p.len()).sum();
    let mut html = String::with_capacity(capacity);
    for piece in pieces.iter().rev() {
        html.push_str(piece);
    }
    result.html = html;
    result
}

/// Bytes of `text` that sit inside an `<a ...>...</a>` element, tags included.
pub fn anchor_mask(text: &str) -> BitVec {
    let mut mask = bitvec![0; text.len()];
    for range in anchor_ranges(text) {
        mask[range].fill(true);
    }
    mask
}

fn anchor_ranges(text: &str) -> Vec<Range<usize>> {
    let lower = text.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some(found) = lower[pos..].find("<a") {
        let start = pos + found;
        let after = lower.as_bytes().get(start + 2).copied();
        if !matches!(after, Some(b'>' | b' ' | b'\t' | b'\n' | b'\r')) {
            pos = start + 2;
            continue;
        }
        let end = lower[start..]
            .find(ANCHOR_CLOSE)
            .map_or(text.len(), |close| start + close + ANCHOR_CLOSE.len());
        ranges.push(start..end);
        pos = end;
    }
    ranges
}

/// Byte range of the content between `<body ...>` and `</body>`.
pub fn body_range(html: &str) -> Option<Range<usize>> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<body")?;
    let after = lower.as_bytes().get(open + 5).copied();
    if !matches!(after, Some(b'>' | b' ' | b'\t' | b'\n' | b'\r')) {
        return None;
    }
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</body")?;
    Some(content_start..content_end)
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glossary_at(text: &str, needle: &str, id: i64) -> Annotation {
        let start = text.find(needle).expect("needle");
        Annotation::glossary(Span::new(start, start + needle.len()), &ItemId::Int(id))
    }

    #[test]
    fn wraps_spans_in_reverse_order() {
        let text = "ЦБ и Минфин";
        let out = insert_annotations(
            text,
            vec![glossary_at(text, "ЦБ", 1), glossary_at(text, "Минфин", 2)],
        );
        assert_eq!(
            out.html,
            concat!(
                r#"<span class="abbr" data-glossary-item-id="1">ЦБ</span> и "#,
                r#"<span class="abbr" data-glossary-item-id="2">Минфин</span>"#
            )
        );
        assert_eq!(out.applied, 2);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let text = "письмо № 12";
        let start = text.find('№').unwrap();
        let annotation = Annotation::document(Span::new(start, text.len()), &ItemId::Int(9));
        let first = insert_annotations(text, vec![annotation]);
        assert_eq!(
            first.html,
            r#"письмо <a data-mce-href="/library/e-library/document/9" href="/library/e-library/document/9">№ 12</a>"#
        );

        let start = first.html.find('№').unwrap();
        let again = Annotation::document(Span::new(start, start + "№ 12".len()), &ItemId::Int(9));
        let second = insert_annotations(&first.html, vec![again]);
        assert_eq!(second.html, first.html);
        assert_eq!(second.present, 1);
        assert_eq!(second.applied, 0);
    }

    #[test]
    fn chapter_markup_has_anchor_everywhere() {
        let a = Annotation::chapter(Span::new(0, 3), "#chapter3_1");
        assert!(a.open.contains(r##"data-expl-link-anchor="#chapter3_1""##));
        assert!(a.open.contains(r#"data-mce-href="document#chapter3_1""#));
        assert!(a.open.ends_with(r#"href="/library/ipoz/document#chapter3_1">"#));
    }

    #[test]
    fn rejects_invalid_and_overlapping_spans() {
        let text = "абв где";
        let id = ItemId::Int(1);
        let out = insert_annotations(
            text,
            vec![
                Annotation::glossary(Span::new(0, 6), &id),
                Annotation::glossary(Span::new(2, 8), &id),
                Annotation::glossary(Span::new(1, 2), &id),
                Annotation::glossary(Span::new(5, 5), &id),
                Annotation::glossary(Span::new(7, 99), &id),
            ],
        );
        assert_eq!(out.applied, 1);
        assert_eq!(out.rejected, 4);
        assert!(out.html.starts_with(r#"<span class="abbr" data-glossary-item-id="1">абв</span>"#));
    }

    #[test]
    fn reversed_span_is_rejected_without_panicking() {
        let text = "абв";
        let reversed = Annotation::glossary(Span::new(40, 2), &ItemId::Int(1));
        assert!(!reversed.is_applied(text));
        let out = insert_annotations(text, vec![reversed]);
        assert_eq!(out.rejected, 1);
        assert_eq!(out.html, text);
    }

    #[test]
    fn escapes_text_ids() {
        let a = Annotation::glossary(Span::new(0, 1), &ItemId::from(r#"a"b"#));
        assert!(a.open.contains(r#"data-glossary-item-id="a&quot;b""#));
    }

    #[test]
    fn masks_anchor_elements() {
        let text = r#"x <a href="/d">ЦБ</a> y <abbr>z</abbr>"#;
        let mask = anchor_mask(text);
        let inside = text.find("ЦБ").unwrap();
        assert!(mask[inside]);
        assert!(!mask[0]);
        assert!(!mask[text.find("z").unwrap()]);
    }

    #[test]
    fn finds_body_content() {
        let html = "<html><BODY class=\"x\">hi</body></html>";
        let range = body_range(html).expect("body");
        assert_eq!(&html[range], "hi");
        assert!(body_range("<p>no body</p>").is_none());
        assert!(body_range("<bodyguard>").is_none());
    }
}
