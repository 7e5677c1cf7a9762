use std::path::PathBuf;

use doclinker_catalog::{LoadMode, Sources, load_layout};
use doclinker_types::ItemId;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn loads_glossary_and_catalog_in_both_modes() {
    for mode in [LoadMode::Mmap, LoadMode::Owned] {
        let glossary = fixture("glossary.json");
        let catalog = fixture("documents_data.json");
        let sources = Sources::load_with_mode(Some(&glossary), Some(&catalog), mode)
            .expect("load fixtures");

        assert_eq!(sources.term_count(), 5);
        assert_eq!(sources.reference_count(), 4);
        assert_eq!(sources.numbered_reference_count(), 3);

        let terms = sources.terms();
        assert_eq!(terms[0].id, Some(ItemId::Int(1)));
        assert_eq!(terms[1].id, Some(ItemId::Text("fin-2".into())));
        assert_eq!(terms[3].id, None);
        assert_eq!(terms[4].title, None);

        let refs = sources.references();
        assert_eq!(refs[0].number.as_deref(), Some("145-ФЗ"));
        assert_eq!(refs[0].date.as_deref(), Some("01.02.2020"));
        assert_eq!(refs[2].date, None);
    }
}

#[test]
fn missing_sources_are_empty() {
    let sources = Sources::load(None, None).expect("nothing to load");
    assert_eq!(sources.term_count(), 0);
    assert_eq!(sources.reference_count(), 0);
}

#[test]
fn missing_file_names_the_path() {
    let missing = fixture("nope.json");
    let err = Sources::load(Some(&missing), None).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("loading glossary"));
    assert!(message.contains("nope.json"));
}

#[test]
fn loads_layout_and_ignores_extra_fields() {
    let layout = load_layout(fixture("layout.json"), LoadMode::Owned).expect("layout");
    assert_eq!(layout.number.as_deref(), Some("01-15/123"));
    assert_eq!(layout.date.as_deref(), Some("2020-02-01"));
    assert!(layout.content.starts_with("<p>"));
}
