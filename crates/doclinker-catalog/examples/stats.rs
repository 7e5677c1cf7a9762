use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use doclinker_catalog::{LoadMode, Sources};

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let glossary = args.next().map(PathBuf::from).context(
        "usage: cargo run -p doclinker-catalog --example stats -- <glossary.json> [catalog.json]",
    )?;
    let catalog = args.next().map(PathBuf::from);

    let sources = Sources::load_with_mode(Some(&glossary), catalog.as_deref(), LoadMode::Mmap)
        .with_context(|| format!("loading sources from {}", glossary.display()))?;

    let titled = sources.terms().iter().filter(|t| t.title.is_some()).count();
    let with_id = sources.terms().iter().filter(|t| t.id.is_some()).count();
    let dated = sources
        .references()
        .iter()
        .filter(|r| r.date.is_some())
        .count();

    println!("Glossary      : {}", glossary.display());
    println!("Terms         : {}", sources.term_count());
    println!("  with title  : {}", titled);
    println!("  with id     : {}", with_id);
    if let Some(catalog) = &catalog {
        println!("Catalog       : {}", catalog.display());
    }
    println!("References    : {}", sources.reference_count());
    println!("  numbered    : {}", sources.numbered_reference_count());
    println!("  dated       : {}", dated);

    Ok(())
}
