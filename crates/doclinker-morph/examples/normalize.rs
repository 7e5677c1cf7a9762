use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use doclinker_morph::{Lexicon, Normalize, tokenize};

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let lexicon_path = args.next().map(PathBuf::from).context(
        "usage: cargo run -p doclinker-morph --example normalize -- <lexicon> [--demo | <text>]",
    )?;
    let next = args.next();
    if args.next().is_some() {
        bail!("too many arguments");
    }

    let samples: Vec<String> = match next.as_deref() {
        Some("--demo") | None => vec![
            "Центрального банка Российской Федерации".into(),
            "годовой <br/> отчёт".into(),
            "Министерство финансов (Минфин, Министерство финансов России)".into(),
        ],
        Some(text) => vec![text.to_string()],
    };

    let lexicon = Lexicon::load(&lexicon_path)
        .with_context(|| format!("loading lexicon from {}", lexicon_path.display()))?;
    println!("Lexicon: {} ({} forms)", lexicon_path.display(), lexicon.len());

    for sample in samples {
        println!("\nText: {}", sample);
        for token in tokenize(&sample).iter().filter(|t| t.is_word()) {
            let surface = token.text(&sample);
            println!("  {:<16} -> {}", surface, lexicon.normalize_word(surface));
        }
        println!("  normalized: {}", lexicon.normalize_text(&sample));
    }

    Ok(())
}
