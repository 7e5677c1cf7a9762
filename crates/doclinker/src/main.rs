use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use doclinker_catalog::{LoadMode, Sources, load_layout};
use doclinker_morph::{CachedNormalizer, DEFAULT_CACHE_CAPACITY, Lexicon};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use doclinker::handlers::DEFAULT_MAX_BODY_BYTES;
use doclinker::{AppState, LinkOptions, LinkOutcome, Linker, SharedNormalizer, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";

/// Link glossary terms and document references in HTML correspondence.
#[derive(Debug, Parser)]
#[command(name = "doclinker", version)]
struct Cli {
    /// Glossary JSON: `[{"id": 7, "title": "Центральный банк (ЦБ)"}, ...]`.
    #[arg(long, env = "GLOSSARY_PATH", global = true)]
    glossary: Option<PathBuf>,
    /// Reference catalog JSON: `[{"number": "145-ФЗ", "date": "01.02.2020", "id": 12}, ...]`.
    #[arg(long, env = "CATALOG_PATH", global = true)]
    catalog: Option<PathBuf>,
    /// Lemma table, one `surface lemma` pair per line.
    #[arg(long, env = "LEXICON_PATH", global = true)]
    lexicon: Option<PathBuf>,
    /// Lemmas kept in memory before the lexicon cache starts over.
    #[arg(
        long,
        env = "LEXICON_CACHE_ENTRIES",
        default_value_t = DEFAULT_CACHE_CAPACITY,
        global = true
    )]
    lexicon_cache: usize,
    #[arg(
        long,
        env = "CATALOG_LOAD_MODE",
        default_value = "mmap",
        value_parser = parse_load_mode,
        global = true
    )]
    load_mode: LoadMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve {
        #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
        host: String,
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
        max_body_bytes: usize,
    },
    /// Link a batch of documents and write the results to a directory.
    Annotate(AnnotateArgs),
}

#[derive(Debug, Args)]
struct AnnotateArgs {
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long)]
    out_dir: PathBuf,
    #[arg(long)]
    no_glossary: bool,
    #[arg(long)]
    no_references: bool,
    #[arg(long)]
    body_only: bool,
    /// Inputs are layout JSON documents rather than raw HTML.
    #[arg(long)]
    layout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let linker = build_linker(&cli)?;

    match cli.command {
        Command::Serve {
            host,
            port,
            max_body_bytes,
        } => serve(linker, &host, port, max_body_bytes).await,
        Command::Annotate(args) => annotate(linker, args, cli.load_mode).await,
    }
}

fn build_linker(cli: &Cli) -> anyhow::Result<Arc<Linker>> {
    let start = Instant::now();
    let sources = Sources::load_with_mode(
        cli.glossary.as_deref(),
        cli.catalog.as_deref(),
        cli.load_mode,
    )?;
    info!(
        "loaded {} terms and {} catalog records ({} numbered) in {} ms (mode: {:?})",
        sources.term_count(),
        sources.reference_count(),
        sources.numbered_reference_count(),
        start.elapsed().as_millis(),
        cli.load_mode
    );

    let normalizer: SharedNormalizer = match &cli.lexicon {
        Some(path) => {
            let lexicon = Lexicon::load(path)?;
            info!("lexicon {} has {} forms", path.display(), lexicon.len());
            Arc::new(CachedNormalizer::with_capacity(lexicon, cli.lexicon_cache))
        }
        None => {
            info!("no lexicon configured, matching lower-cased words");
            Arc::new(|word: &str| word.to_lowercase())
        }
    };

    let build = Instant::now();
    let linker = Linker::from_records(sources.terms(), sources.references(), normalizer)
        .context("building linker")?;
    info!("linker built in {} ms", build.elapsed().as_millis());
    Ok(Arc::new(linker))
}

async fn serve(
    linker: Arc<Linker>,
    host: &str,
    port: u16,
    max_body_bytes: usize,
) -> anyhow::Result<()> {
    let state = AppState {
        linker,
        max_body_bytes,
    };
    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {addr} (max body {max_body_bytes} bytes)");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn annotate(linker: Arc<Linker>, args: AnnotateArgs, mode: LoadMode) -> anyhow::Result<()> {
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create {}", args.out_dir.display()))?;
    let options = LinkOptions {
        glossary: !args.no_glossary,
        references: !args.no_references,
        body_only: args.body_only,
        ..LinkOptions::default()
    };
    let layout = args.layout.then_some(mode);

    let start = Instant::now();
    let total = args.inputs.len();
    let mut tasks = Vec::with_capacity(total);
    for input in args.inputs {
        let linker = Arc::clone(&linker);
        let options = options.clone();
        let out_dir = args.out_dir.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let result = annotate_file(&linker, &input, &out_dir, &options, layout);
            (input, result)
        }));
    }

    let mut failed = 0usize;
    let (mut glossary_links, mut reference_links) = (0usize, 0usize);
    for task in tasks {
        match task.await {
            Ok((input, Ok(outcome))) => {
                info!(
                    "{}: {} glossary links, {} reference links",
                    input.display(),
                    outcome.glossary_links,
                    outcome.reference_links
                );
                glossary_links += outcome.glossary_links;
                reference_links += outcome.reference_links;
            }
            Ok((input, Err(err))) => {
                error!("{}: {err:#}", input.display());
                failed += 1;
            }
            Err(err) => {
                error!("annotation task failed: {err}");
                failed += 1;
            }
        }
    }

    info!(
        "annotated {} of {total} documents in {} ms ({glossary_links} glossary links, {reference_links} reference links)",
        total - failed,
        start.elapsed().as_millis()
    );
    if failed > 0 {
        bail!("{failed} of {total} documents failed");
    }
    Ok(())
}

fn annotate_file(
    linker: &Linker,
    input: &Path,
    out_dir: &Path,
    options: &LinkOptions,
    layout: Option<LoadMode>,
) -> anyhow::Result<LinkOutcome> {
    let outcome = match layout {
        Some(mode) => {
            let layout = load_layout(input, mode)?;
            linker.link_layout(&layout, options)?
        }
        None => {
            let html = fs::read_to_string(input)
                .with_context(|| format!("read {}", input.display()))?;
            linker.link(&html, options)?
        }
    };

    let name = input
        .file_name()
        .with_context(|| format!("{} has no file name", input.display()))?;
    let mut target = out_dir.join(name);
    if layout.is_some() {
        target.set_extension("html");
    }
    fs::write(&target, &outcome.html).with_context(|| format!("write {}", target.display()))?;
    Ok(outcome)
}

fn parse_load_mode(raw: &str) -> Result<LoadMode, String> {
    LoadMode::parse(raw).ok_or_else(|| format!("unknown load mode {raw:?}, expected mmap or owned"))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}
