//! Load the JSON sources the linker is built from.
//!
//! Two sources feed a linker: the glossary (a list of [`TermRecord`]s) and the
//! reference catalog (a list of [`CatalogRecord`]s). Both can be large exports,
//! so callers choose between memory-mapping the files or reading them into
//! owned buffers at runtime via [`LoadMode`]. Either source may be absent.
//!
//! Records are returned as-is; validation (a term with neither id nor title,
//! a catalog row without a number) belongs to the structures built from them.
//!
//! # Example
//! ```no_run
//! use doclinker_catalog::{LoadMode, Sources};
//!
//! # fn main() -> anyhow::Result<()> {
//! let sources = Sources::load_with_mode(
//!     Some("data/glossary.json".as_ref()),
//!     Some("data/documents_data.json".as_ref()),
//!     LoadMode::Mmap,
//! )?;
//! println!("{} terms, {} references", sources.term_count(), sources.reference_count());
//! # Ok(()) }
//! ```
//!
//! For a runnable demo, see `cargo run -p doclinker-catalog --example stats -- <glossary> <catalog>`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use doclinker_types::{CatalogRecord, DocumentLayout, TermRecord};
use memmap2::Mmap;
use serde::de::DeserializeOwned;

/// Strategy for loading source files.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map each file (no copy of the raw JSON).
    #[default]
    Mmap,
    /// Read each file into an owned buffer (portable fallback).
    Owned,
}

impl LoadMode {
    /// Parse `mmap` / `owned`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mmap" => Some(LoadMode::Mmap),
            "owned" => Some(LoadMode::Owned),
            _ => None,
        }
    }
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

/// Glossary terms and catalog records, loaded once per run.
#[derive(Debug, Default, Clone)]
pub struct Sources {
    terms: Vec<TermRecord>,
    references: Vec<CatalogRecord>,
}

impl Sources {
    /// Load both sources, memory-mapping the files.
    pub fn load(glossary: Option<&Path>, catalog: Option<&Path>) -> Result<Self> {
        Self::load_with_mode(glossary, catalog, LoadMode::Mmap)
    }

    /// Load both sources, choosing between mmap and owned buffers at runtime.
    pub fn load_with_mode(
        glossary: Option<&Path>,
        catalog: Option<&Path>,
        mode: LoadMode,
    ) -> Result<Self> {
        let terms = match glossary {
            Some(path) => load_json(path, mode)
                .with_context(|| format!("loading glossary {}", path.display()))?,
            None => Vec::new(),
        };
        let references = match catalog {
            Some(path) => load_json(path, mode)
                .with_context(|| format!("loading reference catalog {}", path.display()))?,
            None => Vec::new(),
        };
        Ok(Self { terms, references })
    }

    pub fn terms(&self) -> &[TermRecord] {
        &self.terms
    }

    pub fn references(&self) -> &[CatalogRecord] {
        &self.references
    }

    /// Number of glossary records, including ones that later yield no tuples.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Number of catalog records that carry a document number.
    pub fn numbered_reference_count(&self) -> usize {
        self.references
            .iter()
            .filter(|r| r.number.as_deref().is_some_and(|n| !n.trim().is_empty()))
            .count()
    }
}

/// Load the layout collaborator's output for a single document.
pub fn load_layout(path: impl AsRef<Path>, mode: LoadMode) -> Result<DocumentLayout> {
    let path = path.as_ref();
    load_json(path, mode).with_context(|| format!("loading layout {}", path.display()))
}

fn load_json<T: DeserializeOwned>(path: &Path, mode: LoadMode) -> Result<T> {
    let buffer = load_file(path, mode)?;
    let bytes = strip_bom(buffer.as_slice());
    serde_json::from_slice(bytes).with_context(|| format!("parse json {}", path.display()))
}

fn load_file(path: &Path, mode: LoadMode) -> Result<Buffer> {
    match mode {
        LoadMode::Mmap => {
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            // Zero-length files cannot be mapped on every platform.
            let len = file
                .metadata()
                .with_context(|| format!("stat {}", path.display()))?
                .len();
            if len == 0 {
                return Ok(Buffer::Owned(Vec::new()));
            }
            unsafe { Mmap::map(&file) }
                .map(Buffer::Mmap)
                .with_context(|| format!("mmap {}", path.display()))
        }
        LoadMode::Owned => {
            let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            Ok(Buffer::Owned(buf))
        }
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
