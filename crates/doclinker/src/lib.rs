pub mod error;
pub mod glossary;
pub mod handlers;
pub mod insert;
pub mod matcher;
pub mod patterns;
pub mod pipeline;
pub mod references;

pub use error::LinkError;
pub use glossary::{Glossary, TermKey, expand_term};
pub use handlers::{AppState, router};
pub use insert::{Annotation, Inserted, insert_annotations};
pub use matcher::{GlossaryMatch, find_matches, find_matches_outside};
pub use patterns::ReferencePatterns;
pub use pipeline::{LinkOptions, LinkOutcome, Linker, OwnReference, SharedNormalizer};
pub use references::{ChapterReference, DocumentReference, Family, Reference, ReferenceIndex};
