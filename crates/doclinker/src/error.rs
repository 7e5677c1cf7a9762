use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("glossary record {position} has neither an id nor a title")]
    MissingTermIdentity { position: usize },
    #[error("failed to compile reference grammar: {0}")]
    Pattern(#[from] regex::Error),
    #[error("document has no <body> element")]
    MissingBody,
}
