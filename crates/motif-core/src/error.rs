//! Error types for motif

use thiserror::Error;

use crate::template::TemplateKind;

#[derive(Debug, Error)]
pub enum MotifError {
    #[error("Malformed {kind} template {index}: {reason}")]
    MalformedTemplate {
        kind: TemplateKind,
        index: usize,
        reason: String,
    },
    #[error("Template catalog has no {0} templates")]
    EmptyCatalog(TemplateKind),
}

pub type Result<T> = std::result::Result<T, MotifError>;
