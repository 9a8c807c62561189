use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("malformed acquisition directory name {name:?}: {reason}")]
    #[diagnostic(help("acquisition folders must be named YYYY-MM-DD_hh.mm.ss__label"))]
    MalformedDirectoryName { name: String, reason: String },

    #[error("more than one {category} file in {directory}: {}", join_paths(.matches))]
    #[diagnostic(help("remove the spurious files and run the synchronization again"))]
    AmbiguousFileMatch {
        directory: Utf8PathBuf,
        category: String,
        matches: Vec<Utf8PathBuf>,
    },

    #[error("unable to extract the unit index from {path}")]
    MalformedUnitIndex { path: Utf8PathBuf },

    #[error("unable to read {path}: {reason}")]
    MissingReferencedFile { path: Utf8PathBuf, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("acquisition already cataloged: {0}")]
    AlreadyCataloged(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("request did not complete within {seconds} s")]
    DeadlineExceeded { seconds: u64 },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid acquisition time {0:?} (expected YYYY-MM-DDThh:mm:ss)")]
    InvalidTime(String),
}

impl CatalogError {
    pub fn status(&self) -> u16 {
        match self {
            CatalogError::NotFound(_) => 404,
            CatalogError::InvalidTime(_) => 400,
            CatalogError::AlreadyCataloged(_) => 409,
            CatalogError::MalformedDirectoryName { .. }
            | CatalogError::AmbiguousFileMatch { .. }
            | CatalogError::MalformedUnitIndex { .. } => 422,
            CatalogError::DeadlineExceeded { .. } => 504,
            CatalogError::MissingReferencedFile { .. }
            | CatalogError::Storage(_)
            | CatalogError::Filesystem(_)
            | CatalogError::Archive(_)
            | CatalogError::ConfigRead(_)
            | CatalogError::ConfigParse(_) => 500,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            CatalogError::Storage(_) => "unable to query the catalog".to_string(),
            CatalogError::Filesystem(_) | CatalogError::Archive(_) => {
                "unable to assemble the requested data".to_string()
            }
            CatalogError::ConfigRead(_) | CatalogError::ConfigParse(_) => {
                "service misconfigured".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Storage(err.to_string())
    }
}

fn join_paths(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
