// src/error.rs

use crate::archiver::ToolError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures scoped to a single repository. None of them stops the run.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("could not extract name of repository from URL {url}")]
    NameExtraction { url: String },
    #[error("{id}: could not fetch repository from URL {url}")]
    Fetch {
        id: String,
        url: String,
        #[source]
        source: ToolError,
    },
    #[error("{id}: could not store repository at {}", path.display())]
    Store {
        id: String,
        path: PathBuf,
        #[source]
        source: ToolError,
    },
    #[error("{id}: archive directory {} is unavailable", path.display())]
    StorageUnavailable {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{id}: could not list archives in {}", path.display())]
    Listing {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
