// src/model.rs

use crate::error::BackupError;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Calendar date of an archive; serialized as `YYYY-MM-DD`
pub type Date = NaiveDate;

/// One configured repository. Identity is the `id`.
#[derive(Debug, Clone)]
pub struct RepositoryEntry {
    pub id: String,
    pub url: String,
    pub active: bool,
}

impl RepositoryEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>, active: bool) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            active,
        }
    }

    /// Name of the repository: the rightmost `/`-preceded path segment that
    /// contains `.git`, cut just after its last `.git`.
    pub fn name(&self) -> Result<&str, BackupError> {
        let mut segments = self.url.split('/');
        // The first piece has no '/' in front of it.
        segments.next();
        segments
            .rev()
            .find_map(|segment| match segment.rfind(".git") {
                Some(idx) if idx > 0 => Some(&segment[..idx + 4]),
                _ => None,
            })
            .ok_or_else(|| BackupError::NameExtraction {
                url: self.url.clone(),
            })
    }
}

impl PartialEq for RepositoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RepositoryEntry {}

impl Hash for RepositoryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RepositoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.id, self.url)
    }
}

/// Problem found on a single line of the repository list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// The line does not have exactly three fields
    MalformedLine { line_no: usize, line: String },
    /// The id was already used by an earlier line
    DuplicateId {
        line_no: usize,
        id: String,
        line: String,
    },
    /// The active flag is neither `0` nor `1`; the entry is treated as active
    InvalidActiveFlag { line_no: usize, value: String },
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine { line_no, line } => {
                write!(f, "line {line_no} could not be processed: {line}")
            }
            Self::DuplicateId { line_no, id, line } => {
                write!(f, "line {line_no}: repository id \"{id}\" already taken: {line}")
            }
            Self::InvalidActiveFlag { line_no, value } => {
                write!(f, "line {line_no}: unknown active value \"{value}\"")
            }
        }
    }
}

/// Result of parsing one non-skipped line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Ok(RepositoryEntry),
    /// Usable entry with a warning attached
    Warn(RepositoryEntry, ParseDiagnostic),
    /// Line rejected
    Err(ParseDiagnostic),
}

/// Where a repository's cycle ended
#[derive(Debug)]
pub enum Outcome {
    /// Archived (if active) and pruned
    Done,
    /// A step failed; later steps may still have run
    Errored(Vec<BackupError>),
}

/// Everything that happened to one repository during a run
#[derive(Debug)]
pub struct RepositoryOutcome {
    pub id: String,
    pub archived: Option<PathBuf>,
    pub deleted: BTreeSet<Date>,
    pub failed_deletions: BTreeSet<Date>,
    pub outcome: Outcome,
}

impl RepositoryOutcome {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            archived: None,
            deleted: BTreeSet::new(),
            failed_deletions: BTreeSet::new(),
            outcome: Outcome::Done,
        }
    }

    pub fn fail(&mut self, error: BackupError) {
        match &mut self.outcome {
            Outcome::Done => self.outcome = Outcome::Errored(vec![error]),
            Outcome::Errored(errors) => errors.push(error),
        }
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.outcome, Outcome::Errored(_))
    }
}

/// Aggregated result of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub repositories: Vec<RepositoryOutcome>,
    pub rejected_lines: usize,
    pub warnings: usize,
}

impl RunSummary {
    pub fn errored(&self) -> usize {
        self.repositories.iter().filter(|r| r.is_errored()).count()
    }

    pub fn archived(&self) -> usize {
        self.repositories.iter().filter(|r| r.archived.is_some()).count()
    }

    pub fn deleted(&self) -> usize {
        self.repositories.iter().map(|r| r.deleted.len()).sum()
    }

    pub fn failed_deletions(&self) -> usize {
        self.repositories.iter().map(|r| r.failed_deletions.len()).sum()
    }

    /// Ids of repositories that hit at least one error, with the error count
    pub fn failures(&self) -> Vec<(&str, usize)> {
        self.repositories
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Errored(errors) => Some((r.id.as_str(), errors.len())),
                Outcome::Done => None,
            })
            .collect()
    }
}
