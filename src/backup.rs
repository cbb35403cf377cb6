// src/backup.rs

use crate::archiver::{Archiver, ToolError};
use crate::error::BackupError;
use crate::model::{Date, RepositoryEntry, RepositoryOutcome, RunSummary};
use crate::storage::ArchiveStore;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn};

/// Drives the backup cycle of every repository against one keep set.
///
/// Per repository: ensure storage, archive today's mirror if the repository
/// is active, then list existing archives and delete those outside the keep
/// set. A failed fetch or store still leads to pruning; only a storage
/// directory that cannot be created skips the repository entirely.
pub struct BackupOrchestrator<'a, A> {
    archiver: &'a A,
    store: &'a ArchiveStore,
    today: Date,
    keep: &'a BTreeSet<Date>,
}

impl<'a, A: Archiver> BackupOrchestrator<'a, A> {
    pub fn new(archiver: &'a A, store: &'a ArchiveStore, today: Date, keep: &'a BTreeSet<Date>) -> Self {
        Self {
            archiver,
            store,
            today,
            keep,
        }
    }

    /// Processes all entries, on the current rayon pool when `parallel` is set.
    /// Outcomes keep the order of `entries`.
    pub fn run(&self, entries: &[RepositoryEntry], parallel: bool, bar: ProgressBar) -> RunSummary {
        let repositories: Vec<RepositoryOutcome> = if parallel {
            entries
                .par_iter()
                .progress_with(bar)
                .map(|entry| self.process(entry))
                .collect()
        } else {
            entries
                .iter()
                .progress_with(bar)
                .map(|entry| self.process(entry))
                .collect()
        };
        RunSummary {
            repositories,
            ..RunSummary::default()
        }
    }

    pub fn process(&self, entry: &RepositoryEntry) -> RepositoryOutcome {
        let _span = info_span!("repository", id = %entry.id).entered();
        let mut outcome = RepositoryOutcome::new(&entry.id);
        info!(url = %entry.url, "starting backup of repository");

        if let Err(source) = self.store.ensure(&entry.id) {
            let err = BackupError::StorageUnavailable {
                id: entry.id.clone(),
                path: self.store.folder(&entry.id),
                source,
            };
            error!(error = %err, cause = %source_of(&err), "skipping repository");
            outcome.fail(err);
            return outcome;
        }

        if entry.active {
            info!("repository is active");
            match self.archive(entry) {
                Ok(path) => {
                    info!(path = %path.display(), "stored archive");
                    outcome.archived = Some(path);
                }
                Err(err) => {
                    error!(error = %err, cause = %source_of(&err), "backup failed, pruning anyway");
                    outcome.fail(err);
                }
            }
        } else {
            info!("repository is NOT active");
        }

        let have = match self.store.list_dates(&entry.id) {
            Ok(have) => have,
            Err(source) => {
                let err = BackupError::Listing {
                    id: entry.id.clone(),
                    path: self.store.folder(&entry.id),
                    source,
                };
                error!(error = %err, cause = %source_of(&err), "cannot prune");
                outcome.fail(err);
                return outcome;
            }
        };
        debug!(count = have.len(), dates = %join(&have), "existing archives");

        let delete: BTreeSet<Date> = have.difference(self.keep).copied().collect();
        info!(count = delete.len(), dates = %join(&delete), "deleting archives");
        let failed = self.store.delete_dates(&entry.id, &delete);
        outcome.deleted = delete.difference(&failed).copied().collect();
        outcome.failed_deletions = failed;
        outcome
    }

    /// Mirrors the repository into a scratch directory and stores it as
    /// today's archive. The scratch directory is removed on every path.
    fn archive(&self, entry: &RepositoryEntry) -> Result<PathBuf, BackupError> {
        let name = entry.name()?;
        let fetch_err = |source: ToolError| BackupError::Fetch {
            id: entry.id.clone(),
            url: entry.url.clone(),
            source,
        };

        let scratch = tempfile::Builder::new()
            .prefix(&format!("rrbackup-{}-", entry.id))
            .tempdir()
            .map_err(|e| fetch_err(e.into()))?;

        debug!("download remote content");
        self.archiver
            .mirror(&entry.url, &scratch.path().join(name))
            .map_err(fetch_err)?;
        debug!(path = %scratch.path().display(), "downloaded repository");

        let target = self.store.path_for(&entry.id, self.today);
        let store_err = |source: ToolError| BackupError::Store {
            id: entry.id.clone(),
            path: target.clone(),
            source,
        };

        debug!("store downloaded repository");
        let staged = scratch.path().join(format!("{name}.tar.gz"));
        self.archiver
            .package(scratch.path(), name, &staged)
            .map_err(store_err)?;
        let path = self
            .store
            .install(&entry.id, self.today, &staged)
            .map_err(|e| store_err(e.into()))?;

        match fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => Ok(path),
            Ok(_) => {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove empty archive");
                }
                Err(store_err(ToolError::EmptyArchive))
            }
            Err(e) => Err(store_err(e.into())),
        }
    }
}

fn join(dates: &BTreeSet<Date>) -> String {
    dates
        .iter()
        .map(Date::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn source_of(err: &BackupError) -> String {
    std::error::Error::source(err).map_or_else(String::new, |s| s.to_string())
}
