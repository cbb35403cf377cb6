// src/storage.rs

use crate::model::Date;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Dated archives on disk: `<root>/<repository id>/<YYYY-MM-DD>.tar.gz`
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Creates the repository's archive directory if it does not exist yet.
    pub fn ensure(&self, id: &str) -> io::Result<PathBuf> {
        let folder = self.folder(id);
        if !folder.is_dir() {
            fs::create_dir(&folder)?;
            debug!(id, path = %folder.display(), "created archive directory");
        }
        Ok(folder)
    }

    pub fn path_for(&self, id: &str, date: Date) -> PathBuf {
        self.folder(id).join(format!("{date}{ARCHIVE_SUFFIX}"))
    }

    /// Dates of the archives present for `id`. Foreign files are ignored.
    pub fn list_dates(&self, id: &str) -> io::Result<BTreeSet<Date>> {
        let mut dates = BTreeSet::new();
        for entry in fs::read_dir(self.folder(id))? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(date) = file_name.to_str().and_then(parse_archive_name) else {
                continue;
            };
            dates.insert(date);
        }
        Ok(dates)
    }

    /// Removes the archives for `dates`, carrying on past individual failures.
    /// Returns the dates that could not be removed.
    pub fn delete_dates<'a>(
        &self,
        id: &str,
        dates: impl IntoIterator<Item = &'a Date>,
    ) -> BTreeSet<Date> {
        let mut failed = BTreeSet::new();
        for &date in dates {
            let path = self.path_for(id, date);
            match fs::remove_file(&path) {
                Ok(()) => debug!(id, path = %path.display(), "deleted archive"),
                Err(e) => {
                    warn!(id, path = %path.display(), error = %e, "could not delete archive");
                    failed.insert(date);
                }
            }
        }
        failed
    }

    /// Moves a finished archive into place for `date`, copying when the
    /// staging area lives on another filesystem.
    pub fn install(&self, id: &str, date: Date, staged: &Path) -> io::Result<PathBuf> {
        let target = self.path_for(id, date);
        if fs::rename(staged, &target).is_err() {
            fs::copy(staged, &target)?;
            fs::remove_file(staged)?;
        }
        Ok(target)
    }
}

/// Only canonical names count: a stem that does not print back identically
/// would be deleted under a different path.
fn parse_archive_name(file_name: &str) -> Option<Date> {
    let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
    let date = Date::parse_from_str(stem, "%Y-%m-%d").ok()?;
    (date.to_string() == stem).then_some(date)
}
