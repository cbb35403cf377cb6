// src/repo_list.rs

use crate::model::{ParseDiagnostic, ParsedLine, RepositoryEntry};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, warn};

/// Lazily parses `<id> <url> <active>` lines into entries and diagnostics.
///
/// Blank lines and `#` comments produce nothing; every other line yields
/// exactly one [`ParsedLine`]. Ids are tracked for the lifetime of the
/// iterator, so a duplicate is caught no matter how far apart the lines are.
pub struct RepositoryList<I> {
    lines: I,
    line_no: usize,
    seen_ids: HashSet<String>,
}

impl RepositoryList<std::vec::IntoIter<String>> {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        Ok(Self::from_text(&fs::read_to_string(path)?))
    }

    pub fn from_text(text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(String::from).collect();
        Self::new(lines)
    }
}

impl<I> RepositoryList<I>
where
    I: Iterator<Item = String>,
{
    pub fn new(lines: impl IntoIterator<Item = String, IntoIter = I>) -> Self {
        Self {
            lines: lines.into_iter(),
            line_no: 0,
            seen_ids: HashSet::new(),
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<ParsedLine> {
        let line_no = self.line_no;
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [id, url, active] = fields[..] else {
            return Some(ParsedLine::Err(ParseDiagnostic::MalformedLine {
                line_no,
                line: line.to_string(),
            }));
        };

        if !self.seen_ids.insert(id.to_string()) {
            return Some(ParsedLine::Err(ParseDiagnostic::DuplicateId {
                line_no,
                id: id.to_string(),
                line: line.to_string(),
            }));
        }

        let entry = RepositoryEntry::new(id, url, active != "0");
        Some(match active {
            "0" | "1" => ParsedLine::Ok(entry),
            other => ParsedLine::Warn(
                entry,
                ParseDiagnostic::InvalidActiveFlag {
                    line_no,
                    value: other.to_string(),
                },
            ),
        })
    }
}

impl<I> Iterator for RepositoryList<I>
where
    I: Iterator<Item = String>,
{
    type Item = ParsedLine;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            self.line_no += 1;
            if let Some(parsed) = self.parse_line(raw.trim()) {
                return Some(parsed);
            }
        }
    }
}

/// Usable entries of a fully drained list, with diagnostic counts
#[derive(Debug, Default)]
pub struct LoadedList {
    pub entries: Vec<RepositoryEntry>,
    pub rejected: usize,
    pub warnings: usize,
}

/// Drains `parsed`, logging each diagnostic. Rejected lines are dropped;
/// entries with a warning are kept.
pub fn load_entries(parsed: impl Iterator<Item = ParsedLine>) -> LoadedList {
    let mut loaded = LoadedList::default();
    for line in parsed {
        match line {
            ParsedLine::Ok(entry) => loaded.entries.push(entry),
            ParsedLine::Warn(entry, diagnostic) => {
                warn!(id = %entry.id, "{diagnostic}; assuming repository IS active");
                loaded.warnings += 1;
                loaded.entries.push(entry);
            }
            ParsedLine::Err(diagnostic @ ParseDiagnostic::DuplicateId { .. }) => {
                error!("{diagnostic}; skipping line");
                loaded.rejected += 1;
            }
            ParsedLine::Err(diagnostic) => {
                warn!("{diagnostic}");
                loaded.rejected += 1;
            }
        }
    }
    loaded
}
