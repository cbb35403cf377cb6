// src/cli.rs

use crate::model::Date;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mirror remote git repositories into dated archives", long_about = None)]
pub struct Args {
    /// Repository list: one `<id> <url> <active:0|1>` per line
    #[arg(short, long, env = "RRBACKUP_CONFIG")]
    pub config: PathBuf,

    /// Root directory holding one archive folder per repository
    #[arg(short, long, env = "RRBACKUP_STORAGE")]
    pub storage: PathBuf,

    /// Number of most recent daily archives to keep
    #[arg(long, env = "RRBACKUP_DAYS", default_value_t = 7)]
    pub days: u32,

    /// Number of weekly (Monday) archives to keep
    #[arg(long, env = "RRBACKUP_WEEKS", default_value_t = 5)]
    pub weeks: u32,

    /// Number of monthly archives to keep
    #[arg(long, env = "RRBACKUP_MONTHS", default_value_t = 12)]
    pub months: u32,

    /// Reference date for the run, defaults to the local date
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub today: Option<Date>,

    /// Seconds each mirror or packaging step may take. A mirror is only
    /// interrupted once the remote responds; connecting is not bounded
    #[arg(long, env = "RRBACKUP_TIMEOUT", default_value_t = 3600)]
    pub timeout: u64,

    /// Repositories processed concurrently
    #[arg(short, long, env = "RRBACKUP_JOBS", default_value_t = 1)]
    pub jobs: usize,

    /// Append log output to this file instead of stderr
    #[arg(long, env = "RRBACKUP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "RRBACKUP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_backup_policy() {
        let args = Args::try_parse_from(["rrbackup", "-c", "backup.list", "-s", "/srv/store"]).unwrap();
        assert_eq!((args.days, args.weeks, args.months), (7, 5, 12));
        assert_eq!(args.jobs, 1);
        assert!(args.today.is_none());
    }

    #[test]
    fn today_is_parsed_as_date() {
        let args = Args::try_parse_from([
            "rrbackup",
            "-c",
            "backup.list",
            "-s",
            "/srv/store",
            "--today",
            "2024-01-17",
        ])
        .unwrap();
        assert_eq!(args.today, Some("2024-01-17".parse().unwrap()));
        assert!(Args::try_parse_from(["rrbackup", "-c", "a", "-s", "b", "--today", "17.01.2024"]).is_err());
    }
}
