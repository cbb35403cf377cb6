// src/archiver.rs

use git2::{Cred, CredentialType, FetchOptions, RemoteCallbacks, Repository};
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;
const MIRROR_REFSPEC: &str = "+refs/*:refs/*";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: &'static str,
        status: ExitStatus,
    },
    #[error("{step} did not finish within {timeout:?}")]
    TimedOut { step: &'static str, timeout: Duration },
    #[error("archive is empty")]
    EmptyArchive,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The external tools a backup cycle relies on.
pub trait Archiver: Sync {
    /// Mirror-clones `url` into the new directory `dest`.
    fn mirror(&self, url: &str, dest: &Path) -> Result<(), ToolError>;

    /// Packs `member` (relative to `base`) into the compressed archive `dest`.
    fn package(&self, base: &Path, member: &str, dest: &Path) -> Result<(), ToolError>;
}

/// Mirrors through libgit2 and packages with `tar -z`.
#[derive(Debug, Clone)]
pub struct GitTarArchiver {
    timeout: Duration,
}

impl GitTarArchiver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Archiver for GitTarArchiver {
    fn mirror(&self, url: &str, dest: &Path) -> Result<(), ToolError> {
        let deadline = deadline_after(self.timeout);

        let mut attempts = 0;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                Cred::ssh_key_from_agent(username.unwrap_or("git"))
            } else {
                Cred::default()
            }
        });
        // Returning false aborts the transfer. Connecting itself is not
        // covered: libgit2 only calls back once the remote starts talking.
        callbacks.transfer_progress(move |_| !expired(deadline));
        callbacks.sideband_progress(move |_| !expired(deadline));
        callbacks.update_tips(move |_, _, _| !expired(deadline));

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);

        debug!(url, dest = %dest.display(), "mirroring repository");
        match fetch_mirror(url, dest, &mut fetch) {
            Err(_) if expired(deadline) => Err(ToolError::TimedOut {
                step: "mirror",
                timeout: self.timeout,
            }),
            other => other,
        }
    }

    fn package(&self, base: &Path, member: &str, dest: &Path) -> Result<(), ToolError> {
        let mut command = Command::new("tar");
        command
            .arg("-C")
            .arg(base)
            .arg("-czf")
            .arg(dest)
            .arg(member)
            .stdin(Stdio::null());
        debug!(?command, "packaging repository");
        run_with_timeout("tar", &mut command, self.timeout)
    }
}

/// `None` when the timeout is too large to represent, meaning no deadline.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Equivalent of `git clone --mirror`: a bare repository whose `origin`
/// fetches every ref onto itself.
fn fetch_mirror(url: &str, dest: &Path, fetch: &mut FetchOptions<'_>) -> Result<(), ToolError> {
    let repo = Repository::init_bare(dest)?;
    let mut remote = repo.remote_with_fetch("origin", url, MIRROR_REFSPEC)?;
    repo.config()?.set_bool("remote.origin.mirror", true)?;
    remote.fetch(&[MIRROR_REFSPEC], Some(fetch), None)?;

    if let Ok(head) = remote.default_branch() {
        if let Some(head) = head.as_str() {
            repo.set_head(head)?;
        }
    }
    Ok(())
}

/// Runs `command` to completion, killing it once `timeout` has elapsed.
fn run_with_timeout(
    program: &'static str,
    command: &mut Command,
    timeout: Duration,
) -> Result<(), ToolError> {
    let mut child = command
        .spawn()
        .map_err(|source| ToolError::Spawn { program, source })?;
    let deadline = deadline_after(timeout);

    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(ToolError::Exit { program, status })
            };
        }
        if expired(deadline) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::TimedOut {
                step: program,
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;
    use tempfile::TempDir;

    fn source_repository(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("README"), "hello").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("README")).unwrap();
            index.write().unwrap();
            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = Signature::now("Backup Test", "backup@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn mirror_creates_bare_copy_with_all_refs() {
        let source_dir = TempDir::new().unwrap();
        let source = source_repository(source_dir.path());
        let head = source.head().unwrap().peel_to_commit().unwrap();
        source.branch("feature", &head, false).unwrap();

        let scratch = TempDir::new().unwrap();
        let dest = scratch.path().join("source.git");
        let url = source_dir.path().to_str().unwrap();
        GitTarArchiver::new(Duration::from_secs(60))
            .mirror(url, &dest)
            .unwrap();

        let mirror = Repository::open_bare(&dest).unwrap();
        assert!(mirror.is_bare());
        assert!(mirror.find_reference("refs/heads/feature").is_ok());
        assert!(mirror
            .config()
            .unwrap()
            .get_bool("remote.origin.mirror")
            .unwrap());
    }

    #[test]
    fn mirror_of_missing_repository_fails() {
        let scratch = TempDir::new().unwrap();
        let missing = scratch.path().join("nothing-here");
        let result = GitTarArchiver::new(Duration::from_secs(60))
            .mirror(missing.to_str().unwrap(), &scratch.path().join("out.git"));
        assert!(matches!(result, Err(ToolError::Git(_))));
    }

    #[test]
    fn package_writes_compressed_archive() {
        let scratch = TempDir::new().unwrap();
        fs::create_dir(scratch.path().join("member.git")).unwrap();
        fs::write(scratch.path().join("member.git/HEAD"), "ref: refs/heads/main\n").unwrap();
        let dest = scratch.path().join("member.git.tar.gz");

        GitTarArchiver::new(Duration::from_secs(60))
            .package(scratch.path(), "member.git", &dest)
            .unwrap();
        assert!(fs::metadata(&dest).unwrap().len() > 0);
    }

    #[test]
    fn command_failure_reports_exit_status() {
        let mut command = Command::new("false");
        let result = run_with_timeout("false", &mut command, Duration::from_secs(5));
        assert!(matches!(result, Err(ToolError::Exit { program: "false", .. })));
    }

    #[test]
    fn slow_command_is_killed() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let result = run_with_timeout("sleep", &mut command, Duration::from_millis(200));
        assert!(matches!(result, Err(ToolError::TimedOut { .. })));
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        let timeout = Duration::from_secs(u64::MAX);
        assert_eq!(deadline_after(timeout), None);
        assert!(!expired(None));
        assert!(expired(Some(Instant::now())));

        let mut command = Command::new("true");
        assert!(run_with_timeout("true", &mut command, timeout).is_ok());
    }

    #[test]
    fn mirror_with_huge_timeout_still_fetches() {
        let source_dir = TempDir::new().unwrap();
        source_repository(source_dir.path());
        let scratch = TempDir::new().unwrap();
        let dest = scratch.path().join("source.git");
        GitTarArchiver::new(Duration::from_secs(u64::MAX))
            .mirror(source_dir.path().to_str().unwrap(), &dest)
            .unwrap();
        assert!(Repository::open_bare(&dest).is_ok());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut command = Command::new("definitely-not-an-installed-tool");
        let result = run_with_timeout("tool", &mut command, Duration::from_secs(1));
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
    }
}
