//! Bounded execution of external programs.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const SPAWN_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("'{program}' timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to wait for '{program}': {source}")]
    Wait { program: String, source: io::Error },
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Standard streams are discarded; callers read results from files the program writes.
pub fn run_bounded(command: &mut Command, timeout: Duration) -> Result<(), ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = spawn(command).map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                debug!(%program, "process finished");
                return Ok(());
            }
            Ok(Some(status)) => return Err(ProcessError::Failed { program, status }),
            Ok(None) if Instant::now() >= deadline => {
                // The child may exit between the check and the kill; either way it is reaped.
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::TimedOut { program, timeout });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Wait { program, source });
            }
        }
    }
}

/// Locate `program` the way `Command` will: a bare name is searched on `PATH`, anything with a
/// directory component is taken as given.
pub fn find_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() != 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

// A freshly written executable can briefly report "text file busy" while another thread's fork
// still holds its write descriptor.
fn spawn(command: &mut Command) -> io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(err)
                if err.kind() == io::ErrorKind::ExecutableFileBusy && attempts < SPAWN_RETRIES =>
            {
                attempts += 1;
                std::thread::sleep(POLL_INTERVAL);
            }
            other => return other,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn succeeds_for_zero_exit() {
        assert!(run_bounded(&mut Command::new("true"), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn reports_non_zero_exit() {
        let err = run_bounded(&mut Command::new("false"), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ProcessError::Failed { .. }));
    }

    #[test]
    fn reports_missing_program() {
        let err = run_bounded(
            &mut Command::new("/definitely/not/a/program"),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn finds_bare_names_on_path_and_explicit_paths_as_given() -> anyhow::Result<()> {
        assert!(find_program(Path::new("sh")).is_some());
        assert_eq!(find_program(Path::new("no-such-program-on-path")), None);

        let dir = tempfile::tempdir()?;
        let script = crate::test_support::write_script(dir.path(), "engine", "exit 0");
        assert_eq!(find_program(&script), Some(script.clone()));
        assert_eq!(find_program(&dir.path().join("missing")), None);
        Ok(())
    }

    #[test]
    fn kills_programs_that_outlive_the_timeout() {
        let started = Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_bounded(&mut cmd, Duration::from_millis(100)).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
