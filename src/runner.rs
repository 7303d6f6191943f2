use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use wait4::{ResUse, ResourceUsage, Wait4};

/// Measurements taken from one child process execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Wall-clock elapsed time in milliseconds, rounded to 2 decimals.
    pub time_ms: f64,
    /// Peak resident set size of the child in megabytes, rounded to
    /// 2 decimals.
    pub memory_mb: f64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The command could not be started or waited on (missing toolchain,
    /// invalid command).
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The child outlived its deadline and was forcibly killed.
    #[error("process killed after exceeding the {deadline_ms} ms deadline")]
    Timeout { deadline_ms: u64 },
}

/// Executes one command as a child process with a bounded lifetime.
///
/// The command is spawned as an argument vector in `workdir`, with stdin fed
/// from the provided buffer (or closed) and stdout/stderr captured
/// separately.  A watchdog thread SIGKILLs the child's process group once
/// the deadline passes; the child is reaped either way, so no zombie
/// survives an abandoned invocation.  Resource usage comes from `wait4`, so
/// the figures are the child's own, not this process's.
pub fn run(
    argv: &[String],
    workdir: &Path,
    stdin: Option<&[u8]>,
    deadline: Duration,
) -> Result<Execution, RunnerError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(RunnerError::Launch {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // the child leads its own process group so the deadline kill
        // reaches any grandchildren it spawned
        .process_group(0)
        .spawn()
        .map_err(|e| RunnerError::Launch {
            command: program.clone(),
            source: e,
        })?;

    if let Some(bytes) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let bytes = bytes.to_vec();
            // the child may exit, or be killed, without draining its stdin;
            // a broken pipe here is not an error
            thread::spawn(move || {
                let _ = pipe.write_all(&bytes);
            });
        }
    }

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    // Deadline watchdog.  The pid could in principle be reused between the
    // child's exit and the kill; the disarm send closes that window for
    // every child that finishes in time.
    let pid = child.id() as i32;
    let fired = Arc::new(AtomicBool::new(false));
    let watchdog_fired = Arc::clone(&fired);
    let (disarm, armed) = mpsc::channel::<()>();
    let watchdog = thread::spawn(move || {
        if armed.recv_timeout(deadline).is_err() {
            watchdog_fired.store(true, Ordering::SeqCst);
            unsafe { libc::kill(-pid, libc::SIGKILL) };
        }
    });

    let wait_result = child.wait4();
    let elapsed = started.elapsed();
    let _ = disarm.send(());
    let _ = watchdog.join();

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    let ResUse {
        status: _,
        rusage: ResourceUsage { maxrss, .. },
    } = wait_result.map_err(|e| RunnerError::Launch {
        command: program.clone(),
        source: e,
    })?;

    if fired.load(Ordering::SeqCst) {
        return Err(RunnerError::Timeout {
            deadline_ms: deadline.as_millis() as u64,
        });
    }

    Ok(Execution {
        time_ms: round2(elapsed.as_secs_f64() * 1000.0),
        memory_mb: round2(maxrss as f64 / (1024.0 * 1024.0)),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_stdout_and_measures() {
        let dir = tempfile::tempdir().unwrap();
        let execution = run(
            &argv(&["echo", "hello"]),
            dir.path(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(execution.stdout.trim(), "hello");
        assert!(execution.stderr.is_empty());
        assert!(execution.time_ms < 5000.0);
        assert!(execution.memory_mb > 0.0);
    }

    #[test]
    fn feeds_stdin_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let execution = run(
            &argv(&["cat"]),
            dir.path(),
            Some(b"alpha\nbeta\n"),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(execution.stdout, "alpha\nbeta\n");
    }

    #[test]
    fn captures_stderr_separately() {
        let dir = tempfile::tempdir().unwrap();
        let execution = run(
            &argv(&["sh", "-c", "echo out; echo oops 1>&2"]),
            dir.path(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(execution.stdout.trim(), "out");
        assert_eq!(execution.stderr.trim(), "oops");
    }

    #[test]
    fn kills_the_child_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let error = run(
            &argv(&["sleep", "30"]),
            dir.path(),
            None,
            Duration::from_millis(200),
        )
        .unwrap_err();

        assert!(matches!(error, RunnerError::Timeout { deadline_ms: 200 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = run(
            &argv(&["grader-no-such-binary"]),
            dir.path(),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();

        assert!(matches!(error, RunnerError::Launch { .. }));
    }

    #[test]
    fn empty_command_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = run(&[], dir.path(), None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(error, RunnerError::Launch { .. }));
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(312.4567), 312.46);
        assert_eq!(round2(99.999), 100.0);
        assert_eq!(round2(0.0), 0.0);
    }
}
