use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};

/// How much of a child's stdout [`run_captured`] keeps.
pub const CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// Stdout went past the limit and was cut.
    pub truncated: bool,
}

/// Runs `command` to completion with stdin closed, keeping at most
/// [`CAPTURE_LIMIT`] bytes of its stdout.
pub fn run_captured(command: &mut Command) -> io::Result<Captured> {
    run_captured_with_limit(command, CAPTURE_LIMIT)
}

pub fn run_captured_with_limit(command: &mut Command, limit: usize) -> io::Result<Captured> {
    tracing::debug!(program = ?command.get_program(), "spawning");
    let mut child =
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Both pipes are drained at once so a chatty stderr cannot block the child.
    let (stdout, stderr) = std::thread::scope(|scope| {
        let stderr = scope.spawn(move || -> io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr {
                pipe.read_to_end(&mut buf)?;
            }
            Ok(buf)
        });
        let stdout = match stdout {
            Some(pipe) => read_limited(pipe, limit),
            None => Ok((Vec::new(), false)),
        };
        let stderr = stderr.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload));
        (stdout, stderr)
    });
    let status = child.wait()?;
    let (stdout, truncated) = stdout?;
    let stderr = stderr?;

    if truncated {
        tracing::warn!(program = ?command.get_program(), limit, "stdout truncated");
    }
    Ok(Captured {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        truncated,
    })
}

/// Keeps the first `limit` bytes and discards the rest.
fn read_limited(mut pipe: impl Read, limit: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let bound = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    (&mut pipe).take(bound).read_to_end(&mut buf)?;
    let truncated = buf.len() > limit;
    if truncated {
        buf.truncate(limit);
        io::copy(&mut pipe, &mut io::sink())?;
    }
    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_reads() {
        let (buf, truncated) = read_limited(&b"abcdef"[..], 3).unwrap();
        assert_eq!(buf, b"abc");
        assert!(truncated);

        let (buf, truncated) = read_limited(&b"abc"[..], 3).unwrap();
        assert_eq!(buf, b"abc");
        assert!(!truncated);
    }

    #[cfg(unix)]
    #[test]
    fn captures_both_streams() {
        let captured =
            run_captured(Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
                .unwrap();
        assert_eq!(captured.status.code(), Some(3));
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");
        assert!(!captured.truncated);
    }

    #[cfg(unix)]
    #[test]
    fn truncates_stdout() {
        let captured =
            run_captured_with_limit(Command::new("sh").args(["-c", "printf abcdef"]), 3).unwrap();
        assert!(captured.status.success());
        assert_eq!(captured.stdout, "abc");
        assert!(captured.truncated);
    }
}
