// src/exec/output.rs

//! Child stdout/stderr forwarding.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tracing::debug;

/// Consume both output pipes of a child so OS buffers never fill, logging
/// each line at debug.
///
/// Fire-and-forget: the reader tasks end on their own when the pipes close.
pub fn drain_output(name: &str, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
    if let Some(stdout) = stdout {
        spawn_line_logger(name.to_string(), "stdout", stdout);
    }
    if let Some(stderr) = stderr {
        spawn_line_logger(name.to_string(), "stderr", stderr);
    }
}

fn spawn_line_logger<R>(process: String, stream: &'static str, pipe: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        // Only EOF or a read error ends the drain. Closing the pipe early
        // would hand the child a SIGPIPE on its next write.
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(trim_newline(&buf));
                    debug!(process = %process, stream, "{}", line);
                }
                Err(err) => {
                    debug!(process = %process, stream, error = %err, "output pipe read failed");
                    break;
                }
            }
        }
    });
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_unix_and_windows_line_endings() {
        assert_eq!(trim_newline(b"hello\n"), b"hello");
        assert_eq!(trim_newline(b"hello\r\n"), b"hello");
        assert_eq!(trim_newline(b"no newline"), b"no newline");
        assert_eq!(trim_newline(b"\xff\n"), b"\xff");
    }
}
