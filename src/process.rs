use crate::error::{CutError, CutResult, ExitKind};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Diagnostic lines kept for error reports.
const MAX_STDERR_LINES: usize = 500;
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr_lines: Vec<String>,
}

impl ProcessOutput {
    pub fn stderr(&self) -> String {
        self.stderr_lines.join("\n")
    }
}

/// Shared flag a collaborator flips to kill the running subprocess.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn render_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `program` to completion. Every diagnostic line is handed to
/// `on_line` while the process is still running.
pub fn run(
    program: &Path,
    args: &[OsString],
    on_line: &mut (dyn FnMut(&str) + Send),
    cancel: Option<&CancelToken>,
) -> CutResult<ProcessOutput> {
    let name = program.display().to_string();
    debug!(program = %name, args = %render_args(args), "spawning");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| CutError::Process {
            program: name.clone(),
            exit: ExitKind::SpawnFailed(err.kind()),
            stderr: err.to_string(),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut tail: VecDeque<String> = VecDeque::new();

    let (status, stdout) = thread::scope(|scope| {
        let out_reader = scope.spawn(move || {
            let mut text = String::new();
            if let Some(mut out) = stdout {
                if let Err(err) = out.read_to_string(&mut text) {
                    warn!(%err, "failed to read stdout");
                }
            }
            text
        });
        let tail = &mut tail;
        scope.spawn(move || {
            if let Some(err) = stderr {
                split_lines(err, |line| {
                    on_line(line);
                    if tail.len() == MAX_STDERR_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                });
            }
        });

        let status = wait(&mut child, cancel);
        (status, out_reader.join().unwrap_or_default())
    });

    let stderr_lines: Vec<String> = tail.into_iter().collect();
    match status? {
        None => {
            info!(program = %name, "cancelled");
            Err(CutError::Cancelled)
        }
        Some(status) if status.success() => Ok(ProcessOutput {
            stdout,
            stderr_lines,
        }),
        Some(status) => {
            let exit = status.code().map_or(ExitKind::Signal, ExitKind::Code);
            warn!(program = %name, %exit, "subprocess failed");
            Err(CutError::Process {
                program: name,
                exit,
                stderr: stderr_lines.join("\n"),
            })
        }
    }
}

/// `None` means the process was killed through the token.
fn wait(child: &mut Child, cancel: Option<&CancelToken>) -> CutResult<Option<ExitStatus>> {
    let Some(token) = cancel else {
        return Ok(Some(child.wait()?));
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if token.is_cancelled() {
            if let Err(err) = child.kill() {
                warn!(%err, "failed to kill subprocess");
            }
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(CANCEL_POLL);
    }
}

/// ffmpeg redraws its status line with `\r`, so both `\r` and `\n` end a
/// line here. Empty lines are dropped.
pub(crate) fn split_lines<R: Read>(reader: R, mut on_line: impl FnMut(&str)) {
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::with_capacity(256);
    let mut emit = |buf: &mut Vec<u8>| {
        if !buf.is_empty() {
            on_line(&String::from_utf8_lossy(buf));
            buf.clear();
        }
    };

    loop {
        let chunk = match reader.fill_buf() {
            Ok([]) => break,
            Ok(chunk) => chunk,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(%err, "stopped reading diagnostics");
                break;
            }
        };
        let mut start = 0;
        for (i, byte) in chunk.iter().enumerate() {
            if *byte == b'\r' || *byte == b'\n' {
                pending.extend_from_slice(&chunk[start..i]);
                emit(&mut pending);
                start = i + 1;
            }
        }
        pending.extend_from_slice(&chunk[start..]);
        let used = chunk.len();
        reader.consume(used);
    }
    emit(&mut pending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines_of(raw: &[u8]) -> Vec<String> {
        let mut seen = Vec::new();
        split_lines(Cursor::new(raw.to_vec()), |l| seen.push(l.to_string()));
        seen
    }

    #[test]
    fn splits_on_carriage_returns_and_newlines() {
        let raw = b"Input #0\nframe=1 time=00:00:01.00 \rframe=2 time=00:00:02.00 \r\nDone";
        assert_eq!(
            lines_of(raw),
            vec![
                "Input #0",
                "frame=1 time=00:00:01.00 ",
                "frame=2 time=00:00:02.00 ",
                "Done"
            ]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(lines_of(b"").is_empty());
        assert!(lines_of(b"\r\n\r\n").is_empty());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn missing_program_is_spawn_failure() {
        let err = run(
            Path::new("/no/such/ffmpeg-binary"),
            &[],
            &mut |_: &str| {},
            None,
        )
        .unwrap_err();
        match err {
            CutError::Process { exit, .. } => {
                assert_eq!(exit, ExitKind::SpawnFailed(ErrorKind::NotFound))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn streams_stderr_lines_and_captures_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(
                dir.path(),
                r"printf 'size=   1kB time=00:00:01.00 bitrate=1k\r' >&2
printf 'size=   2kB time=00:00:02.00 bitrate=1k\n' >&2
echo done",
            );
            let mut seen = Vec::new();
            let out = run(&program, &[], &mut |l: &str| seen.push(l.to_string()), None).unwrap();
            assert_eq!(out.stdout.trim(), "done");
            assert_eq!(seen.len(), 2);
            assert_eq!(out.stderr_lines, seen);
        }

        #[test]
        fn non_zero_exit_carries_code_and_diagnostics() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "echo 'Invalid data found' >&2\nexit 1");
            let err = run(&program, &[], &mut |_: &str| {}, None).unwrap_err();
            match err {
                CutError::Process { exit, stderr, .. } => {
                    assert_eq!(exit, ExitKind::Code(1));
                    assert!(stderr.contains("Invalid data found"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn passes_arguments_verbatim() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), r#"for a in "$@"; do echo "[$a]"; done"#);
            let args: Vec<OsString> = ["-i", "a file.mp4", "-y"]
                .iter()
                .map(OsString::from)
                .collect();
            let out = run(&program, &args, &mut |_: &str| {}, None).unwrap();
            assert_eq!(out.stdout, "[-i]\n[a file.mp4]\n[-y]\n");
        }

        #[test]
        fn cancel_kills_the_process() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "exec sleep 30");
            let token = CancelToken::new();
            let trigger = token.clone();
            let killer = thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                trigger.cancel();
            });
            let err = run(&program, &[], &mut |_: &str| {}, Some(&token)).unwrap_err();
            killer.join().unwrap();
            assert!(matches!(err, CutError::Cancelled));
        }
    }
}
