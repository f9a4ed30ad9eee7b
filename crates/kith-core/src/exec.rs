//! Deferred external-command invocation
//!
//! An [`Invocation`] is a lazy handle over one child-process launch. Building
//! it has no side effect; the child runs when the invocation is consumed for
//! its exit code, captured output, text, or lines of text, and each
//! invocation runs at most once. An invocation dropped while still pending
//! runs at drop time with its output flowing to the inherited standard
//! streams, so a fire-and-forget invocation still executes - the same way a
//! bare command substitution in a shell still prints to the terminal.

use std::io::{self, Write};
use std::os::fd::RawFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use thiserror::Error;

/// Errors surfaced by consuming an [`Invocation`].
#[derive(Error, Debug)]
pub enum ExecError {
    /// The child exited non-zero while its output was being captured.
    #[error("{command}: exit status {status}: {}", String::from_utf8_lossy(.stderr).trim())]
    ProcessFailed {
        command: String,
        status: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    /// A consuming operation was called on an already-consumed invocation.
    /// Always a bug in the caller; never recovered from.
    #[error("Invocation already consumed: {0}")]
    Expired(String),

    /// Captured output could not be decoded as UTF-8 text.
    #[error("Output of {command} is not valid UTF-8")]
    NotUtf8 {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A stdin payload or captured output, framed as text or raw bytes.
///
/// The framing of captured output follows the framing of the input: feed a
/// child text and its output is decoded as UTF-8, feed it bytes (or nothing)
/// and decoding is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// A lazily-executed handle over one external-command launch.
///
/// The handle is single-owner and single-shot: the pending -> consumed
/// transition happens exactly once, and a second consuming call fails with
/// [`ExecError::Expired`] rather than silently re-running the child.
#[derive(Debug)]
pub struct Invocation {
    argv: Vec<String>,
    input: Option<Payload>,
    pass_fds: Vec<RawFd>,
    consumed: bool,
}

impl Invocation {
    /// Start building an invocation of `program`. Nothing runs yet.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            input: None,
            pass_fds: Vec::new(),
            consumed: false,
        }
    }

    /// Append one argument. Secret values must never be passed here; hand
    /// them to the child through a `SecretChannel` instead.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Supply the child's standard input. An empty payload counts as no
    /// input: stdin stays connected to the parent's.
    pub fn input(mut self, payload: impl Into<Payload>) -> Self {
        self.input = Some(payload.into());
        self
    }

    /// Declare a descriptor the child inherits, at the same number. Closure
    /// of the rest rides on close-on-exec: everything this crate creates
    /// carries the flag, so an undeclared descriptor of ours stays closed
    /// across the launch.
    pub fn pass_fd(mut self, fd: RawFd) -> Self {
        self.pass_fds.push(fd);
        self
    }

    /// The argument vector exactly as it will be handed to the OS.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Run the child and report its exit code, without treating a non-zero
    /// exit as an error. A child killed by signal N reports -N.
    pub fn exit_status(&mut self) -> Result<i32, ExecError> {
        self.consume()?;
        let mut child = self.spawn(false)?;
        let feeder = self.feed_stdin(&mut child);
        let status = child.wait()?;
        join_feeder(feeder)?;
        Ok(exit_code(status))
    }

    /// Run the child with stdout and stderr captured. A non-zero exit
    /// becomes [`ExecError::ProcessFailed`] carrying the code and both
    /// captured streams.
    pub fn captured_output(&mut self) -> Result<Payload, ExecError> {
        self.consume()?;
        let text = self.input.as_ref().is_some_and(Payload::is_text);
        let mut child = self.spawn(true)?;
        let feeder = self.feed_stdin(&mut child);
        let output = child.wait_with_output()?;
        join_feeder(feeder)?;

        let status = exit_code(output.status);
        if status != 0 {
            return Err(ExecError::ProcessFailed {
                command: self.command(),
                status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        if text {
            Ok(Payload::Text(self.decode(output.stdout)?))
        } else {
            Ok(Payload::Bytes(output.stdout))
        }
    }

    /// Run the child and hand back captured stdout decoded as UTF-8.
    pub fn text(&mut self) -> Result<String, ExecError> {
        match self.captured_output()? {
            Payload::Text(text) => Ok(text),
            Payload::Bytes(bytes) => self.decode(bytes),
        }
    }

    /// Run the child and iterate captured stdout line by line. The sequence
    /// is finite and cannot be restarted; consuming the invocation a second
    /// time fails with [`ExecError::Expired`].
    pub fn lines(&mut self) -> Result<Lines, ExecError> {
        let text = self.text()?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Ok(Lines {
            inner: lines.into_iter(),
        })
    }

    /// Flip pending -> consumed, failing if the transition already happened.
    /// Set before the launch, so a failed launch is consumed too and the
    /// drop-time run never fires for it.
    fn consume(&mut self) -> Result<(), ExecError> {
        if self.consumed {
            return Err(ExecError::Expired(self.command()));
        }
        self.consumed = true;
        Ok(())
    }

    fn spawn(&mut self, capture: bool) -> Result<Child, ExecError> {
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]);

        if self.has_input() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::inherit());
        }
        if capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        if !self.pass_fds.is_empty() {
            let fds = self.pass_fds.clone();
            // Runs in the forked child before exec: clear close-on-exec on
            // exactly the declared descriptors so they survive the exec.
            // fcntl is async-signal-safe.
            unsafe {
                command.pre_exec(move || {
                    for &fd in &fds {
                        clear_cloexec(fd)?;
                    }
                    Ok(())
                });
            }
        }

        Ok(command.spawn()?)
    }

    /// Write the input payload to the child's stdin from a short-lived
    /// thread, so a child that fills its output pipe before draining stdin
    /// cannot deadlock against us.
    fn feed_stdin(&mut self, child: &mut Child) -> Option<JoinHandle<io::Result<()>>> {
        let payload = match self.input.take() {
            Some(payload) if !payload.is_empty() => payload,
            _ => return None,
        };
        let mut stdin = child.stdin.take()?;
        Some(std::thread::spawn(move || {
            stdin.write_all(payload.as_bytes())
        }))
    }

    fn has_input(&self) -> bool {
        self.input.as_ref().is_some_and(|payload| !payload.is_empty())
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<String, ExecError> {
        String::from_utf8(bytes).map_err(|source| ExecError::NotUtf8 {
            command: self.command(),
            source,
        })
    }

    /// The command as a display string for error messages.
    fn command(&self) -> String {
        self.argv.join(" ")
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if !self.consumed {
            // Fire and forget: the launch still happens exactly once, with
            // output flowing to the inherited streams. There is nowhere left
            // to surface an error.
            let _ = self.exit_status();
        }
    }
}

/// Finite, non-restartable iterator over a consumed invocation's output.
pub struct Lines {
    inner: std::vec::IntoIter<String>,
}

impl Iterator for Lines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next()
    }
}

fn join_feeder(feeder: Option<JoinHandle<io::Result<()>>>) -> Result<(), ExecError> {
    if let Some(handle) = feeder {
        match handle.join() {
            Ok(Ok(())) => {}
            // A child that exits without draining its stdin is not an error.
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => return Err(ExecError::Io(err)),
            Err(_) => return Err(ExecError::Io(io::Error::other("stdin writer panicked"))),
        }
    }
    Ok(())
}

/// Numeric exit code in the shell convention: signal deaths report -N.
fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}

fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::RawFd;

    /// A pipe with close-on-exec set on both ends, as everything in this
    /// crate creates them. Returned raw; tests close the ends themselves.
    fn cloexec_pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        for &fd in &fds {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags >= 0);
            let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
            assert!(rc >= 0);
        }
        (fds[0], fds[1])
    }

    fn close(fd: RawFd) {
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_capture() {
        let mut invocation = Invocation::new("printf").arg("Hello World");
        assert_eq!(invocation.text().unwrap(), "Hello World");
    }

    #[test]
    fn test_capture_failure_raises() {
        let mut invocation = Invocation::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        match invocation.captured_output() {
            Err(ExecError::ProcessFailed { status, stderr, .. }) => {
                assert_eq!(status, 3);
                assert_eq!(String::from_utf8_lossy(&stderr).trim(), "boom");
            }
            other => panic!("expected ProcessFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_exit_status_does_not_raise() {
        assert_eq!(Invocation::new("false").exit_status().unwrap(), 1);
        assert_eq!(Invocation::new("true").exit_status().unwrap(), 0);
    }

    #[test]
    fn test_signal_death_reports_negative() {
        let mut invocation = Invocation::new("sh").args(["-c", "kill -TERM $$"]);
        assert_eq!(invocation.exit_status().unwrap(), -libc::SIGTERM);
    }

    #[test]
    fn test_already_spent() {
        let mut invocation = Invocation::new("printf").arg("Hello World");
        invocation.text().unwrap();
        match invocation.text() {
            Err(ExecError::Expired(command)) => assert!(command.contains("printf")),
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn test_input_text() {
        let mut invocation = Invocation::new("cat").input("Hello, kith!");
        assert_eq!(invocation.text().unwrap(), "Hello, kith!");
    }

    #[test]
    fn test_input_bytes_output_stays_bytes() {
        // Invalid UTF-8 round-trips untouched when the input is bytes.
        let raw = vec![0x00u8, 0x9f, 0x92, 0x96];
        let mut invocation = Invocation::new("cat").input(raw.clone());
        match invocation.captured_output().unwrap() {
            Payload::Bytes(bytes) => assert_eq!(bytes, raw),
            Payload::Text(_) => panic!("byte input must not produce text output"),
        }
    }

    #[test]
    fn test_text_input_output_is_text() {
        let mut invocation = Invocation::new("cat").input("framed as text");
        match invocation.captured_output().unwrap() {
            Payload::Text(text) => assert_eq!(text, "framed as text"),
            Payload::Bytes(_) => panic!("text input must produce text output"),
        }
    }

    #[test]
    fn test_large_input_does_not_deadlock() {
        // Bigger than any pipe buffer in both directions.
        let big = "x".repeat(1 << 20);
        let mut invocation = Invocation::new("cat").input(big.clone());
        assert_eq!(invocation.text().unwrap(), big);
    }

    #[test]
    fn test_empty_input_counts_as_no_input() {
        // The policy that decides whether stdin is redirected at all. Built
        // on `true` so the drop-time runs are inert.
        assert!(!Invocation::new("true").input("").has_input());
        assert!(!Invocation::new("true").input(Vec::<u8>::new()).has_input());
        assert!(Invocation::new("true").input("x").has_input());
        assert!(!Invocation::new("true").has_input());
    }

    #[test]
    fn test_not_utf8() {
        let mut invocation = Invocation::new("printf").arg(r"\xff\xfe");
        match invocation.text() {
            Err(ExecError::NotUtf8 { command, .. }) => assert!(command.contains("printf")),
            other => panic!("expected NotUtf8, got {:?}", other),
        }
    }

    #[test]
    fn test_iterate_output() {
        let mut invocation = Invocation::new("printf").arg("a\nb\nc\n");
        let lines: Vec<String> = invocation.lines().unwrap().collect();
        assert_eq!(lines, ["a", "b", "c"]);
        match invocation.lines() {
            Err(ExecError::Expired(_)) => {}
            other => panic!("expected Expired, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_fire_and_forget_still_executes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        {
            let _invocation = Invocation::new("touch").arg(marker.to_string_lossy().to_string());
            // Dropped without any consuming call.
        }
        assert!(marker.exists());
    }

    #[test]
    fn test_declared_descriptor_is_inherited() {
        let (read, write) = cloexec_pipe();
        let payload = b"marker";
        let written = unsafe {
            libc::write(write, payload.as_ptr() as *const libc::c_void, payload.len())
        };
        assert_eq!(written, payload.len() as isize);
        close(write);

        let mut invocation = Invocation::new("cat")
            .arg(format!("/dev/fd/{}", read))
            .pass_fd(read);
        let output = invocation.text().unwrap();
        close(read);
        assert_eq!(output, "marker");
    }

    #[test]
    fn test_undeclared_descriptor_is_closed() {
        let (read, write) = cloexec_pipe();
        close(write);

        let mut invocation = Invocation::new("cat").arg(format!("/dev/fd/{}", read));
        let result = invocation.captured_output();
        close(read);
        match result {
            Err(ExecError::ProcessFailed { status, .. }) => assert_ne!(status, 0),
            other => panic!("undeclared fd must not reach the child: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_closure_rides_on_close_on_exec() {
        // A descriptor without the flag reaches the child even when
        // undeclared; only close-on-exec descriptors are guaranteed closed.
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let (read, write) = (fds[0], fds[1]);
        let payload = b"plain";
        let written = unsafe {
            libc::write(write, payload.as_ptr() as *const libc::c_void, payload.len())
        };
        assert_eq!(written, payload.len() as isize);
        close(write);

        let mut invocation = Invocation::new("cat").arg(format!("/dev/fd/{}", read));
        let output = invocation.text().unwrap();
        close(read);
        assert_eq!(output, "plain");
    }

    #[test]
    fn test_argv_accessor() {
        let mut invocation = Invocation::new("printf").arg("%s").args(["ok"]);
        assert_eq!(invocation.argv(), ["printf", "%s", "ok"]);
        assert_eq!(invocation.text().unwrap(), "ok");
    }
}
