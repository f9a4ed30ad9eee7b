//! Anonymous pipe for handing a secret to a child process
//!
//! A password must never appear in a child's argument list or environment,
//! where every process on the machine can read it. A [`SecretChannel`] is
//! the alternative: the secret is written into a fresh pipe before the child
//! is launched, and the child is told to read it from the pipe's descriptor
//! number (the `fd:<N>` convention the openssl `-pass` option understands).
//!
//! The read end is non-blocking: once the child has drained the secret it
//! sees end-of-data instead of hanging on a write end the parent still holds
//! open. Each channel carries exactly one secret and is never reused across
//! invocations; both ends close when the channel is dropped.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// One-shot unidirectional byte channel for a single secret transfer.
///
/// Both ends are close-on-exec; the read end only reaches a child when it is
/// declared through `Invocation::pass_fd`. Secrets are expected to be far
/// smaller than the pipe buffer (64 KiB on Linux), so the blocking write end
/// completes in one call in practice; [`SecretChannel::send`] loops over
/// short writes anyway so an oversized secret is transferred whole rather
/// than corrupted.
pub struct SecretChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl SecretChannel {
    /// Open a fresh channel. No data is written yet.
    pub fn open() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) returned two fresh descriptors that nothing else
        // owns. pipe() + fcntl rather than pipe2() keeps this portable to
        // macOS.
        let (read, write) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(read.as_raw_fd())?;
        set_cloexec(write.as_raw_fd())?;
        set_nonblocking(read.as_raw_fd())?;
        Ok(Self { read, write })
    }

    /// Write the whole secret into the channel. Must complete before the
    /// read end is handed to a child; short writes and EINTR are retried.
    pub fn send(&self, secret: &str) -> io::Result<()> {
        let mut rest = secret.as_bytes();
        while !rest.is_empty() {
            let written = unsafe {
                libc::write(
                    self.write.as_raw_fd(),
                    rest.as_ptr() as *const libc::c_void,
                    rest.len(),
                )
            };
            if written < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            rest = &rest[written as usize..];
        }
        Ok(())
    }

    /// The descriptor number a child reads the secret from. Pass it in the
    /// `fd:<N>` argument and declare it with `Invocation::pass_fd`.
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
