//! Watchdog (C8): supervises the capture worker as a genuine child process,
//! matching the reference `watchdog.py`'s `multiprocessing.Process` + `os.pipe()`
//! design exactly rather than substituting an in-process thread. The worker
//! writes one byte per heartbeat into the pipe; the supervisor polls it with
//! a bounded wait and escalates from a graceful term to a hard kill if the
//! child goes quiet.

use std::os::unix::io::RawFd;
use std::process::Child;
use std::time::{Duration, Instant};

use wifiology_common::{Result, WifiologyError};

pub const CHILD_FD_ENV: &str = "__WIFIOLOGY_HEARTBEAT_FD";

pub struct HeartbeatWriter {
    fd: RawFd,
}

impl HeartbeatWriter {
    /// Present only inside a child spawned by [`run_monitored`].
    pub fn from_env() -> Option<Self> {
        let fd: RawFd = std::env::var(CHILD_FD_ENV).ok()?.parse().ok()?;
        Some(HeartbeatWriter { fd })
    }

    pub fn beat(&mut self) {
        let byte = [1u8];
        unsafe {
            libc::write(self.fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

impl Drop for HeartbeatWriter {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub heartbeat_timeout: Duration,
    pub select_timeout: Duration,
    pub always_restart: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            heartbeat_timeout: Duration::from_secs(300),
            select_timeout: Duration::from_secs(15),
            always_restart: true,
        }
    }
}

enum ChildOutcome {
    Exited(i32),
    Killed,
}

/// Spawns children via `build_child` (passed the write end of a fresh
/// anonymous pipe) until either a child exits cleanly with
/// `always_restart=false`, or this process is killed out-of-band.
pub fn run_monitored(mut build_child: impl FnMut(RawFd) -> std::io::Result<Child>, policy: Policy) -> Result<i32> {
    loop {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(WifiologyError::Io(std::io::Error::last_os_error()));
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let mut child = build_child(write_fd).map_err(WifiologyError::Io)?;
        unsafe {
            libc::close(write_fd);
        }

        let outcome = watch_child(&mut child, read_fd, &policy)?;
        unsafe {
            libc::close(read_fd);
        }

        match outcome {
            ChildOutcome::Exited(code) if !policy.always_restart => return Ok(code),
            ChildOutcome::Exited(code) => {
                tracing::info!(code, "capture worker exited, restarting");
            }
            ChildOutcome::Killed => {
                tracing::warn!("capture worker was killed for missing heartbeats, restarting");
            }
        }
    }
}

fn watch_child(child: &mut Child, read_fd: RawFd, policy: &Policy) -> Result<ChildOutcome> {
    let mut last_seen = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(WifiologyError::Io)? {
            return Ok(ChildOutcome::Exited(status.code().unwrap_or(-1)));
        }

        if poll_readable(read_fd, policy.select_timeout) {
            let mut buf = [0u8; 256];
            let n = unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n > 0 {
                last_seen = Instant::now();
            }
        }

        if last_seen.elapsed() > policy.heartbeat_timeout {
            tracing::warn!("no heartbeat within timeout, terminating worker");
            escalate_kill(child)?;
            return Ok(ChildOutcome::Killed);
        }
    }
}

fn poll_readable(fd: RawFd, timeout: Duration) -> bool {
    let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout.as_millis() as i32) };
    rc > 0 && pollfd.revents & libc::POLLIN != 0
}

/// 10 one-second polls after SIGTERM, then SIGKILL, matching the reference
/// escalation policy exactly.
fn escalate_kill(child: &mut Child) -> Result<()> {
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }
    for _ in 0..10 {
        if child.try_wait().map_err(WifiologyError::Io)?.is_some() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(1));
    }
    unsafe {
        libc::kill(child.id() as i32, libc::SIGKILL);
    }
    let _ = child.wait();
    Ok(())
}
