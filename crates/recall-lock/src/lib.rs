//! File-based locking using the `flock(2)` syscall directly.
//! Independent crate with no internal recall dependencies.
//!
//! Two flavours are offered:
//! - [`acquire_blocking`]: waits for an exclusive lock. Used to serialize
//!   writers of one memory category; critical sections are short appends.
//! - [`try_acquire`]: fails fast and reports who holds the lock. Used by the
//!   scheduler so two scheduler processes never run the same task at once.
//!
//! `flock` locks belong to the open file description, so two independent
//! `open()` calls conflict even inside one process. `Drop` calls
//! `flock(fd, LOCK_UN)` to release.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Diagnostic information written to non-blocking lock files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDiagnostic {
    pub pid: u32,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub reason: String,
}

/// Exclusive advisory lock guard backed by `flock(2)`.
pub struct FileLock {
    /// The open lock file. Closing it also releases flock, but `LOCK_UN`
    /// is issued explicitly in `Drop` for deterministic release timing.
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // If the call fails the lock is still released when the fd closes.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl FileLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Outcome of a non-blocking acquisition attempt.
#[derive(Debug)]
pub enum LockAttempt {
    Acquired(FileLock),
    /// Someone else holds the lock. Carries a human-readable description
    /// built from the holder's diagnostic, when readable.
    Held(String),
}

/// Acquire an exclusive lock at `{locks_dir}/{name}.lock`, blocking until
/// any other holder releases it.
pub fn acquire_blocking(locks_dir: &Path, name: &str) -> Result<FileLock> {
    let (file, lock_path) = open_lock_file(locks_dir, name)?;

    // SAFETY: `fd` comes from the `File` just opened; LOCK_EX blocks.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 {
        anyhow::bail!(
            "Failed to acquire lock {}: {}",
            lock_path.display(),
            std::io::Error::last_os_error()
        );
    }

    Ok(FileLock { file, lock_path })
}

/// Try to acquire an exclusive lock at `{locks_dir}/{name}.lock` without
/// blocking.
///
/// On success the lock file is rewritten with a JSON [`LockDiagnostic`]
/// (pid, holder, acquired_at, reason). When the lock is held elsewhere the
/// existing diagnostic is read back to describe the holder.
pub fn try_acquire(locks_dir: &Path, name: &str, reason: &str) -> Result<LockAttempt> {
    let (file, lock_path) = open_lock_file(locks_dir, name)?;

    // SAFETY: `fd` comes from the `File` just opened.
    // `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EWOULDBLOCK) {
            return Err(err)
                .with_context(|| format!("Failed to lock {}", lock_path.display()));
        }
        return Ok(LockAttempt::Held(describe_holder(&lock_path)));
    }

    let mut lock = FileLock { file, lock_path };
    let diagnostic = LockDiagnostic {
        pid: std::process::id(),
        holder: name.to_string(),
        acquired_at: Utc::now(),
        reason: reason.to_string(),
    };
    let json =
        serde_json::to_string(&diagnostic).context("Failed to serialize lock diagnostic")?;

    lock.file
        .set_len(0)
        .context("Failed to truncate lock file")?;
    lock.file
        .seek(SeekFrom::Start(0))
        .context("Failed to rewind lock file")?;
    lock.file
        .write_all(json.as_bytes())
        .context("Failed to write lock diagnostic")?;
    lock.file.flush().context("Failed to flush lock file")?;

    Ok(LockAttempt::Acquired(lock))
}

fn open_lock_file(locks_dir: &Path, name: &str) -> Result<(File, PathBuf)> {
    fs::create_dir_all(locks_dir)
        .with_context(|| format!("Failed to create locks directory: {}", locks_dir.display()))?;

    let lock_path = locks_dir.join(format!("{name}.lock"));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    Ok((file, lock_path))
}

fn describe_holder(lock_path: &Path) -> String {
    let mut contents = String::new();
    let readable = File::open(lock_path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .is_ok();

    match serde_json::from_str::<LockDiagnostic>(&contents) {
        Ok(diagnostic) if readable => format!(
            "locked by PID {} ({}, reason: {}, acquired: {})",
            diagnostic.pid, diagnostic.holder, diagnostic.reason, diagnostic.acquired_at
        ),
        _ => format!(
            "locked by another process (no diagnostic in {})",
            lock_path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn expect_acquired(attempt: LockAttempt) -> FileLock {
        match attempt {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Held(holder) => panic!("expected lock, held: {holder}"),
        }
    }

    #[test]
    fn test_try_acquire_succeeds_and_creates_dir() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let locks_dir = temp_dir.path().join("deep").join("locks");

        let lock = expect_acquired(try_acquire(&locks_dir, "scheduler", "cycle").unwrap());
        assert_eq!(lock.lock_path(), locks_dir.join("scheduler.lock"));
        assert!(lock.lock_path().exists());
    }

    #[test]
    fn test_diagnostic_written() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let _lock =
            expect_acquired(try_acquire(temp_dir.path(), "scheduler", "run cycle").unwrap());

        let contents = fs::read_to_string(temp_dir.path().join("scheduler.lock")).unwrap();
        let diagnostic: LockDiagnostic = serde_json::from_str(&contents).unwrap();
        assert_eq!(diagnostic.pid, std::process::id());
        assert_eq!(diagnostic.holder, "scheduler");
        assert_eq!(diagnostic.reason, "run cycle");
    }

    #[test]
    fn test_second_try_acquire_reports_holder() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let _first =
            expect_acquired(try_acquire(temp_dir.path(), "scheduler", "first cycle").unwrap());

        match try_acquire(temp_dir.path(), "scheduler", "second cycle").unwrap() {
            LockAttempt::Held(holder) => {
                assert!(holder.contains(&std::process::id().to_string()));
                assert!(holder.contains("first cycle"));
            }
            LockAttempt::Acquired(_) => panic!("second acquisition should not succeed"),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        {
            let _lock = expect_acquired(try_acquire(temp_dir.path(), "x", "first").unwrap());
        }
        let again = try_acquire(temp_dir.path(), "x", "second").unwrap();
        assert!(matches!(again, LockAttempt::Acquired(_)));
    }

    #[test]
    fn test_different_names_do_not_conflict() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let a = expect_acquired(try_acquire(temp_dir.path(), "projects", "a").unwrap());
        let b = expect_acquired(try_acquire(temp_dir.path(), "decisions", "b").unwrap());
        assert_ne!(a.lock_path(), b.lock_path());
    }

    #[test]
    fn test_blocking_lock_waits_for_release() {
        use std::sync::mpsc;
        use std::time::Duration;

        let temp_dir = tempdir().expect("Failed to create temp dir");
        let locks_dir = temp_dir.path().to_path_buf();
        let held = acquire_blocking(&locks_dir, "projects").unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_dir = locks_dir.clone();
        let waiter = std::thread::spawn(move || {
            let _lock = acquire_blocking(&waiter_dir, "projects").unwrap();
            tx.send(()).unwrap();
        });

        assert!(
            rx.recv_timeout(Duration::from_millis(150)).is_err(),
            "waiter must block while the lock is held"
        );
        drop(held);
        rx.recv_timeout(Duration::from_secs(5))
            .expect("waiter should acquire after release");
        waiter.join().unwrap();
    }

    #[test]
    fn test_try_acquire_invalid_path() {
        let result = try_acquire(Path::new("/dev/null"), "scheduler", "reason");
        assert!(result.is_err(), "Should fail for non-directory path");
    }

    #[test]
    fn test_lock_debug_format() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock = acquire_blocking(temp_dir.path(), "debug").unwrap();
        let debug = format!("{lock:?}");
        assert!(debug.contains("FileLock"));
        assert!(debug.contains("lock_path"));
    }
}
