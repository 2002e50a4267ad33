//! Job guard: idempotency and collision avoidance.
//!
//! Several worker processes can race on the same source between scheduler
//! passes. Coordination happens through the deterministic output paths: a
//! finalised output means the work is done; a leftover `.mp4` intermediate
//! means either another process is mid-encode or an earlier run died, and
//! modification time decides between the two against a configurable lease.
//! On top of that advisory inspection, a lock file claimed with an atomic
//! create-if-absent closes the decide-then-write race between two workers
//! starting on the same source at once.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::CoreResult;

/// What the guard decided about this source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// No prior artifacts; the job may proceed.
    Proceed,
    /// Finalised output already on disk; skip straight to the archival move.
    AlreadyCompleted,
    /// A fresh intermediate belongs to another live process; skip this run
    /// without error.
    InProgressElsewhere,
}

/// Whether a leftover intermediate is old enough to be considered
/// abandoned.
pub fn is_stale(modified: SystemTime, now: SystemTime, lease: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > lease,
        // Modified in the future; clock skew. Treat as live.
        Err(_) => false,
    }
}

/// Inspects the deterministic output paths for prior or concurrent work.
///
/// A stale intermediate is deleted here so the caller can re-create it;
/// a fresh one yields [`GuardDecision::InProgressElsewhere`].
pub fn inspect(
    final_path: &Path,
    intermediate_path: &Path,
    stale_lease: Duration,
) -> CoreResult<GuardDecision> {
    if final_path.is_file() {
        log::info!(
            "Finalised output already exists: {}",
            final_path.display()
        );
        return Ok(GuardDecision::AlreadyCompleted);
    }

    if intermediate_path.is_file() {
        let modified = std::fs::metadata(intermediate_path)?.modified()?;
        if is_stale(modified, SystemTime::now(), stale_lease) {
            log::warn!(
                "Removing stale intermediate from an abandoned run: {}",
                intermediate_path.display()
            );
            std::fs::remove_file(intermediate_path)?;
            return Ok(GuardDecision::Proceed);
        }
        log::info!(
            "Fresh intermediate exists, assuming concurrent run: {}",
            intermediate_path.display()
        );
        return Ok(GuardDecision::InProgressElsewhere);
    }

    Ok(GuardDecision::Proceed)
}

/// A live claim on one job's output identity. The lock file is removed when
/// the claim drops at job end; a crashed process leaves its lock behind for
/// the lease check to reclaim.
#[derive(Debug)]
pub struct JobClaim {
    path: PathBuf,
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove claim file {}: {e}", self.path.display());
        }
    }
}

/// Atomically claims a job via create-if-absent on its lock file, writing
/// the owning PID and a timestamp for operators. Closes the window between
/// [`inspect`] and the first write where two processes could both decide to
/// proceed. A leftover lock older than the lease is reclaimed; a live one
/// yields `None`.
pub fn claim(lock_path: &Path, stale_lease: Duration) -> CoreResult<Option<JobClaim>> {
    for _ in 0..2 {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                use std::io::Write;
                let _ = writeln!(
                    file,
                    "{} {}",
                    std::process::id(),
                    chrono::Local::now().to_rfc3339()
                );
                return Ok(Some(JobClaim {
                    path: lock_path.to_path_buf(),
                }));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // The holder may release between the failed create and this
                // inspection; just try the create again.
                let Ok(metadata) = std::fs::metadata(lock_path) else {
                    continue;
                };
                if is_stale(metadata.modified()?, SystemTime::now(), stale_lease) {
                    log::warn!(
                        "Reclaiming stale lock from a dead process: {}",
                        lock_path.display()
                    );
                    let _ = std::fs::remove_file(lock_path);
                    continue;
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(5 * 60 * 60);

    #[test]
    fn second_claim_loses_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("N_123_01of01.mp4.lock");

        let held = claim(&lock, LEASE).unwrap();
        assert!(held.is_some());
        assert!(claim(&lock, LEASE).unwrap().is_none());

        drop(held);
        assert!(!lock.exists());
        assert!(claim(&lock, LEASE).unwrap().is_some());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("N_123_01of01.mp4.lock");
        std::fs::write(&lock, "99999 2020-01-01T00:00:00+00:00\n").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let held = claim(&lock, Duration::ZERO).unwrap();
        assert!(held.is_some());
    }

    #[test]
    fn six_hour_old_intermediate_is_stale() {
        let now = SystemTime::now();
        let modified = now - Duration::from_secs(6 * 60 * 60);
        assert!(is_stale(modified, now, LEASE));
    }

    #[test]
    fn recent_intermediate_is_live() {
        let now = SystemTime::now();
        assert!(!is_stale(now - Duration::from_secs(60), now, LEASE));
        // Exactly at the lease boundary still counts as live.
        assert!(!is_stale(now - LEASE, now, LEASE));
    }

    #[test]
    fn future_mtime_is_live() {
        let now = SystemTime::now();
        assert!(!is_stale(now + Duration::from_secs(60), now, LEASE));
    }
}
