//! Per-job buffered logging.
//!
//! Many worker processes append to the same log files, so each job collects
//! its lines here and flushes them through the `log` facade in one block at
//! job end instead of interleaving with its neighbours. Entries are stamped
//! when buffered, not when flushed, so the block still reads as a timeline.
//! The buffer is owned by the job and passed explicitly into the pipeline;
//! nothing is shared between runs.

use chrono::{DateTime, Local};
use log::Level;

/// Accumulated log lines for one job.
#[derive(Debug)]
pub struct JobLog {
    label: String,
    entries: Vec<(Level, DateTime<Local>, String)>,
}

impl JobLog {
    pub fn new(label: impl Into<String>) -> Self {
        JobLog {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, level: Level, message: String) {
        self.entries.push((level, Local::now(), message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    /// Number of buffered entries so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emits the whole buffer in one block, bracketed by start/end markers.
    pub fn flush(self) {
        log::info!(
            "================== START access copy creation {} ==================",
            self.label
        );
        for (level, stamp, message) in &self.entries {
            log::log!(*level, "[{}] {message}", stamp.format("%Y-%m-%d %H:%M:%S"));
        }
        log::info!(
            "=================== END access copy creation {} ===================",
            self.label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_until_flush() {
        let mut joblog = JobLog::new("N_123_01of01.mkv");
        assert!(joblog.is_empty());
        joblog.info("probing source");
        joblog.warn("first encode attempt failed");
        assert_eq!(joblog.len(), 2);
        joblog.flush();
    }
}
