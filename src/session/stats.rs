//! Per-session capture counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by one session. Shared with its completion worker.
#[derive(Debug, Default)]
pub struct SessionStats {
    requested: AtomicU64,
    rejected_busy: AtomicU64,
    issued: AtomicU64,
    issue_failures: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    decode_failures: AtomicU64,
    timed_out: AtomicU64,
    parameter_rejections: AtomicU64,
    preview_failures: AtomicU64,
    locks_applied: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Capture requests received.
    pub requested: u64,
    /// Requests rejected by the busy guard.
    pub rejected_busy: u64,
    /// Captures handed to the device.
    pub issued: u64,
    /// Captures the device refused to issue.
    pub issue_failures: u64,
    /// Completions that produced an artifact.
    pub completed: u64,
    /// Completions that did not produce an artifact.
    pub failed: u64,
    /// Failed completions caused by undecodable data.
    pub decode_failures: u64,
    /// Captures failed because no completion arrived in time.
    pub timed_out: u64,
    /// Parameter writes rejected after construction.
    pub parameter_rejections: u64,
    /// Preview starts that failed.
    pub preview_failures: u64,
    /// Successful exposure locks.
    pub locks_applied: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SessionStats {
    pub(crate) fn record_requested(&self) {
        bump(&self.requested);
    }

    pub(crate) fn record_rejected_busy(&self) {
        bump(&self.rejected_busy);
    }

    pub(crate) fn record_issued(&self) {
        bump(&self.issued);
    }

    pub(crate) fn record_issue_failure(&self) {
        bump(&self.issue_failures);
    }

    pub(crate) fn record_completed(&self) {
        bump(&self.completed);
    }

    pub(crate) fn record_failed(&self, decode: bool) {
        bump(&self.failed);
        if decode {
            bump(&self.decode_failures);
        }
    }

    pub(crate) fn record_timed_out(&self) {
        bump(&self.failed);
        bump(&self.timed_out);
    }

    pub(crate) fn record_parameter_rejection(&self) {
        bump(&self.parameter_rejections);
    }

    pub(crate) fn record_preview_failure(&self) {
        bump(&self.preview_failures);
    }

    pub(crate) fn record_lock(&self) {
        bump(&self.locks_applied);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            requested: get(&self.requested),
            rejected_busy: get(&self.rejected_busy),
            issued: get(&self.issued),
            issue_failures: get(&self.issue_failures),
            completed: get(&self.completed),
            failed: get(&self.failed),
            decode_failures: get(&self.decode_failures),
            timed_out: get(&self.timed_out),
            parameter_rejections: get(&self.parameter_rejections),
            preview_failures: get(&self.preview_failures),
            locks_applied: get(&self.locks_applied),
        }
    }
}
