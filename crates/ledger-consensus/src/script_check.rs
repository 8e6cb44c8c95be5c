//! Script-check accumulation for one block.
//!
//! Input checks are submitted as closures. `InlineScriptValidation` runs them
//! on the calling thread. `ScriptCheckGroup` hands them to a thread pool and
//! joins on `result()`. The first failing check cancels everything that has
//! not started yet.

use crate::{ConsensusError, ConsensusResult};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A deferred input/script check.
pub type ScriptCheck = Box<dyn FnOnce() -> ConsensusResult<()> + Send + 'static>;

/// Script evaluation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    /// No optional rules.
    pub const NONE: ScriptFlags = ScriptFlags(0);
    /// Evaluate pay-to-script-hash redeem scripts.
    pub const P2SH: ScriptFlags = ScriptFlags(1 << 0);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub fn contains(self, other: ScriptFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ScriptFlags {
    type Output = ScriptFlags;

    fn bitor(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 | rhs.0)
    }
}

/// State of one submitted check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Not yet run.
    Pending,
    /// Ran and succeeded.
    Passed,
    /// Ran and failed.
    Failed,
    /// Skipped because another check failed first.
    Cancelled,
}

impl CheckStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CheckStatus::Passed,
            2 => CheckStatus::Failed,
            3 => CheckStatus::Cancelled,
            _ => CheckStatus::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CheckStatus::Pending => 0,
            CheckStatus::Passed => 1,
            CheckStatus::Failed => 2,
            CheckStatus::Cancelled => 3,
        }
    }
}

/// Handle to one submitted check.
#[derive(Debug, Clone)]
pub struct ScriptCheckHandle {
    status: Arc<AtomicU8>,
}

impl ScriptCheckHandle {
    fn new(status: CheckStatus) -> Self {
        Self {
            status: Arc::new(AtomicU8::new(status.as_u8())),
        }
    }

    fn set(&self, status: CheckStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Current status.
    pub fn status(&self) -> CheckStatus {
        CheckStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Whether the check has reached a final state.
    pub fn is_resolved(&self) -> bool {
        self.status() != CheckStatus::Pending
    }
}

/// Accumulator that block input checks are submitted to.
pub trait ScriptValidation: Send + Sync {
    /// Whether checks are deferred, so `result()` must be consulted.
    fn active(&self) -> bool;

    /// Submit a check. Never blocks on the check itself when active.
    fn submit(&self, check: ScriptCheck) -> ScriptCheckHandle;

    /// Wait for every submitted check and report whether all passed.
    fn result(&self) -> bool;

    /// Whether an earlier failure has cancelled this accumulator for good.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Runs each check immediately on submission.
#[derive(Debug, Default)]
pub struct InlineScriptValidation {
    failed: AtomicBool,
}

impl InlineScriptValidation {
    /// New inline accumulator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptValidation for InlineScriptValidation {
    fn active(&self) -> bool {
        false
    }

    fn submit(&self, check: ScriptCheck) -> ScriptCheckHandle {
        match check() {
            Ok(()) => ScriptCheckHandle::new(CheckStatus::Passed),
            Err(e) => {
                debug!(error = %e, "Inline script check failed");
                self.failed.store(true, Ordering::Release);
                ScriptCheckHandle::new(CheckStatus::Failed)
            }
        }
    }

    fn result(&self) -> bool {
        !self.failed.load(Ordering::Acquire)
    }
}

struct GroupShared {
    pending: Mutex<usize>,
    done: Condvar,
    cancelled: AtomicBool,
    first_error: Mutex<Option<ConsensusError>>,
}

impl GroupShared {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.done.notify_all();
        }
    }
}

/// Runs checks on a thread pool; `result()` is the join barrier.
///
/// One group serves one block. A cancelled group stays cancelled, and block
/// acceptance refuses it.
pub struct ScriptCheckGroup {
    pool: Arc<rayon::ThreadPool>,
    shared: Arc<GroupShared>,
}

impl ScriptCheckGroup {
    /// New group running on `pool`.
    pub fn new(pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            pool,
            shared: Arc::new(GroupShared {
                pending: Mutex::new(0),
                done: Condvar::new(),
                cancelled: AtomicBool::new(false),
                first_error: Mutex::new(None),
            }),
        }
    }

    /// New group with a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("script-check-{i}"))
            .build()?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Whether a failure has cancelled the group.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// First failure seen, if any.
    pub fn first_error(&self) -> Option<ConsensusError> {
        self.shared.first_error.lock().clone()
    }
}

impl ScriptValidation for ScriptCheckGroup {
    fn active(&self) -> bool {
        true
    }

    fn submit(&self, check: ScriptCheck) -> ScriptCheckHandle {
        if self.is_cancelled() {
            return ScriptCheckHandle::new(CheckStatus::Cancelled);
        }

        let handle = ScriptCheckHandle::new(CheckStatus::Pending);
        *self.shared.pending.lock() += 1;

        let shared = Arc::clone(&self.shared);
        let task_handle = handle.clone();
        self.pool.spawn(move || {
            if shared.cancelled.load(Ordering::Acquire) {
                task_handle.set(CheckStatus::Cancelled);
            } else {
                let outcome = panic::catch_unwind(AssertUnwindSafe(check))
                    .unwrap_or(Err(ConsensusError::ScriptCheckPanicked));
                match outcome {
                    Ok(()) => task_handle.set(CheckStatus::Passed),
                    Err(e) => {
                        task_handle.set(CheckStatus::Failed);
                        if !shared.cancelled.swap(true, Ordering::AcqRel) {
                            warn!(error = %e, "Script check failed, cancelling remaining checks");
                            *shared.first_error.lock() = Some(e);
                        }
                    }
                }
            }
            shared.finish_one();
        });

        handle
    }

    fn result(&self) -> bool {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.done.wait(&mut pending);
        }
        !self.is_cancelled()
    }

    fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }
}
