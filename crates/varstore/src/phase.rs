//! Boot/runtime phase.
//!
//! The store consults a [`PhaseSource`] on every operation. Once the
//! platform hands control to the operating system the phase becomes
//! [`Phase::Runtime`] and never goes back.

use std::sync::atomic::{AtomicBool, Ordering};

/// Execution phase of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before boot services are exited; everything is visible.
    Boot,
    /// After boot services are exited; only runtime entries are visible.
    Runtime,
}

/// Provides the current phase.
pub trait PhaseSource: Send + Sync {
    /// Current phase.
    fn phase(&self) -> Phase;
}

/// One-way boot to runtime latch.
#[derive(Debug, Default)]
pub struct PhaseLatch {
    runtime: AtomicBool,
}

impl PhaseLatch {
    /// Create a latch in the boot phase.
    pub const fn new() -> Self {
        Self {
            runtime: AtomicBool::new(false),
        }
    }

    /// Switch to the runtime phase.
    pub fn enter_runtime(&self) {
        self.runtime.store(true, Ordering::Release);
    }
}

impl PhaseSource for PhaseLatch {
    fn phase(&self) -> Phase {
        if self.runtime.load(Ordering::Acquire) {
            Phase::Runtime
        } else {
            Phase::Boot
        }
    }
}
