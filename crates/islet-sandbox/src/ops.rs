//! Policy over dangerous runtime operations.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SandboxError, SandboxResult};

/// Process-level operations the runtime can gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuntimeOp {
    /// Terminate the process.
    Exit,
    /// Signal another process.
    Kill,
    /// Change the working directory.
    Chdir,
    /// Change process credentials.
    SetUid,
    /// Touch raw file descriptors.
    RawFd,
    /// Spawn a subprocess.
    Spawn,
}

impl RuntimeOp {
    /// Every gated operation.
    pub const ALL: [Self; 6] = [
        Self::Exit,
        Self::Kill,
        Self::Chdir,
        Self::SetUid,
        Self::RawFd,
        Self::Spawn,
    ];
}

impl fmt::Display for RuntimeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exit => "exit",
            Self::Kill => "kill",
            Self::Chdir => "chdir",
            Self::SetUid => "setuid",
            Self::RawFd => "raw-fd",
            Self::Spawn => "spawn",
        };
        f.write_str(name)
    }
}

/// Allow/deny table for [`RuntimeOp`]s.
///
/// Everything is allowed until hardening locks the table; after locking the
/// table can no longer be re-opened.
#[derive(Debug, Clone)]
pub struct RuntimeOps {
    allowed: BTreeMap<RuntimeOp, bool>,
    frozen: bool,
}

impl Default for RuntimeOps {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeOps {
    /// A fully permissive, unfrozen table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed: RuntimeOp::ALL.iter().map(|op| (*op, true)).collect(),
            frozen: false,
        }
    }

    /// Deny every operation and freeze the table. Returns the number of
    /// operations that changed state.
    pub fn lock_dangerous(&mut self) -> usize {
        let mut changed: usize = 0;
        for allowed in self.allowed.values_mut() {
            if *allowed {
                *allowed = false;
                changed = changed.saturating_add(1);
            }
        }
        self.frozen = true;
        changed
    }

    /// Check whether an operation may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OpDenied`] for denied operations.
    pub fn check(&self, op: RuntimeOp) -> SandboxResult<()> {
        if self.allowed.get(&op).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(SandboxError::OpDenied(op))
        }
    }

    /// Whether the table is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Whether every operation is denied.
    #[must_use]
    pub fn all_denied(&self) -> bool {
        self.allowed.values().all(|allowed| !allowed)
    }
}
