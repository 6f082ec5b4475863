use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::BackendError;

/// Shared cancellation flag. Children observe their ancestors, so
/// cancelling a group cancels every group derived from it but not the
/// other way around.
#[derive(Clone, Default)]
pub struct CancelGroup {
    node: Arc<Node>,
}

#[derive(Default)]
struct Node {
    cancelled: AtomicBool,
    parent: Option<Arc<Node>>,
}

impl CancelGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        let node = Node { cancelled: AtomicBool::new(false), parent: Some(self.node.clone()) };
        Self { node: Arc::new(node) }
    }

    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.node);
        while let Some(current) = node {
            if current.cancelled.load(Ordering::Acquire) {
                return true;
            }
            node = current.parent.as_ref();
        }
        false
    }

    /// `Err(Cancelled)` once the group or an ancestor is cancelled.
    pub fn check(&self) -> Result<(), BackendError> {
        if self.is_cancelled() { Err(BackendError::Cancelled) } else { Ok(()) }
    }
}

impl fmt::Debug for CancelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelGroup").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Steps of the multi-backend sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Setup,
    PreAnalysis,
    Tentative,
    FinishTentative,
    LoadKeepFiles,
    Translate,
    Collate,
    PreWrite,
    WriteOutputs,
    WriteKeepFiles,
    PostWrite,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::PreAnalysis => "pre-analysis",
            Self::Tentative => "tentative",
            Self::FinishTentative => "finish-tentative",
            Self::LoadKeepFiles => "load-keep-files",
            Self::Translate => "translate",
            Self::Collate => "collate",
            Self::PreWrite => "pre-write",
            Self::WriteOutputs => "write-outputs",
            Self::WriteKeepFiles => "write-keep-files",
            Self::PostWrite => "post-write",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The join about to run, handed to the cancel check before it starts.
///
/// [`InFlight::handle`] outlives the callback, so a watchdog can cancel the
/// join while it is running. Only the backends that observe the
/// cancellation fail, with [`BackendError::Cancelled`]; the rest of the
/// sequence goes on. Everything stops only when the group passed to
/// [`crate::orchestrate`] is cancelled.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub(crate) phase: Phase,
    pub(crate) join: CancelGroup,
}

impl InFlight {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The join's own group; it can be sent to another thread.
    pub fn handle(&self) -> CancelGroup {
        self.join.clone()
    }

    pub fn cancel(&self) {
        tracing::debug!(phase = %self.phase, "in-flight phase cancelled");
        self.join.cancel();
    }
}
