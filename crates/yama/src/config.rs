//! Per-context execution configuration.

use crate::dbg::Dbg;

/// Default bound on the call-frame stack of a context.
pub const DEFAULT_MAX_CALL_FRAMES: usize = 1024;

/// Configuration applied when a context is created.
#[derive(Debug, Clone)]
pub struct CtxConfig {
    /// Maximum call-frame depth; exceeding it raises a stack-overflow panic.
    pub max_call_frames: usize,
    /// Diagnostic sink for the context's command and panic traffic.
    pub dbg: Dbg,
}

impl Default for CtxConfig {
    fn default() -> Self {
        Self {
            max_call_frames: DEFAULT_MAX_CALL_FRAMES,
            dbg: Dbg::none(),
        }
    }
}

impl CtxConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the call-frame depth bound.
    #[must_use]
    pub fn with_max_call_frames(mut self, max_call_frames: usize) -> Self {
        self.max_call_frames = max_call_frames;
        self
    }

    /// Sets the diagnostic sink.
    #[must_use]
    pub fn with_dbg(mut self, dbg: Dbg) -> Self {
        self.dbg = dbg;
        self
    }
}
