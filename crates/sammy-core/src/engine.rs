//! Outer facade selecting between the in-process protocol engine and the
//! subprocess engines (heimdall/thor/odin4) that this crate does not
//! re-implement. Those are thin orchestration surfaces around third-party
//! binaries and out of scope per the engine's purpose; they are modeled
//! here only as tagged variants so a caller's `--engine` selection has
//! somewhere to land.

use crate::error::EngineError;
use crate::flasher::{CancelToken, ProgressSink};
use crate::orchestrator::{self, FlashSource, OrchestratorOptions};

/// Which flashing engine to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// The in-process download-mode protocol engine implemented by this
    /// crate.
    Native,
    /// Shells out to `heimdall`. Not implemented.
    Heimdall,
    /// Shells out to `thor`. Not implemented.
    Thor,
    /// Shells out to `odin4`. Not implemented.
    Odin4,
}

impl Engine {
    pub fn flash(
        self,
        sources: &[FlashSource],
        options: &OrchestratorOptions,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        match self {
            Engine::Native => orchestrator::run(sources, options, progress, cancel),
            Engine::Heimdall => Err(EngineError::Unsupported("heimdall")),
            Engine::Thor => Err(EngineError::Unsupported("thor")),
            Engine::Odin4 => Err(EngineError::Unsupported("odin4")),
        }
    }
}
