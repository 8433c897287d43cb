use std::fmt;

use tracing::dispatcher;
use tracing::{Dispatch, Level};
use tracing_appender::non_blocking::WorkerGuard;

use super::{SinkKind, TelemetryError};

/// The composed logger: a severity threshold and an ordered set of active
/// sinks behind one [`Dispatch`].
///
/// The handle is the only object shared across concurrent callers; each
/// sink serializes its own writes internally, so emitting through it needs
/// no external locking. The sink set is fixed at construction; changing
/// it means building a new handle.
pub struct TelemetryHandle {
    dispatch: Dispatch,
    level: Level,
    sinks: Vec<SinkKind>,
    // Flushes the non-blocking file writer when the handle is dropped.
    _guards: Vec<WorkerGuard>,
}

impl TelemetryHandle {
    pub(crate) fn new(
        dispatch: Dispatch,
        level: Level,
        sinks: Vec<SinkKind>,
        guards: Vec<WorkerGuard>,
    ) -> Self {
        Self {
            dispatch,
            level,
            sinks,
            _guards: guards,
        }
    }

    /// The dispatcher events should be routed through.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The resolved severity threshold.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The sinks that actually attached, in chain order.
    pub fn sinks(&self) -> &[SinkKind] {
        &self.sinks
    }

    /// Runs `f` with this handle as the current dispatcher, so `tracing`
    /// macros inside it reach these sinks.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Installs this handle as the process-wide default dispatcher.
    ///
    /// Purely a convenience for binaries; nothing in this crate relies on
    /// a global registry.
    pub fn install(&self) -> Result<(), TelemetryError> {
        dispatcher::set_global_default(self.dispatch.clone())?;
        Ok(())
    }
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("level", &self.level)
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}
