use std::sync::{Arc, Mutex, PoisonError};

use crate::model::Trace;
use crate::profiler::Profiler;

/// Holder for the profiler bound to one logical request.
///
/// Passed explicitly to whatever needs it instead of living in a global. A
/// disabled context never starts a profiler, which makes every consumer
/// transparent.
#[derive(Clone, Debug)]
pub struct TraceContext {
    enabled: bool,
    current: Arc<Mutex<Option<Profiler>>>,
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceContext {
    pub fn new() -> Self {
        Self {
            enabled: true,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn current(&self) -> Option<Profiler> {
        self.slot().clone()
    }

    /// Starts a fresh profiler, replacing any previous one.
    pub fn start(&self, name: impl Into<String>) -> Option<Profiler> {
        self.install(self.enabled.then(|| Profiler::start(name)))
    }

    /// Stops and detaches the current profiler.
    pub fn stop(&self) -> Option<Trace> {
        self.slot().take().map(|p| p.stop())
    }

    fn install(&self, profiler: Option<Profiler>) -> Option<Profiler> {
        let profiler = profiler?;
        *self.slot() = Some(profiler.clone());
        Some(profiler)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Profiler>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_current_stop_cycle() {
        let ctx = TraceContext::new();
        assert!(ctx.current().is_none());

        let profiler = ctx.start("GET /a").unwrap();
        assert_eq!(ctx.current().map(|p| p.id()), Some(profiler.id()));

        let trace = ctx.stop().unwrap();
        assert_eq!(trace.id, profiler.id());
        assert!(profiler.is_stopped());
        assert!(ctx.current().is_none());
        assert!(ctx.stop().is_none());
    }

    #[test]
    fn disabled_context_never_starts() {
        let ctx = TraceContext::disabled();
        assert!(ctx.start("GET /a").is_none());
        assert!(ctx.current().is_none());
        assert!(ctx.stop().is_none());
    }

    #[test]
    fn clones_share_the_slot() {
        let ctx = TraceContext::new();
        let other = ctx.clone();
        let profiler = ctx.start("x").unwrap();
        assert_eq!(other.current().map(|p| p.id()), Some(profiler.id()));
    }
}
