//! Live, in-process trace for a single request.
//!
//! A [`Profiler`] is a cheap handle; clones share the same tree. Steps are
//! opened with [`Profiler::step`] and closed when the returned guard drops,
//! so every exit path (early return, `?`, a dropped future) closes them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use crate::clock::{Clock, MonotonicClock};
use crate::model::{SubTiming, Timing, Trace};

/// Child indices leading from the root timing to a node. The empty path is
/// the root itself.
pub type NodePath = Vec<usize>;

#[derive(Clone)]
pub struct Profiler {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

struct State {
    trace: Trace,
    active: Vec<NodePath>,
    stopped: bool,
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Profiler {
    pub fn start(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(MonotonicClock::start()))
    }

    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        let root = Timing::new(name.clone(), 0.0);
        let trace = Trace {
            id,
            name,
            started: Utc::now(),
            duration_ms: 0.0,
            machine_name: machine_name(),
            root: Some(root),
        };
        Self {
            inner: Arc::new(Inner {
                id,
                clock,
                state: Mutex::new(State {
                    trace,
                    active: Vec::new(),
                    stopped: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Milliseconds since the trace started, frozen once stopped.
    pub fn elapsed_ms(&self) -> f64 {
        let state = self.state();
        if state.stopped {
            return state.trace.duration_ms;
        }
        self.inner.clock.elapsed_ms()
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    /// Innermost open step, or the root when none is open.
    pub fn active_path(&self) -> NodePath {
        self.state().active.last().cloned().unwrap_or_default()
    }

    /// Opens a child of the active node and makes it the active node.
    /// Returns an inert guard once the trace is stopped.
    pub fn step(&self, name: impl Into<String>) -> Step {
        self.open(None, name.into())
    }

    /// Opens a child of the node at `parent` without making it active.
    /// Concurrent work under one profiler opens its steps this way so that
    /// siblings stay siblings.
    pub fn step_under(&self, parent: &[usize], name: impl Into<String>) -> Step {
        self.open(Some(parent), name.into())
    }

    fn open(&self, parent: Option<&[usize]>, name: String) -> Step {
        let now = self.inner.clock.elapsed_ms();
        let mut state = self.state();
        let inert = Step {
            profiler: self.clone(),
            path: None,
        };
        if state.stopped {
            return inert;
        }
        let activate = parent.is_none();
        let parent = match parent {
            Some(path) => path.to_vec(),
            None => state.active.last().cloned().unwrap_or_default(),
        };
        let Some(node) = state
            .trace
            .root
            .as_mut()
            .and_then(|root| root.node_at_mut(&parent))
        else {
            return inert;
        };
        node.children.push(Timing::new(name, now));
        let mut path = parent;
        path.push(node.children.len() - 1);
        if activate {
            state.active.push(path.clone());
        }
        Step {
            profiler: self.clone(),
            path: Some(path),
        }
    }

    /// Starts a leaf measurement on the active node; recorded when the guard
    /// drops.
    pub fn sub_timing(&self, kind: impl Into<String>, command: impl Into<String>) -> SubStep {
        SubStep {
            profiler: self.clone(),
            parent: self.active_path(),
            kind: kind.into(),
            command: command.into(),
            start_ms: self.inner.clock.elapsed_ms(),
        }
    }

    pub fn add_sub_timing(&self, parent: &[usize], sub: SubTiming) -> bool {
        let mut state = self.state();
        match state.trace.root.as_mut().and_then(|r| r.node_at_mut(parent)) {
            Some(node) => {
                node.sub_timings.push(sub);
                true
            }
            None => false,
        }
    }

    /// Moves `child` under the node at `parent`. Returns `false` if the path
    /// no longer resolves.
    pub fn append_child(&self, parent: &[usize], child: Timing) -> bool {
        let mut state = self.state();
        match state.trace.root.as_mut().and_then(|r| r.node_at_mut(parent)) {
            Some(node) => {
                node.children.push(child);
                true
            }
            None => false,
        }
    }

    /// Copy of the current tree. The root duration is filled in with the
    /// elapsed time if the trace is still running.
    pub fn snapshot(&self) -> Trace {
        let now = self.inner.clock.elapsed_ms();
        let state = self.state();
        let mut trace = state.trace.clone();
        if !state.stopped {
            trace.duration_ms = now;
        }
        trace
    }

    /// Finishes the trace. Calling it again returns the same snapshot.
    pub fn stop(&self) -> Trace {
        let now = self.inner.clock.elapsed_ms();
        let mut state = self.state();
        if !state.stopped {
            state.stopped = true;
            state.trace.duration_ms = now;
            if let Some(root) = state.trace.root.as_mut() {
                root.duration_ms = Some(now - root.start_ms);
            }
        }
        state.trace.clone()
    }

    fn close(&self, path: &[usize]) {
        let now = self.inner.clock.elapsed_ms();
        let mut state = self.state();
        if let Some(node) = state.trace.root.as_mut().and_then(|r| r.node_at_mut(path)) {
            if node.duration_ms.is_none() {
                node.duration_ms = Some(now - node.start_ms);
            }
        }
        if let Some(pos) = state.active.iter().rposition(|p| p.as_slice() == path) {
            state.active.remove(pos);
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open step. Closing happens on drop.
#[must_use = "a step closes as soon as it is dropped"]
pub struct Step {
    profiler: Profiler,
    path: Option<NodePath>,
}

impl Step {
    pub fn path(&self) -> Option<&[usize]> {
        self.path.as_deref()
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.profiler.close(&path);
        }
    }
}

#[must_use = "a sub-timing is recorded as soon as it is dropped"]
pub struct SubStep {
    profiler: Profiler,
    parent: NodePath,
    kind: String,
    command: String,
    start_ms: f64,
}

impl Drop for SubStep {
    fn drop(&mut self) {
        let duration = self.profiler.inner.clock.elapsed_ms() - self.start_ms;
        let sub = SubTiming::new(
            std::mem::take(&mut self.kind),
            std::mem::take(&mut self.command),
            self.start_ms,
            duration,
        );
        self.profiler.add_sub_timing(&self.parent, sub);
    }
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
