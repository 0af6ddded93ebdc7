//! Rigid translation of a timing tree onto another clock origin.
//!
//! A remote service measures offsets from its own trace start. Before its
//! tree can live inside a local trace every start offset is shifted by the
//! same amount; durations never change.

use crate::model::Timing;

/// Moves `timing` so it starts at `new_start_ms`, dragging every descendant
/// and sub-timing along by the same delta.
pub fn rebase_absolute(timing: Option<&mut Timing>, new_start_ms: f64) {
    let Some(timing) = timing else {
        return;
    };
    let delta = new_start_ms - timing.start_ms;
    rebase_delta(Some(timing), delta);
}

/// Adds `delta_ms` to the start of `timing`, each of its children
/// (recursively) and each sub-timing.
pub fn rebase_delta(timing: Option<&mut Timing>, delta_ms: f64) {
    let Some(timing) = timing else {
        return;
    };
    timing.start_ms += delta_ms;
    for sub in &mut timing.sub_timings {
        sub.start_ms += delta_ms;
    }
    for child in &mut timing.children {
        rebase_delta(Some(child), delta_ms);
    }
}
