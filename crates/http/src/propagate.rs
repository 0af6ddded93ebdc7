//! Client side: tags outgoing requests with the local trace id and grafts
//! any trace returned by the remote service into the local tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderValue};
use tower::{Layer, Service};
use tracestitch_core::codec::{BlobCompression, WireCodec};
use tracestitch_core::config::{Config, normalize_step_prefix};
use tracestitch_core::ids::CorrelationToken;
use tracestitch_core::headers::DEFAULT_STEP_PREFIX;
use tracestitch_core::profiler::Profiler;
use tracestitch_core::rebase::rebase_absolute;
use tracestitch_core::TraceContext;
use tracing::{debug, warn};

use crate::message::{
    OutboundRequest, REQUEST_HEADER_NAME, RESULTS_HEADER_NAME, TracedResponse, header_str,
};

#[derive(Debug, Clone)]
pub struct PropagateConfig {
    /// Bracket each call in its own step.
    pub add_step: bool,
    pub step_prefix: String,
    pub compression: BlobCompression,
}

impl Default for PropagateConfig {
    fn default() -> Self {
        Self {
            add_step: true,
            step_prefix: DEFAULT_STEP_PREFIX.to_string(),
            compression: BlobCompression::default(),
        }
    }
}

impl PropagateConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            add_step: cfg.add_step,
            step_prefix: normalize_step_prefix(&cfg.step_prefix),
            compression: cfg.compression,
        }
    }

    pub fn step_name(&self, method: &str, target: &str) -> String {
        if self.step_prefix.is_empty() {
            format!("{method} {target}")
        } else {
            format!("{} {method} {target}", self.step_prefix)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Remote trace decoded, rebased and attached.
    Merged,
    /// Response carried no trace.
    Skipped,
    /// Response carried a trace that could not be used.
    Failed,
}

/// Per-layer counters, shared by every service the layer produced.
#[derive(Debug, Default)]
pub struct MergeStats {
    merged: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl MergeStats {
    pub fn merged(&self) -> u64 {
        self.merged.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: MergeOutcome) {
        let counter = match outcome {
            MergeOutcome::Merged => &self.merged,
            MergeOutcome::Skipped => &self.skipped,
            MergeOutcome::Failed => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct PropagateLayer {
    profiler: Option<Profiler>,
    cfg: Arc<PropagateConfig>,
    stats: Arc<MergeStats>,
}

impl PropagateLayer {
    /// `None` produces a pass-through layer.
    pub fn new(profiler: Option<Profiler>) -> Self {
        Self {
            profiler,
            cfg: Arc::new(PropagateConfig::default()),
            stats: Arc::new(MergeStats::default()),
        }
    }

    pub fn from_context(ctx: &TraceContext) -> Self {
        Self::new(ctx.current())
    }

    pub fn with_config(mut self, cfg: PropagateConfig) -> Self {
        self.cfg = Arc::new(cfg);
        self
    }

    pub fn stats(&self) -> Arc<MergeStats> {
        self.stats.clone()
    }
}

impl<S> Layer<S> for PropagateLayer {
    type Service = Propagate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Propagate {
            inner,
            profiler: self.profiler.clone(),
            cfg: self.cfg.clone(),
            stats: self.stats.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Propagate<S> {
    inner: S,
    profiler: Option<Profiler>,
    cfg: Arc<PropagateConfig>,
    stats: Arc<MergeStats>,
}

impl<S> Propagate<S> {
    pub fn stats(&self) -> Arc<MergeStats> {
        self.stats.clone()
    }
}

impl<S, Req> Service<Req> for Propagate<S>
where
    S: Service<Req>,
    S::Response: TracedResponse + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: OutboundRequest,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Req) -> Self::Future {
        let Some(profiler) = self.profiler.clone() else {
            return Box::pin(self.inner.call(req));
        };

        let call_start = profiler.elapsed_ms();
        // The call's step is not made active: concurrent calls on one
        // profiler must open siblings, not nest inside each other.
        let at_call = profiler.active_path();
        let step = self.cfg.add_step.then(|| {
            profiler.step_under(&at_call, self.cfg.step_name(req.method_name(), &req.target()))
        });
        let parent = match step.as_ref().and_then(|s| s.path()) {
            Some(path) => path.to_vec(),
            None => at_call,
        };

        let token = CorrelationToken::for_trace(profiler.id());
        match HeaderValue::from_str(token.as_str()) {
            Ok(value) => {
                req.header_map_mut().insert(REQUEST_HEADER_NAME, value);
            }
            Err(err) => warn!(error = %err, "trace id is not a valid header value"),
        }

        let codec = WireCodec::new(self.cfg.compression);
        let stats = self.stats.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let _step = step;
            let response = fut.await?;
            let outcome = merge_remote(
                &profiler,
                &parent,
                call_start,
                response.header_map(),
                &codec,
            );
            stats.record(outcome);
            Ok(response)
        })
    }
}

/// Decodes the trace carried by `headers`, shifts it to `call_start` and
/// appends its root under `parent`. Never fails: a bad blob is logged and
/// reported as [`MergeOutcome::Failed`].
pub fn merge_remote(
    profiler: &Profiler,
    parent: &[usize],
    call_start: f64,
    headers: &HeaderMap,
    codec: &WireCodec,
) -> MergeOutcome {
    if !headers.contains_key(&RESULTS_HEADER_NAME) {
        return MergeOutcome::Skipped;
    }
    let Some(blob) = header_str(headers, &RESULTS_HEADER_NAME) else {
        warn!(trace_id = %profiler.id(), "remote trace header is not text; skipping merge");
        return MergeOutcome::Failed;
    };

    let mut remote = match codec.decode(blob) {
        Ok(trace) => trace,
        Err(err) => {
            warn!(trace_id = %profiler.id(), error = %err, "discarding malformed remote trace");
            return MergeOutcome::Failed;
        }
    };

    let Some(mut root) = remote.root.take() else {
        debug!(remote_id = %remote.id, "remote trace has no root; nothing to merge");
        return MergeOutcome::Skipped;
    };
    rebase_absolute(Some(&mut root), call_start);

    let nodes = root.node_count();
    if !profiler.append_child(parent, root) {
        warn!(trace_id = %profiler.id(), ?parent, "merge target vanished; dropping remote trace");
        return MergeOutcome::Failed;
    }
    debug!(
        trace_id = %profiler.id(),
        remote_id = %remote.id,
        remote_machine = %remote.machine_name,
        nodes,
        call_start,
        "merged remote trace"
    );
    MergeOutcome::Merged
}
