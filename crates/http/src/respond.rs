//! Server side: traces each inbound request and, when the caller asked for
//! it, returns the finished trace in a response header.

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracestitch_core::codec::WireCodec;
use tracestitch_core::config::Config;
use tracestitch_core::error::{Result, StitchError};
use tracestitch_core::model::Trace;
use tracestitch_core::profiler::Profiler;
use tracing::{debug, warn};

use crate::message::{REQUEST_HEADER_NAME, RESULTS_HEADER_NAME};

/// Adds the encoded `trace` to `response_headers` if the request carried a
/// correlation token. Returns whether a blob was attached.
pub fn attach_trace(
    request_headers: &HeaderMap,
    trace: Option<&Trace>,
    response_headers: &mut HeaderMap,
    codec: &WireCodec,
) -> Result<bool> {
    if !request_headers.contains_key(&REQUEST_HEADER_NAME) {
        return Ok(false);
    }
    let Some(trace) = trace else {
        return Ok(false);
    };
    insert_blob(trace, response_headers, codec)?;
    Ok(true)
}

fn insert_blob(trace: &Trace, response_headers: &mut HeaderMap, codec: &WireCodec) -> Result<()> {
    let blob = codec.encode(trace)?;
    let value = HeaderValue::from_str(&blob)
        .map_err(|e| StitchError::InvalidArgument(format!("blob is not a header value: {e}")))?;
    response_headers.insert(RESULTS_HEADER_NAME, value);
    Ok(())
}

/// Starts a [`Profiler`] per request and exposes it as a request extension.
///
/// A disabled layer inserts nothing, so handlers extract
/// `Option<Extension<Profiler>>` and treat `None` as "not traced".
#[derive(Debug, Clone, Copy)]
pub struct RespondLayer {
    enabled: bool,
    codec: WireCodec,
}

impl Default for RespondLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RespondLayer {
    pub fn new() -> Self {
        Self {
            enabled: true,
            codec: WireCodec::default(),
        }
    }

    /// Requests pass through untraced and never receive a blob.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            enabled: cfg.enabled,
            codec: WireCodec::new(cfg.compression),
        }
    }

    pub fn with_codec(mut self, codec: WireCodec) -> Self {
        self.codec = codec;
        self
    }
}

impl<S> Layer<S> for RespondLayer {
    type Service = Respond<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Respond {
            inner,
            enabled: self.enabled,
            codec: self.codec,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Respond<S> {
    inner: S,
    enabled: bool,
    codec: WireCodec,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Respond<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Response<ResBody>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if !self.enabled {
            return Box::pin(self.inner.call(req));
        }

        let request_headers = req.headers().clone();
        // An outer layer may already own the request's profiler.
        let profiler = match req.extensions().get::<Profiler>() {
            Some(existing) => existing.clone(),
            None => {
                let profiler = Profiler::start(format!("{} {}", req.method(), req.uri().path()));
                req.extensions_mut().insert(profiler.clone());
                profiler
            }
        };
        let codec = self.codec;
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?;
            let trace = profiler.stop();
            match attach_trace(&request_headers, Some(&trace), response.headers_mut(), &codec) {
                Ok(true) => debug!(
                    trace_id = %trace.id,
                    nodes = trace.node_count(),
                    "attached trace to response"
                ),
                Ok(false) => {}
                Err(err) => warn!(trace_id = %trace.id, error = %err, "failed to attach trace"),
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::extract::Extension;
    use axum::routing::get;
    use testkit::wide_trace;
    use tower::ServiceExt;
    use tracestitch_core::decode;

    use super::*;
    use crate::message::header_str;

    async fn work(profiler: Option<Extension<Profiler>>) -> &'static str {
        let Some(Extension(profiler)) = profiler else {
            return "untraced";
        };
        for i in 0..60 {
            let _step = profiler.step(format!("step {i}"));
        }
        "done"
    }

    fn app(layer: RespondLayer) -> Router {
        Router::new().route("/work", get(work)).layer(layer)
    }

    fn request(with_token: bool) -> Request<Body> {
        let mut builder = Request::builder().uri("/work");
        if with_token {
            builder = builder.header(REQUEST_HEADER_NAME, "4bf92f35-77b3-4da6-a3ce-929d0e0e4736");
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn returns_trace_when_asked() {
        let resp = app(RespondLayer::new()).oneshot(request(true)).await.unwrap();
        let blob = header_str(resp.headers(), &RESULTS_HEADER_NAME).unwrap();
        let trace = decode(blob).unwrap();

        assert_eq!(trace.name, "GET /work");
        let root = trace.root.unwrap();
        assert_eq!(root.children.len(), 60);
        assert!(root.duration_ms.is_some());
        assert!(root.children.iter().all(|c| c.duration_ms.is_some()));
    }

    #[tokio::test]
    async fn never_attaches_without_token() {
        let resp = app(RespondLayer::new()).oneshot(request(false)).await.unwrap();
        assert!(!resp.headers().contains_key(&RESULTS_HEADER_NAME));
    }

    #[tokio::test]
    async fn disabled_layer_sends_nothing() {
        let app = Router::new()
            .route("/plain", get(|| async { "ok" }))
            .layer(RespondLayer::disabled());
        let req = Request::builder()
            .uri("/plain")
            .header(REQUEST_HEADER_NAME, "abc")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(!resp.headers().contains_key(&RESULTS_HEADER_NAME));
    }

    #[tokio::test]
    async fn disabled_layer_still_serves_profiled_handlers() {
        let resp = app(RespondLayer::disabled()).oneshot(request(true)).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(!resp.headers().contains_key(&RESULTS_HEADER_NAME));
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"untraced");
    }

    #[tokio::test]
    async fn empty_token_still_counts_as_asking() {
        let req = Request::builder()
            .uri("/work")
            .header(REQUEST_HEADER_NAME, "")
            .body(Body::empty())
            .unwrap();
        let resp = app(RespondLayer::new()).oneshot(req).await.unwrap();
        let blob = header_str(resp.headers(), &RESULTS_HEADER_NAME).unwrap();
        assert_eq!(decode(blob).unwrap().node_count(), 61);
    }

    #[test]
    fn attach_trace_is_opt_in() {
        let trace = wide_trace(55);
        assert!(trace.node_count() > 50);
        let codec = WireCodec::default();

        let mut out = HeaderMap::new();
        assert!(!attach_trace(&HeaderMap::new(), Some(&trace), &mut out, &codec).unwrap());
        assert!(out.is_empty());

        let mut asked = HeaderMap::new();
        asked.insert(REQUEST_HEADER_NAME, HeaderValue::from_static("caller"));
        assert!(!attach_trace(&asked, None, &mut out, &codec).unwrap());
        assert!(out.is_empty());

        assert!(attach_trace(&asked, Some(&trace), &mut out, &codec).unwrap());
        let blob = header_str(&out, &RESULTS_HEADER_NAME).unwrap();
        assert_eq!(decode(blob).unwrap(), trace);
    }

    #[test]
    fn attach_trace_surfaces_invalid_traces() {
        let mut trace = wide_trace(1);
        trace.root = None;
        let mut asked = HeaderMap::new();
        asked.insert(REQUEST_HEADER_NAME, HeaderValue::from_static("caller"));
        let err = attach_trace(&asked, Some(&trace), &mut HeaderMap::new(), &WireCodec::default())
            .unwrap_err();
        assert!(matches!(err, StitchError::InvalidArgument(_)));
    }
}
