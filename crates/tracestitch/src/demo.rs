//! Small traced service used to try propagation end to end: each `/work`
//! request does a bit of simulated database work and optionally calls the
//! next service in a chain.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracestitch_core::profiler::Profiler;
use tracestitch_http::{PropagateConfig, PropagateLayer, RespondLayer, TracedClient};
use tracing::{Level, warn};

#[derive(Clone)]
pub struct DemoState {
    pub name: String,
    pub downstream: Option<String>,
    pub client: reqwest::Client,
    pub propagate: PropagateConfig,
}

#[derive(Debug, Serialize)]
pub struct WorkResponse {
    pub service: String,
    pub trace_id: Option<String>,
    pub downstream: Option<String>,
    pub merged: u64,
}

pub fn router(state: DemoState, respond: RespondLayer) -> Router {
    Router::new()
        .route("/work", get(work))
        .route("/healthz", get(|| async { "ok" }))
        .layer(respond)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

async fn work(State(state): State<DemoState>, req: Request) -> Json<WorkResponse> {
    let profiler = req.extensions().get::<Profiler>().cloned();
    let step = profiler
        .as_ref()
        .map(|p| p.step(format!("{} work", state.name)));

    {
        let _sql = profiler
            .as_ref()
            .map(|p| p.sub_timing("sql", format!("select * from {}", state.name)));
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let mut downstream = None;
    let mut merged = 0;
    if let Some(url) = &state.downstream {
        let layer = PropagateLayer::new(profiler.clone()).with_config(state.propagate.clone());
        let client = TracedClient::new(state.client.clone(), &layer);
        downstream = Some(match client.get(url).await {
            Ok(resp) => resp.status().to_string(),
            Err(err) => {
                warn!(error = %err, url = %url, "downstream call failed");
                format!("error: {err}")
            }
        });
        merged = client.stats().merged();
    }
    drop(step);

    Json(WorkResponse {
        service: state.name.clone(),
        trace_id: profiler.map(|p| p.id().to_string()),
        downstream,
        merged,
    })
}
