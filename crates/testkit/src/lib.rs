use std::net::SocketAddr;

use base64::Engine;
use chrono::{TimeZone, Utc};
use tracestitch_core::codec::compress;
use tracestitch_core::model::{SubTiming, Timing, Trace};
use uuid::Uuid;

/// Trace produced by an "orders" service: an 80ms request with a 50ms
/// database step starting 10ms in.
pub fn remote_orders_trace() -> Trace {
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    Trace {
        id: Uuid::new_v4(),
        name: "GET /api/orders".to_string(),
        started: base,
        duration_ms: 80.0,
        machine_name: "orders-1".to_string(),
        root: Some(
            Timing::new("GET /api/orders", 0.0)
                .with_duration(80.0)
                .with_child(
                    Timing::new("db", 10.0)
                        .with_duration(50.0)
                        .with_sub_timing(SubTiming::new(
                            "sql",
                            "select * from orders where customer_id = @id",
                            12.0,
                            41.0,
                        )),
                ),
        ),
    }
}

/// Trace whose root has `children` direct children.
pub fn wide_trace(children: usize) -> Trace {
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let mut root = Timing::new("GET /batch", 0.0).with_duration(children as f64 * 2.0);
    for i in 0..children {
        root = root.with_child(Timing::new(format!("item {i}"), i as f64 * 2.0).with_duration(1.0));
    }
    Trace {
        id: Uuid::new_v4(),
        name: "GET /batch".to_string(),
        started: base,
        duration_ms: children as f64 * 2.0,
        machine_name: "batch-1".to_string(),
        root: Some(root),
    }
}

/// Blob for `trace` built without the root check `encode` performs.
pub fn raw_blob(trace: &Trace) -> String {
    let json = serde_json::to_vec(trace).unwrap();
    base64::engine::general_purpose::STANDARD.encode(compress(&json).unwrap())
}

/// Response carrying `trace` in the results header.
pub fn results_response(trace: &Trace) -> http::Response<String> {
    http::Response::builder()
        .header(
            tracestitch_core::headers::RESULTS_HEADER,
            tracestitch_core::encode(trace).unwrap(),
        )
        .body(String::new())
        .unwrap()
}

/// Serves `router` on an ephemeral loopback port.
pub async fn spawn_router(router: axum::Router) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}
