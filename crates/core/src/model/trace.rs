use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timing::Timing;

/// Snapshot of one request's measurements. This is the unit carried on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Trace {
    pub id: Uuid,
    pub name: String,
    pub started: DateTime<Utc>,
    #[serde(rename = "DurationMilliseconds")]
    pub duration_ms: f64,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub root: Option<Timing>,
}

impl Trace {
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map(Timing::node_count).unwrap_or(0)
    }

    pub fn find(&self, name: &str) -> Option<&Timing> {
        self.root.as_ref().and_then(|r| r.find(name))
    }
}
