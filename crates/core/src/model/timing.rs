use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One named interval in a trace. Offsets are milliseconds relative to the
/// start of the owning trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Timing {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "StartMilliseconds")]
    pub start_ms: f64,
    /// `None` while the interval is still open.
    #[serde(rename = "DurationMilliseconds", default)]
    pub duration_ms: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<Timing>,
    #[serde(rename = "SqlTimings", default, deserialize_with = "null_as_empty")]
    pub sub_timings: Vec<SubTiming>,
}

/// Leaf measurement attached to a timing, such as a single database command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SubTiming {
    /// Peers with an enum-typed model send a numeric code; it is mapped to
    /// the command kind name.
    #[serde(rename = "ExecuteType", default, deserialize_with = "kind_from_name_or_code")]
    pub kind: String,
    #[serde(rename = "CommandString")]
    pub command: String,
    #[serde(rename = "StartMilliseconds")]
    pub start_ms: f64,
    #[serde(rename = "DurationMilliseconds")]
    pub duration_ms: f64,
}

impl Timing {
    pub fn new(name: impl Into<String>, start_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_ms,
            duration_ms: None,
            children: Vec::new(),
            sub_timings: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_child(mut self, child: Timing) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_sub_timing(mut self, sub: SubTiming) -> Self {
        self.sub_timings.push(sub);
        self
    }

    /// Number of timings in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Timing::node_count).sum::<usize>()
    }

    /// Depth-first search by name, `self` first.
    pub fn find(&self, name: &str) -> Option<&Timing> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Follows child indices from `self`.
    pub fn node_at(&self, path: &[usize]) -> Option<&Timing> {
        let mut node = self;
        for &idx in path {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Timing> {
        let mut node = self;
        for &idx in path {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }
}

impl SubTiming {
    pub fn new(kind: impl Into<String>, command: impl Into<String>, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            kind: kind.into(),
            command: command.into(),
            start_ms,
            duration_ms,
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn kind_from_name_or_code<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Kind {
        Name(String),
        Code(i64),
    }

    Ok(match Option::<Kind>::deserialize(deserializer)? {
        None => String::new(),
        Some(Kind::Name(name)) => name,
        Some(Kind::Code(code)) => match code {
            0 => "None".to_string(),
            1 => "NonQuery".to_string(),
            2 => "Scalar".to_string(),
            3 => "Reader".to_string(),
            other => other.to_string(),
        },
    })
}
