use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the request header that asks a responder for its trace. It is
/// the caller's trace id, treated as opaque by the responder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn for_trace(id: Uuid) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_the_hyphenated_trace_id() {
        let id = Uuid::new_v4();
        let token = CorrelationToken::for_trace(id);
        assert_eq!(token.as_str(), id.to_string());
        assert_eq!(token.to_string(), token.as_str());
        assert_eq!(token.as_str().len(), 36);
    }
}
