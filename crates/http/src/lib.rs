pub mod client;
pub mod message;
pub mod propagate;
pub mod respond;

pub use client::{ReqwestService, TracedClient};
pub use propagate::{MergeOutcome, MergeStats, PropagateConfig, PropagateLayer};
pub use respond::{RespondLayer, attach_trace};
