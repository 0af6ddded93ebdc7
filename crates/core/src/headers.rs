//! Header names shared by every participant in the propagation protocol.
//!
//! The values are fixed so independent implementations can interoperate.

/// Request header carrying the caller's trace id. Its presence asks the
/// responder to return its own trace.
pub const REQUEST_HEADER: &str = "MiniProfilerRequestHeader";

/// Response header carrying the encoded remote trace.
pub const RESULTS_HEADER: &str = "MiniProfilerResults";

/// Default label placed in front of outbound step names.
pub const DEFAULT_STEP_PREFIX: &str = "WebAPI :";
