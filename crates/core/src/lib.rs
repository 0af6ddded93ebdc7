pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod headers;
pub mod ids;
pub mod model;
pub mod profiler;
pub mod rebase;

pub use codec::{BlobCompression, WireCodec, decode, encode};
pub use context::TraceContext;
pub use error::{Result, StitchError};
pub use model::{SubTiming, Timing, Trace};
pub use profiler::{NodePath, Profiler, Step};
