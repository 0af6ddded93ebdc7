pub mod timing;
pub mod trace;

pub use timing::{SubTiming, Timing};
pub use trace::Trace;
