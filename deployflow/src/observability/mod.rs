//! Observability utilities: log setup and timing.

mod logging;
mod timing;

pub use logging::{init_tracing, LogFormat, DEFAULT_LOG_FILTER};
pub use timing::SpanTimer;
