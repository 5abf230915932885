//! Cooperative cancellation of pipeline executions.

mod token;

pub use token::CancellationToken;
