//! Shared infrastructure for the breakwater resilience crates.
//!
//! Every pattern (circuit breaker, retry) reports what it does through the
//! event types defined here. Listeners registered on a pattern's builder
//! receive those events synchronously, which is how logging and metrics
//! sinks are attached without the patterns depending on them.

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
