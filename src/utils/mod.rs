//! # Utility Modules
//!
//! Supporting utilities for logging, metrics and deadlines.
//!
//! ## Components
//! - **Logging**: Structured `tracing` subscriber setup
//! - **Metrics**: Thread-safe per-server/per-client counters
//! - **Timeout**: Per-call deadline wrapper and default durations

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
