//! A bounded HTTP load generator.
//!
//! `volley` issues a fixed volume of GET/POST requests against a single
//! target, spread across a configurable number of concurrent workers. Each
//! attempt carries a freshly synthesized browser identity and is routed
//! through the next proxy in a round-robin rotation. Server errors and
//! connection-level faults are retried with linear backoff; any other
//! response resolves the request immediately.
//!
//! Statistics are merged across workers as they finish and surface in two
//! places: a transient progress line while the run is active, and a final
//! [`Report`] with success/failure percentages, throughput, and latency
//! percentiles.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod identity;
pub mod proxy;
pub mod report;
pub mod transport;

pub use crate::config::Config;
pub use crate::engine::run;
pub use crate::report::Report;
