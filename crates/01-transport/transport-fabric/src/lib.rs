//! In-process implementation of [`transport::Transport`].
//!
//! A fabric is a fully connected mesh of endpoints, one per rank, wired with
//! unbounded crossbeam channels. Every endpoint owns the receiving half of its
//! own inbox and a sender into every other rank's inbox, so per-pair FIFO order
//! falls out of channel semantics. Endpoints are `Send` and are meant to be
//! moved onto one thread each.

mod builder;
mod endpoint;
mod metrics;

pub use builder::build_fabric;
pub use endpoint::FabricEndpoint;
pub use metrics::{EndpointMetrics, EndpointMetricsSnapshot};
