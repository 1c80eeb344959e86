//! Ratekeeper Server
//!
//! The query service: it answers availability, ban, current-rate and
//! timeline requests by combining the rate cache, the ban store and the
//! upstream provider.

pub mod api;
pub mod config;
pub mod metrics;
pub mod service;

pub use api::router;
pub use config::ServerConfig;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use service::{RateService, Timeouts};
