//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, pass outcomes, issued kubeconfigs and requeues

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
