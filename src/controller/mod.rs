//! # Controller
//!
//! Expiration policy, reconciliation and the HTTP surface of the controller.

pub mod backoff;
pub mod policy;
pub mod reconciler;
pub mod server;
pub mod validation;
