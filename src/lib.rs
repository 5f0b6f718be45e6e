//! # Gardener Kubeconfig Controller
//!
//! A Kubernetes controller that keeps a valid Gardener admin kubeconfig in a Secret
//! for every `GardenerCluster` resource.
//!
//! ## Overview
//!
//! For each GardenerCluster the controller:
//!
//! 1. **Reads the target Secret** - including when the stored kubeconfig was issued
//! 2. **Decides** - create, rotate once the remaining validity crosses a threshold, or wait
//! 3. **Issues** - requests a time-limited admin kubeconfig for the shoot from Gardener
//! 4. **Stores** - writes the kubeconfig and its issuance time into the Secret
//! 5. **Reports** - records the outcome as a condition on the GardenerCluster status
//!
//! ## Features
//!
//! - **Threshold rotation**: kubeconfigs are replaced well before they expire
//! - **Forced rotation**: annotate a GardenerCluster to rotate on the next pass
//! - **Per-resource backoff**: failing resources retry on a Fibonacci schedule
//! - **Prometheus metrics**: exposed on `/metrics`, with `/healthz` and `/readyz` probes

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;

pub use crd::*;
