//! Resource generation module.
//!
//! Contains utilities for generating the Kubernetes resources owned by a
//! DynaKube.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | Merged ActiveGate deployment |
//! | Service | Gateway endpoint (https/http) for service capabilities |
//! | DaemonSet | OneAgent host rollout |

pub mod common;
pub mod daemonset;
pub mod services;
pub mod statefulset;

// Re-export commonly used items from common
pub use common::{owner_reference, component_labels};
