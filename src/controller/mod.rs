//! Controller module for dynakube-operator.
//!
//! Contains the reconciliation loop, error handling and the shared context
//! passed to the reconciler.

pub mod context;
pub mod error;
pub mod reconciler;
