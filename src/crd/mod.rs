//! Custom Resource Definitions (CRDs) for dynakube-operator.
//!
//! - `DynaKube`: declarative deployment of OneAgent and ActiveGate components

mod dynakube;

pub use dynakube::*;
