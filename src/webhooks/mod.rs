//! Webhook module for admission requests.
//!
//! Two endpoints are served:
//! - `/validate-dynakube`: validating webhook denying inconsistent or
//!   conflicting DynaKube specifications
//! - `/mutate-pod`: mutating webhook stamping the injection summary
//!   annotation onto admitted pods

pub mod mutation;
mod server;
pub mod validation;

pub use validation::{ValidationContext, Verdict, validate};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};
