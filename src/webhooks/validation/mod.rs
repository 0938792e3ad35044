//! Validation for DynaKube admission requests.
//!
//! A single admission event is validated against the full set of DynaKubes
//! currently in scope: several checks are only meaningful with cross-instance
//! visibility (two DynaKubes fighting over the same nodes). All checks run;
//! errors and warnings accumulate instead of short-circuiting, so the user
//! sees every problem at once.

pub mod oneagent;

use crate::crd::DynaKube;
use crate::modules::Modules;

/// Outcome of validating one admission event.
///
/// Errors deny the request; warnings ride along on an allowed response.
/// Message order is deterministic: check order first, discovery order within
/// a check.
#[derive(Debug, Default)]
pub struct Verdict {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Verdict {
    /// Whether the request is allowed.
    pub fn is_allowed(&self) -> bool {
        self.errors.is_empty()
    }

    /// Accumulated errors, in check order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Accumulated warnings, in check order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Context for validating one DynaKube.
///
/// `all_dynakubes` is the caller's consistent snapshot of every DynaKube in
/// scope, typically including an older revision of the DynaKube under test;
/// cross-instance checks skip entries sharing its name.
pub struct ValidationContext<'a> {
    /// The DynaKube being created or updated.
    pub dynakube: &'a DynaKube,
    /// Snapshot of all DynaKubes in scope.
    pub all_dynakubes: &'a [DynaKube],
    /// Module-enablement flags of this installation.
    pub modules: &'a Modules,
}

/// Run the ordered battery of validation checks.
pub fn validate(ctx: &ValidationContext<'_>) -> Verdict {
    let mut verdict = Verdict::default();

    oneagent::conflicting_oneagent_mode(ctx, &mut verdict);
    oneagent::conflicting_node_selector(ctx, &mut verdict);
    oneagent::image_without_csi_driver(ctx, &mut verdict);
    oneagent::invalid_custom_version(ctx, &mut verdict);
    oneagent::obsolete_host_group_argument(ctx, &mut verdict);
    oneagent::unsupported_installer_env_vars(ctx, &mut verdict);

    verdict
}
