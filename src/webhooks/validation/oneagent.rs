//! OneAgent-related validation checks.
//!
//! Message templates are part of the external contract; tests compare
//! against them verbatim.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use kube::ResourceExt;

use super::{ValidationContext, Verdict};
use crate::crd::DynaKube;

/// Emitted when more than one OneAgent mode variant is set.
pub const ERROR_CONFLICTING_ONEAGENT_MODE: &str =
    "The DynaKube specification tries to use multiple oneagent modes at the same time, which is not supported.";

/// Template for node-selector conflicts; `{}` receives the conflicting
/// instance names, joined with `", "` in discovery order.
pub const ERROR_NODE_SELECTOR_CONFLICT_PREFIX: &str =
    "The DynaKube specification conflicts with another DynaKube's nodeSelector which is not supported. The conflicting DynaKube: ";

/// Emitted when a custom code-modules image is set without the CSI driver.
pub const ERROR_IMAGE_WITHOUT_CSI: &str =
    "The DynaKube specification sets a custom code modules image, but the CSI driver module is disabled.";

/// Emitted when a pinned OneAgent version does not match the required format.
pub const ERROR_VERSION_INVALID: &str =
    "The OneAgent version is only valid in the format 'major.minor.patch.timestamp', e.g. 1.0.0.20240101-000000";

/// Emitted when the deprecated `--set-host-group` argument is used.
pub const WARNING_HOST_GROUP_CONFLICT: &str =
    "The DynaKube specification sets the host group in two places. Remove the --set-host-group argument from the OneAgent args section; spec.oneAgent.hostGroup takes precedence.";

/// Emitted when installer environment variables are set; they only apply to
/// an unsupported image type.
pub const WARNING_INSTALLER_ENV_VARS: &str =
    "Environment variables ONEAGENT_INSTALLER_SCRIPT_URL and ONEAGENT_INSTALLER_TOKEN are only relevant for an unsupported image type. Please make sure you are using a supported image.";

const DEPRECATED_HOST_GROUP_ARG: &str = "--set-host-group";

/// Build the node-selector conflict message for a set of instance names.
pub fn node_selector_conflict_message(conflicting_names: &str) -> String {
    format!("{ERROR_NODE_SELECTOR_CONFLICT_PREFIX}{conflicting_names}")
}

/// Pinned versions must be `major.minor.patch.YYYYMMDD-HHMMSS`; bare semver,
/// `v` prefixes, `latest` and `+build` metadata are all rejected.
static VERSION_RE: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"^\d+\.\d+\.\d+\.\d{8}-\d{6}$").ok());

/// Check 1: at most one OneAgent mode variant may be set.
pub fn conflicting_oneagent_mode(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    if ctx.dynakube.one_agent_mode_count() > 1 {
        verdict.error(ERROR_CONFLICTING_ONEAGENT_MODE);
    }
}

/// The node selector this DynaKube schedules node agents with, if it
/// schedules any. An empty map means "every node".
fn active_node_selector(dk: &DynaKube) -> Option<&BTreeMap<String, String>> {
    if dk.needs_oneagent() {
        dk.oneagent_node_selector()
    } else {
        dk.log_monitoring_node_selector()
    }
}

/// Two selectors conflict when they can target the same node: either shares
/// at least one identical key-value pair, or one of them is empty (an empty
/// selector matches all nodes, so it collides with everything - including
/// another empty selector).
fn selectors_overlap(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|(key, value)| b.get(key) == Some(value))
}

/// Check 2: only one node agent fits on a node, so node-targeting DynaKubes
/// must not overlap. One error is emitted per validated spec, naming every
/// conflicting instance in scope order.
pub fn conflicting_node_selector(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    let Some(node_selector) = active_node_selector(ctx.dynakube) else {
        return;
    };
    let own_name = ctx.dynakube.name_any();

    let conflicting: Vec<String> = ctx
        .all_dynakubes
        .iter()
        .filter(|other| other.name_any() != own_name)
        .filter(|other| {
            active_node_selector(other)
                .is_some_and(|other_selector| selectors_overlap(node_selector, other_selector))
        })
        .map(|other| other.name_any())
        .collect();

    if !conflicting.is_empty() {
        verdict.error(node_selector_conflict_message(&conflicting.join(", ")));
    }
}

/// Check 3: a custom code-modules image is staged onto the nodes by the CSI
/// driver; without the driver the image can never be provisioned.
pub fn image_without_csi_driver(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    if ctx.dynakube.code_modules_image().is_some() && !ctx.modules.csi_driver {
        verdict.error(ERROR_IMAGE_WITHOUT_CSI);
    }
}

/// Check 4: pinned OneAgent versions must match the fixed format.
pub fn invalid_custom_version(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    for version in ctx.dynakube.custom_oneagent_versions() {
        let valid = VERSION_RE
            .as_ref()
            .is_some_and(|re| re.is_match(version));
        if !valid {
            verdict.error(ERROR_VERSION_INVALID);
        }
    }
}

/// Check 5 (warning): the `--set-host-group` argument is obsolete. One
/// warning per spec, whether or not `spec.oneAgent.hostGroup` is also set.
pub fn obsolete_host_group_argument(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    let uses_deprecated_arg = ctx
        .dynakube
        .oneagent_args()
        .iter()
        .any(|arg| arg.starts_with(DEPRECATED_HOST_GROUP_ARG));
    if uses_deprecated_arg {
        verdict.warn(WARNING_HOST_GROUP_CONFLICT);
    }
}

/// Check 6 (warning): installer env vars only make sense for an unsupported
/// image type. One warning even when both variables are set.
pub fn unsupported_installer_env_vars(ctx: &ValidationContext<'_>, verdict: &mut Verdict) {
    let has_installer_var = ctx.dynakube.oneagent_env().iter().any(|env| {
        env.name == "ONEAGENT_INSTALLER_SCRIPT_URL" || env.name == "ONEAGENT_INSTALLER_TOKEN"
    });
    if has_installer_var {
        verdict.warn(WARNING_INSTALLER_ENV_VARS);
    }
}
