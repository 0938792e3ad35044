//! Capability composition.
//!
//! Folds the capabilities a DynaKube declares into one effective runtime
//! footprint for the merged ActiveGate deployment. Merge rules: list
//! concatenation for init containers, mounts and volumes; OR for the
//! requirement flags; first-non-empty for the service-account owner; the
//! gateway argument string joins the per-capability argument names in
//! declaration order.

use k8s_openapi::api::core::v1::{Container, SecretVolumeSource, Volume, VolumeMount};

use crate::capability::{
    CapabilityDescriptor, CapabilityKind, JETTY_CERTS_VOLUME, MULTI_ACTIVEGATE_NAME,
};
use crate::crd::{ActiveGateProperties, ActiveGateSpec};

/// The merged runtime footprint of one DynaKube's ActiveGate.
///
/// A disabled footprint (no capabilities declared) still sets
/// `create_service`: the reconciler uses that flag to delete a Service left
/// behind by a previously enabled configuration instead of orphaning it.
#[derive(Clone, Debug, Default)]
pub struct EffectiveFootprint {
    /// Whether any capability is enabled.
    pub enabled: bool,
    /// Short name of the merged deployment, fixed to `activegate`.
    pub short_name: &'static str,
    /// Comma-joined gateway argument string, in capability declaration order.
    pub arg_name: String,
    /// Owner hint for the generated service account; first non-empty wins.
    pub service_account_owner: String,
    /// Init container templates; image and resources are stamped by the
    /// manifest builder.
    pub init_containers: Vec<Container>,
    /// Volume mounts for the gateway container.
    pub container_volume_mounts: Vec<VolumeMount>,
    /// Pod volumes.
    pub volumes: Vec<Volume>,
    pub set_dns_entry_point: bool,
    pub set_readiness_port: bool,
    pub set_communication_port: bool,
    /// Whether a Service object must exist for this deployment. Also set on
    /// a disabled footprint, where it means "clean up", not "create".
    pub create_service: bool,
    /// Instance-level properties, present when the footprint is enabled.
    pub properties: Option<ActiveGateProperties>,
}

impl EffectiveFootprint {
    /// Merge one capability descriptor into the accumulated footprint.
    fn merge(mut self, descriptor: CapabilityDescriptor, arg_names: &mut Vec<&'static str>) -> Self {
        arg_names.push(descriptor.arg_name);
        self.init_containers.extend(descriptor.init_containers);
        self.container_volume_mounts
            .extend(descriptor.container_volume_mounts);
        self.volumes.extend(descriptor.volumes);

        self.set_dns_entry_point |= descriptor.set_dns_entry_point;
        self.set_readiness_port |= descriptor.set_readiness_port;
        self.set_communication_port |= descriptor.set_communication_port;
        self.create_service |= descriptor.create_service;
        if self.service_account_owner.is_empty() {
            self.service_account_owner = descriptor.service_account_owner.to_string();
        }
        self
    }

    /// Append the TLS secret volume and its read-only mount under the
    /// secrets root. Applied independently of the capability set.
    fn with_tls_secret(mut self, secret_name: &str, secrets_root: &str) -> Self {
        self.volumes.push(Volume {
            name: JETTY_CERTS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        self.container_volume_mounts.push(VolumeMount {
            read_only: Some(true),
            name: JETTY_CERTS_VOLUME.to_string(),
            mount_path: join_path(secrets_root, "tls"),
            ..Default::default()
        });
        self
    }
}

/// Compose the effective footprint for one DynaKube's ActiveGate section.
///
/// Declared capability names are resolved in declaration order; unknown names
/// are skipped. An absent or empty capability list yields a disabled
/// footprint that still requests Service cleanup.
pub fn compose(active_gate: Option<&ActiveGateSpec>, secrets_root: &str) -> EffectiveFootprint {
    let base = EffectiveFootprint {
        short_name: MULTI_ACTIVEGATE_NAME,
        ..Default::default()
    };

    let Some(active_gate) = active_gate.filter(|ag| !ag.capabilities.is_empty()) else {
        // Necessary for cleaning up a Service created earlier.
        return EffectiveFootprint {
            create_service: true,
            ..base
        };
    };

    let mut arg_names = Vec::new();
    let mut footprint = active_gate
        .capabilities
        .iter()
        .filter_map(|name| CapabilityKind::lookup(name))
        .map(CapabilityKind::descriptor)
        .fold(base, |acc, descriptor| acc.merge(descriptor, &mut arg_names));

    footprint.enabled = true;
    footprint.arg_name = arg_names.join(",");
    footprint.properties = Some(active_gate.properties.clone());

    if !active_gate.tls_secret_name.is_empty() {
        footprint = footprint.with_tls_secret(&active_gate.tls_secret_name, secrets_root);
    }

    footprint
}

fn join_path(root: &str, leaf: &str) -> String {
    if root.ends_with('/') {
        format!("{root}{leaf}")
    } else {
        format!("{root}/{leaf}")
    }
}
