//! ActiveGate capability registry.
//!
//! Each capability a DynaKube can declare maps to a static descriptor: the
//! gateway argument enabling it, the init containers, volumes and mounts it
//! needs, and which service/port requirements it brings. The registry is a
//! closed, compile-time table; new capabilities are added by extending the
//! enum, and the `match` in [`CapabilityKind::descriptor`] keeps the table
//! exhaustive.

mod composer;

pub use composer::{EffectiveFootprint, compose};

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, Volume, VolumeMount,
};

/// Short name shared by the merged multi-capability deployment.
pub const MULTI_ACTIVEGATE_NAME: &str = "activegate";

/// Root directory under which secret volumes are mounted into the gateway.
pub const SECRETS_ROOT_DIR: &str = "/var/lib/dynatrace/secrets/";

/// Volume name for the gateway TLS certificates.
pub const JETTY_CERTS_VOLUME: &str = "server-certs";

const TRUSTSTORE_VOLUME: &str = "truststore-volume";
const K8SCRT2JKS_PATH: &str = "/opt/dynatrace/gateway/k8scrt2jks.sh";
const ACTIVEGATE_CACERTS_PATH: &str = "/opt/dynatrace/gateway/jre/lib/security/cacerts";
const ACTIVEGATE_SSL_PATH: &str = "/var/lib/dynatrace/gateway/ssl";
const K8S_CERTIFICATE_FILE: &str = "k8s-local.jks";
const K8SCRT2JKS_WORKING_DIR: &str = "/var/lib/dynatrace/gateway";
const INIT_CONTAINER_TEMPLATE_NAME: &str = "certificate-loader";

/// The closed set of known ActiveGate capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    KubeMonitoring,
    Routing,
    MetricsIngest,
    DynatraceApiProxy,
}

impl CapabilityKind {
    /// Resolve a declared capability name.
    ///
    /// Unknown names return `None` and are silently skipped by the composer:
    /// a spec written against a newer schema may declare capabilities this
    /// operator version does not know yet.
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "kube-monitoring" => Some(Self::KubeMonitoring),
            "routing" => Some(Self::Routing),
            "metrics-ingest" => Some(Self::MetricsIngest),
            "dynatrace-api-proxy" => Some(Self::DynatraceApiProxy),
            _ => None,
        }
    }

    /// The static descriptor for this capability.
    pub fn descriptor(self) -> CapabilityDescriptor {
        match self {
            Self::KubeMonitoring => CapabilityDescriptor {
                short_name: "kubemon",
                arg_name: "kubernetes_monitoring",
                service_account_owner: "kubernetes-monitoring",
                init_containers: vec![certificate_loader_container()],
                container_volume_mounts: vec![VolumeMount {
                    read_only: Some(true),
                    name: TRUSTSTORE_VOLUME.to_string(),
                    mount_path: ACTIVEGATE_CACERTS_PATH.to_string(),
                    sub_path: Some(K8S_CERTIFICATE_FILE.to_string()),
                    ..Default::default()
                }],
                volumes: vec![Volume {
                    name: TRUSTSTORE_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }],
                set_dns_entry_point: false,
                set_readiness_port: false,
                set_communication_port: false,
                create_service: false,
            },
            Self::Routing => service_capability("msgrouter", "routing"),
            Self::MetricsIngest => service_capability("metrics-ingest", "metrics-ingest"),
            Self::DynatraceApiProxy => service_capability("dynatrace-api", "restInterface"),
        }
    }
}

/// Static runtime footprint of a single capability.
///
/// Init containers carry no image or resource requests; the manifest builder
/// stamps those in when rendering the StatefulSet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapabilityDescriptor {
    pub short_name: &'static str,
    pub arg_name: &'static str,
    pub service_account_owner: &'static str,
    pub init_containers: Vec<Container>,
    pub container_volume_mounts: Vec<VolumeMount>,
    pub volumes: Vec<Volume>,
    pub set_dns_entry_point: bool,
    pub set_readiness_port: bool,
    pub set_communication_port: bool,
    pub create_service: bool,
}

/// Descriptor shape shared by the capabilities that expose a Service.
fn service_capability(
    short_name: &'static str,
    arg_name: &'static str,
) -> CapabilityDescriptor {
    CapabilityDescriptor {
        short_name,
        arg_name,
        service_account_owner: "",
        init_containers: Vec::new(),
        container_volume_mounts: Vec::new(),
        volumes: Vec::new(),
        set_dns_entry_point: true,
        set_readiness_port: true,
        set_communication_port: true,
        create_service: true,
    }
}

/// Init container converting the cluster CA into a Java keystore the gateway
/// trusts. Image and resources are assigned by the caller.
fn certificate_loader_container() -> Container {
    Container {
        name: INIT_CONTAINER_TEMPLATE_NAME.to_string(),
        image_pull_policy: Some("Always".to_string()),
        working_dir: Some(K8SCRT2JKS_WORKING_DIR.to_string()),
        command: Some(vec!["/bin/bash".to_string()]),
        args: Some(vec!["-c".to_string(), K8SCRT2JKS_PATH.to_string()]),
        volume_mounts: Some(vec![VolumeMount {
            read_only: Some(false),
            name: TRUSTSTORE_VOLUME.to_string(),
            mount_path: ACTIVEGATE_SSL_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}
