//! DaemonSet generation for the OneAgent host rollout.
//!
//! Every host-based OneAgent mode rolls the same DaemonSet shape, varying
//! only in feature label, node selector and installer arguments. Volumes:
//! - host root mount, always
//! - trusted-CA certificates, when the DynaKube declares them
//! - ActiveGate TLS certificate, when a custom TLS secret is set

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, HostPathVolumeSource, KeyToPath, PodSpec,
    PodTemplateSpec, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::DynaKube;
use crate::resources::common::{
    VALUE_ONEAGENT, component_labels, merge_labels, oneagent_name, owner_reference,
};

/// OneAgent container name.
pub const ONEAGENT_CONTAINER_NAME: &str = "oneagent";

const ROOT_VOLUME: &str = "host-root";
const ROOT_MOUNT_PATH: &str = "/mnt/root";
const CERTIFICATE_VOLUME: &str = "certs";
const CERTIFICATE_MOUNT_PATH: &str = "/mnt/dynatrace/certs";
const TLS_VOLUME: &str = "tls";
const TLS_MOUNT_PATH: &str = "/mnt/dynatrace/tls";

/// Feature label value of the active host-based OneAgent mode.
pub fn oneagent_feature(dynakube: &DynaKube) -> &'static str {
    let oa = &dynakube.spec.one_agent;
    if oa.classic_full_stack.is_some() {
        "classic-fullstack"
    } else if oa.cloud_native_full_stack.is_some() {
        "cloud-native-fullstack"
    } else {
        "host-monitoring"
    }
}

/// Generate the OneAgent DaemonSet.
///
/// Only meaningful when a host-based mode is active; callers gate on
/// [`DynaKube::needs_oneagent`].
pub fn generate_daemonset(dynakube: &DynaKube) -> DaemonSet {
    let feature = oneagent_feature(dynakube);
    let selector_labels = component_labels(dynakube, VALUE_ONEAGENT, feature);
    let instance_labels = dynakube.labels().clone();
    let labels = merge_labels(&[&instance_labels, &selector_labels]);

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(oneagent_name(dynakube)),
            namespace: dynakube.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(dynakube)]),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector_labels),
                ..Default::default()
            },
            template: generate_pod_template(dynakube, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_pod_template(
    dynakube: &DynaKube,
    labels: &std::collections::BTreeMap<String, String>,
) -> PodTemplateSpec {
    let node_selector = dynakube
        .oneagent_node_selector()
        .filter(|selector| !selector.is_empty())
        .cloned();

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![generate_oneagent_container(dynakube)],
            volumes: Some(prepare_volumes(dynakube)),
            node_selector,
            host_network: Some(true),
            host_pid: Some(true),
            ..Default::default()
        }),
    }
}

fn generate_oneagent_container(dynakube: &DynaKube) -> Container {
    let args: Vec<String> = dynakube.oneagent_args().to_vec();
    let env: Vec<EnvVar> = dynakube
        .oneagent_env()
        .iter()
        .map(|pair| EnvVar {
            name: pair.name.clone(),
            value: Some(pair.value.clone()),
            ..Default::default()
        })
        .collect();

    Container {
        name: ONEAGENT_CONTAINER_NAME.to_string(),
        image: Some(dynakube.oneagent_image()),
        image_pull_policy: Some("Always".to_string()),
        args: if args.is_empty() { None } else { Some(args) },
        env: if env.is_empty() { None } else { Some(env) },
        volume_mounts: Some(prepare_volume_mounts(dynakube)),
        // Host monitoring needs full host access.
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volumes for the OneAgent pod. Public for manifest inspection in tests.
pub fn prepare_volumes(dynakube: &DynaKube) -> Vec<Volume> {
    let mut volumes = vec![root_volume()];

    if !dynakube.spec.trusted_cas.is_empty() {
        volumes.push(certificate_volume(dynakube));
    }
    if dynakube.activegate_tls_secret().is_some() {
        volumes.push(tls_volume(dynakube));
    }

    volumes
}

fn prepare_volume_mounts(dynakube: &DynaKube) -> Vec<VolumeMount> {
    let mut mounts = vec![VolumeMount {
        name: ROOT_VOLUME.to_string(),
        mount_path: ROOT_MOUNT_PATH.to_string(),
        ..Default::default()
    }];

    if !dynakube.spec.trusted_cas.is_empty() {
        mounts.push(VolumeMount {
            name: CERTIFICATE_VOLUME.to_string(),
            mount_path: CERTIFICATE_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    if dynakube.activegate_tls_secret().is_some() {
        mounts.push(VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    mounts
}

/// The host root filesystem, required by every OneAgent mode.
pub fn root_volume() -> Volume {
    Volume {
        name: ROOT_VOLUME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: "/".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Trusted-CA certificates from the ConfigMap the DynaKube names.
pub fn certificate_volume(dynakube: &DynaKube) -> Volume {
    Volume {
        name: CERTIFICATE_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: dynakube.spec.trusted_cas.clone(),
            items: Some(vec![KeyToPath {
                key: "certs".to_string(),
                path: "certs.pem".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Custom ActiveGate TLS certificate, trusted by the agent when set.
pub fn tls_volume(dynakube: &DynaKube) -> Volume {
    Volume {
        name: TLS_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: dynakube.activegate_tls_secret().map(|name| name.to_string()),
            items: Some(vec![KeyToPath {
                key: "server.crt".to_string(),
                path: "custom.pem".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::crd::{
        ActiveGateSpec, DynaKubeSpec, HostInjectSpec, NameValuePair, OneAgentSpec,
    };

    fn test_dynakube(spec: DynaKubeSpec) -> DynaKube {
        DynaKube {
            metadata: ObjectMeta {
                name: Some("dynakube".to_string()),
                namespace: Some("dynatrace".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn host_monitoring_spec() -> DynaKubeSpec {
        DynaKubeSpec {
            api_url: "https://tenant.live.dynatrace.com/api".to_string(),
            one_agent: OneAgentSpec {
                host_monitoring: Some(HostInjectSpec::default()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_has_root_volume() {
        let dk = test_dynakube(host_monitoring_spec());
        let volumes = prepare_volumes(&dk);

        assert!(volumes.contains(&root_volume()));
        assert_eq!(volumes.len(), 1);
    }

    #[test]
    fn test_has_certificate_volume() {
        let mut spec = host_monitoring_spec();
        spec.trusted_cas = "ca-certs".to_string();
        let dk = test_dynakube(spec);
        let volumes = prepare_volumes(&dk);

        assert!(volumes.contains(&root_volume()));
        assert!(volumes.contains(&certificate_volume(&dk)));
    }

    #[test]
    fn test_has_tls_volume() {
        let mut spec = host_monitoring_spec();
        spec.active_gate = Some(ActiveGateSpec {
            capabilities: vec!["kube-monitoring".to_string()],
            tls_secret_name: "testing".to_string(),
            ..Default::default()
        });
        let dk = test_dynakube(spec);
        let volumes = prepare_volumes(&dk);

        assert!(volumes.contains(&tls_volume(&dk)));
    }

    #[test]
    fn test_has_all_volumes() {
        let mut spec = host_monitoring_spec();
        spec.trusted_cas = "ca-certs".to_string();
        spec.active_gate = Some(ActiveGateSpec {
            capabilities: vec!["kube-monitoring".to_string()],
            tls_secret_name: "testing".to_string(),
            ..Default::default()
        });
        let dk = test_dynakube(spec);
        let ds = generate_daemonset(&dk);

        let volumes = ds.spec.unwrap().template.spec.unwrap().volumes.unwrap();
        assert!(volumes.contains(&root_volume()));
        assert!(volumes.contains(&certificate_volume(&dk)));
        assert!(volumes.contains(&tls_volume(&dk)));
    }

    #[test]
    fn test_feature_label_per_mode() {
        let dk = test_dynakube(host_monitoring_spec());
        assert_eq!(oneagent_feature(&dk), "host-monitoring");

        let mut spec = host_monitoring_spec();
        spec.one_agent.host_monitoring = None;
        spec.one_agent.classic_full_stack = Some(HostInjectSpec::default());
        let dk = test_dynakube(spec);
        assert_eq!(oneagent_feature(&dk), "classic-fullstack");
    }

    #[test]
    fn test_container_args_and_env() {
        let mut spec = host_monitoring_spec();
        spec.one_agent.host_monitoring = Some(HostInjectSpec {
            args: vec!["--set-server=localhost".to_string()],
            env: vec![NameValuePair {
                name: "ONEAGENT_ENABLE_VOLUME_STORAGE".to_string(),
                value: "true".to_string(),
            }],
            ..Default::default()
        });
        let dk = test_dynakube(spec);
        let ds = generate_daemonset(&dk);

        let container = ds.spec.unwrap().template.spec.unwrap().containers[0].clone();
        assert_eq!(container.name, "oneagent");
        assert_eq!(
            container.args,
            Some(vec!["--set-server=localhost".to_string()])
        );
        let env = container.env.unwrap();
        assert_eq!(env[0].name, "ONEAGENT_ENABLE_VOLUME_STORAGE");
        assert_eq!(env[0].value, Some("true".to_string()));
    }

    #[test]
    fn test_node_selector_applied() {
        let mut spec = host_monitoring_spec();
        let mut selector = std::collections::BTreeMap::new();
        selector.insert("kubernetes.io/os".to_string(), "linux".to_string());
        spec.one_agent.host_monitoring = Some(HostInjectSpec {
            node_selector: selector.clone(),
            ..Default::default()
        });
        let dk = test_dynakube(spec);
        let ds = generate_daemonset(&dk);

        let pod_spec = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.node_selector, Some(selector));
        assert_eq!(pod_spec.host_network, Some(true));
        assert_eq!(pod_spec.host_pid, Some(true));
    }
}
