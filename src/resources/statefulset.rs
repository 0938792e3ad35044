//! StatefulSet generation for the merged ActiveGate deployment.
//!
//! Renders the effective capability footprint into one StatefulSet:
//! - Gateway directories as emptyDir volumes
//! - Capability-contributed volumes, mounts and init containers
//! - DT_CAPABILITIES argument string from the footprint
//! - Readiness probe and communication ports only when a capability needs them

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::capability::EffectiveFootprint;
use crate::crd::DynaKube;
use crate::resources::common::{
    VALUE_ACTIVEGATE, activegate_name, component_labels, merge_labels, owner_reference,
};

/// Gateway container name.
pub const ACTIVEGATE_CONTAINER_NAME: &str = "activegate";

/// Container port backing the https Service port.
pub const HTTPS_CONTAINER_PORT: i32 = 9999;
/// Container port backing the http Service port.
pub const HTTP_CONTAINER_PORT: i32 = 9998;
/// Container port name for https traffic.
pub const HTTPS_CONTAINER_PORT_NAME: &str = "ag-https";
/// Container port name for http traffic.
pub const HTTP_CONTAINER_PORT_NAME: &str = "ag-http";

/// Writable gateway directories; the image expects these to exist.
const GATEWAY_DIRS: [(&str, &str); 5] = [
    ("ag-lib-gateway-config", "/var/lib/dynatrace/gateway/config"),
    ("ag-lib-gateway-temp", "/var/lib/dynatrace/gateway/temp"),
    ("ag-lib-gateway-data", "/var/lib/dynatrace/gateway/data"),
    ("ag-log-gateway", "/var/log/dynatrace/gateway"),
    ("ag-tmp-gateway", "/var/tmp/dynatrace/gateway"),
];

/// Generate the ActiveGate StatefulSet for an enabled footprint.
///
/// Callers must not invoke this for a disabled footprint; the reconciler
/// deletes the StatefulSet instead of rendering one.
pub fn generate_statefulset(dynakube: &DynaKube, footprint: &EffectiveFootprint) -> StatefulSet {
    let name = activegate_name(dynakube, footprint.short_name);
    let selector_labels = component_labels(dynakube, VALUE_ACTIVEGATE, footprint.short_name);
    let properties = footprint.properties.clone().unwrap_or_default();

    let instance_labels = dynakube.labels().clone();
    let labels = merge_labels(&[&instance_labels, &selector_labels, &properties.labels]);

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: dynakube.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(dynakube)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(properties.replicas),
            service_name: Some(name),
            selector: LabelSelector {
                match_labels: Some(selector_labels),
                ..Default::default()
            },
            template: generate_pod_template(dynakube, footprint, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_pod_template(
    dynakube: &DynaKube,
    footprint: &EffectiveFootprint,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    let properties = footprint.properties.clone().unwrap_or_default();
    let node_selector = if properties.node_selector.is_empty() {
        None
    } else {
        Some(properties.node_selector.clone())
    };

    let init_containers = stamp_init_containers(dynakube, footprint);

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![generate_gateway_container(dynakube, footprint)],
            init_containers: if init_containers.is_empty() {
                None
            } else {
                Some(init_containers)
            },
            volumes: Some(generate_volumes(footprint)),
            node_selector,
            ..Default::default()
        }),
    }
}

/// Capability init container templates carry neither image nor resources;
/// both come from the gateway deployment.
fn stamp_init_containers(dynakube: &DynaKube, footprint: &EffectiveFootprint) -> Vec<Container> {
    footprint
        .init_containers
        .iter()
        .cloned()
        .map(|mut container| {
            container.image = Some(dynakube.activegate_image());
            container.resources = Some(gateway_resources());
            container
        })
        .collect()
}

fn generate_gateway_container(dynakube: &DynaKube, footprint: &EffectiveFootprint) -> Container {
    Container {
        name: ACTIVEGATE_CONTAINER_NAME.to_string(),
        image: Some(dynakube.activegate_image()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(generate_env_vars(dynakube, footprint)),
        resources: Some(gateway_resources()),
        ports: if footprint.set_communication_port {
            Some(vec![
                ContainerPort {
                    container_port: HTTPS_CONTAINER_PORT,
                    name: Some(HTTPS_CONTAINER_PORT_NAME.to_string()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ContainerPort {
                    container_port: HTTP_CONTAINER_PORT,
                    name: Some(HTTP_CONTAINER_PORT_NAME.to_string()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ])
        } else {
            None
        },
        readiness_probe: if footprint.set_readiness_port {
            Some(generate_readiness_probe())
        } else {
            None
        },
        volume_mounts: Some(generate_volume_mounts(footprint)),
        ..Default::default()
    }
}

fn generate_env_vars(dynakube: &DynaKube, footprint: &EffectiveFootprint) -> Vec<EnvVar> {
    let mut env = vec![EnvVar {
        name: "DT_CAPABILITIES".to_string(),
        value: Some(footprint.arg_name.clone()),
        ..Default::default()
    }];

    if footprint.set_dns_entry_point {
        let service_name = activegate_name(dynakube, footprint.short_name);
        let namespace = dynakube.namespace().unwrap_or_else(|| "default".to_string());
        env.push(EnvVar {
            name: "DT_DNS_ENTRY_POINT".to_string(),
            value: Some(format!("https://{}.{}:443", service_name, namespace)),
            ..Default::default()
        });
    }

    if let Some(properties) = &footprint.properties {
        if !properties.group.is_empty() {
            env.push(EnvVar {
                name: "DT_GROUP".to_string(),
                value: Some(properties.group.clone()),
                ..Default::default()
            });
        }
    }

    env
}

fn gateway_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(quantities(&[("cpu", "150m"), ("memory", "250Mi")])),
        limits: Some(quantities(&[("cpu", "300m"), ("memory", "1Gi")])),
        ..Default::default()
    }
}

fn quantities(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), Quantity(value.to_string())))
        .collect()
}

/// The gateway readiness endpoint; only rendered when a capability needs the
/// readiness port.
fn generate_readiness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/rest/health".to_string()),
            port: IntOrString::Int(HTTPS_CONTAINER_PORT),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(90),
        period_seconds: Some(15),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn generate_volumes(footprint: &EffectiveFootprint) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = GATEWAY_DIRS
        .iter()
        .map(|(name, _)| Volume {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        })
        .collect();
    volumes.extend(footprint.volumes.iter().cloned());
    volumes
}

fn generate_volume_mounts(footprint: &EffectiveFootprint) -> Vec<VolumeMount> {
    let mut mounts: Vec<VolumeMount> = GATEWAY_DIRS
        .iter()
        .map(|(name, path)| VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        })
        .collect();
    mounts.extend(footprint.container_volume_mounts.iter().cloned());
    mounts
}
