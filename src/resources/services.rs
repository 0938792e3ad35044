//! Service generation for the ActiveGate deployment.
//!
//! One ClusterIP Service fronting the merged gateway StatefulSet, exposing
//! the well-known https (443) and http (80) ports. The Service only exists
//! while a capability that needs it is enabled; the reconciler deletes it
//! otherwise.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::capability::EffectiveFootprint;
use crate::crd::DynaKube;
use crate::resources::common::{
    VALUE_ACTIVEGATE, activegate_name, component_labels, owner_reference,
};
use crate::resources::statefulset::{HTTP_CONTAINER_PORT_NAME, HTTPS_CONTAINER_PORT_NAME};

/// Https Service port.
pub const HTTPS_SERVICE_PORT: i32 = 443;
/// Https Service port name.
pub const HTTPS_SERVICE_PORT_NAME: &str = "https";
/// Http Service port.
pub const HTTP_SERVICE_PORT: i32 = 80;
/// Http Service port name.
pub const HTTP_SERVICE_PORT_NAME: &str = "http";

/// Generate the ActiveGate Service.
pub fn generate_activegate_service(
    dynakube: &DynaKube,
    footprint: &EffectiveFootprint,
) -> Service {
    let name = activegate_name(dynakube, footprint.short_name);
    let labels = component_labels(dynakube, VALUE_ACTIVEGATE, footprint.short_name);

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: dynakube.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(dynakube)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels),
            ports: Some(vec![
                ServicePort {
                    port: HTTPS_SERVICE_PORT,
                    name: Some(HTTPS_SERVICE_PORT_NAME.to_string()),
                    target_port: Some(IntOrString::String(
                        HTTPS_CONTAINER_PORT_NAME.to_string(),
                    )),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    port: HTTP_SERVICE_PORT,
                    name: Some(HTTP_SERVICE_PORT_NAME.to_string()),
                    target_port: Some(IntOrString::String(HTTP_CONTAINER_PORT_NAME.to_string())),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
