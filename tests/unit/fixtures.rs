//! Test fixtures and builder patterns for DynaKube.

use dynakube_operator::crd::{
    ActiveGateSpec, ApplicationMonitoringSpec, CloudNativeFullStackSpec, DynaKube, DynaKubeSpec,
    HostInjectSpec, LogMonitoringSpec, LogMonitoringTemplateSpec, TemplatesSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Builder for creating DynaKube test fixtures.
///
/// # Example
/// ```ignore
/// let dynakube = DynaKubeBuilder::new("dynakube")
///     .namespace("dynatrace")
///     .cloud_native(BTreeMap::new())
///     .active_gate(&["routing"])
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct DynaKubeBuilder {
    name: String,
    namespace: Option<String>,
    spec: DynaKubeSpec,
    uid: Option<String>,
}

impl DynaKubeBuilder {
    /// Create a new builder with the given resource name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some("dynatrace".to_string()),
            spec: DynaKubeSpec {
                api_url: "https://tenant.live.dynatrace.com/api".to_string(),
                ..Default::default()
            },
            uid: Some("test-uid".to_string()),
        }
    }

    /// Set the namespace for the resource.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the tenant API URL.
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.spec.api_url = api_url.into();
        self
    }

    /// Set the trusted-CAs ConfigMap name.
    pub fn trusted_cas(mut self, name: impl Into<String>) -> Self {
        self.spec.trusted_cas = name.into();
        self
    }

    /// Enable cloud native fullstack with the given node selector.
    pub fn cloud_native(mut self, node_selector: BTreeMap<String, String>) -> Self {
        self.spec.one_agent.cloud_native_full_stack = Some(CloudNativeFullStackSpec {
            host_inject: HostInjectSpec {
                node_selector,
                ..Default::default()
            },
            ..Default::default()
        });
        self
    }

    /// Enable classic fullstack with the given host-inject settings.
    pub fn classic_full_stack(mut self, host_inject: HostInjectSpec) -> Self {
        self.spec.one_agent.classic_full_stack = Some(host_inject);
        self
    }

    /// Enable host monitoring with the given node selector.
    pub fn host_monitoring(mut self, node_selector: BTreeMap<String, String>) -> Self {
        self.spec.one_agent.host_monitoring = Some(HostInjectSpec {
            node_selector,
            ..Default::default()
        });
        self
    }

    /// Enable application monitoring with an optional pinned version.
    pub fn application_monitoring(mut self, version: impl Into<String>) -> Self {
        self.spec.one_agent.application_monitoring = Some(ApplicationMonitoringSpec {
            version: version.into(),
            ..Default::default()
        });
        self
    }

    /// Enable standalone log monitoring with the given node selector template.
    pub fn standalone_log_monitoring(mut self, node_selector: BTreeMap<String, String>) -> Self {
        self.spec.log_monitoring = Some(LogMonitoringSpec::default());
        self.spec.templates = TemplatesSpec {
            log_monitoring: Some(LogMonitoringTemplateSpec { node_selector }),
        };
        self
    }

    /// Enable an ActiveGate with the given capabilities, in declaration order.
    pub fn active_gate(mut self, capabilities: &[&str]) -> Self {
        let ag = self.spec.active_gate.get_or_insert_with(ActiveGateSpec::default);
        ag.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the ActiveGate TLS secret name.
    pub fn tls_secret(mut self, name: impl Into<String>) -> Self {
        let ag = self.spec.active_gate.get_or_insert_with(ActiveGateSpec::default);
        ag.tls_secret_name = name.into();
        self
    }

    /// Set the host group.
    pub fn host_group(mut self, group: impl Into<String>) -> Self {
        self.spec.one_agent.host_group = group.into();
        self
    }

    /// Mutate the spec directly for cases the builder has no shortcut for.
    pub fn with_spec(mut self, mutate: impl FnOnce(&mut DynaKubeSpec)) -> Self {
        mutate(&mut self.spec);
        self
    }

    /// Build the DynaKube.
    pub fn build(self) -> DynaKube {
        DynaKube {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                uid: self.uid,
                ..Default::default()
            },
            spec: self.spec,
            status: None,
        }
    }
}

/// Convenience for building a node selector map.
pub fn selector(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
