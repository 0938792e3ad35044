//! DynaKube Custom Resource Definition.
//!
//! A DynaKube describes one desired observability deployment: which OneAgent
//! mode runs on the nodes, which ActiveGate capabilities are enabled, and
//! whether standalone log monitoring is requested. At most one OneAgent mode
//! may be set at a time; the admission webhook enforces this.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DynaKube is a custom resource for deploying OneAgent and ActiveGate.
///
/// Example:
/// ```yaml
/// apiVersion: dynatrace.com/v1beta3
/// kind: DynaKube
/// metadata:
///   name: dynakube
/// spec:
///   apiUrl: https://ENVIRONMENTID.live.dynatrace.com/api
///   oneAgent:
///     cloudNativeFullStack:
///       nodeSelector:
///         kubernetes.io/os: linux
///   activeGate:
///     capabilities:
///       - routing
///       - metrics-ingest
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dynatrace.com",
    version = "v1beta3",
    kind = "DynaKube",
    plural = "dynakubes",
    shortname = "dk",
    status = "DynaKubeStatus",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"ApiUrl", "type":"string", "jsonPath":".spec.apiUrl"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeSpec {
    /// Dynatrace API endpoint, e.g. https://ENVIRONMENTID.live.dynatrace.com/api
    pub api_url: String,

    /// Name of a ConfigMap holding certificates of trusted CAs.
    #[serde(default)]
    pub trusted_cas: String,

    /// OneAgent deployment configuration. The mode variants are mutually
    /// exclusive; leaving all of them unset disables OneAgent rollout.
    #[serde(default)]
    pub one_agent: OneAgentSpec,

    /// ActiveGate deployment configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_gate: Option<ActiveGateSpec>,

    /// Standalone log monitoring configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_monitoring: Option<LogMonitoringSpec>,

    /// Low-level templates for individual components.
    #[serde(default)]
    pub templates: TemplatesSpec,
}

impl Default for DynaKubeSpec {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            trusted_cas: String::new(),
            one_agent: OneAgentSpec::default(),
            active_gate: None,
            log_monitoring: None,
            templates: TemplatesSpec::default(),
        }
    }
}

/// OneAgent deployment modes. At most one variant may be set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OneAgentSpec {
    /// Classic fullstack injection: OneAgent DaemonSet plus webhook-based
    /// application injection from the host agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classic_full_stack: Option<HostInjectSpec>,

    /// Host monitoring only: OneAgent DaemonSet without application injection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_monitoring: Option<HostInjectSpec>,

    /// Cloud native fullstack: OneAgent DaemonSet plus CSI-provisioned
    /// code modules for application injection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_native_full_stack: Option<CloudNativeFullStackSpec>,

    /// Application-only monitoring: no DaemonSet, injection via webhook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_monitoring: Option<ApplicationMonitoringSpec>,

    /// Host group assigned to all monitored hosts.
    #[serde(default)]
    pub host_group: String,
}

/// Configuration shared by all host-based OneAgent modes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostInjectSpec {
    /// Node selector controlling which nodes the OneAgent DaemonSet targets.
    /// An empty selector targets every node.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Additional OneAgent installer arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Additional environment variables for the OneAgent container.
    #[serde(default)]
    pub env: Vec<NameValuePair>,

    /// Pin a specific OneAgent version instead of the latest available.
    /// Format: `major.minor.patch.timestamp`, e.g. `1.0.0.20240101-000000`.
    #[serde(default)]
    pub version: String,

    /// Custom OneAgent image. Defaults to the tenant registry image.
    #[serde(default)]
    pub image: String,
}

/// A plain name/value environment variable entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NameValuePair {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Cloud native fullstack mode: host injection plus code-modules injection.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudNativeFullStackSpec {
    #[serde(flatten)]
    pub host_inject: HostInjectSpec,

    #[serde(flatten)]
    pub app_injection: AppInjectionSpec,
}

/// Application-only monitoring mode.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMonitoringSpec {
    #[serde(flatten)]
    pub app_injection: AppInjectionSpec,

    /// Pin a specific code-modules version.
    #[serde(default)]
    pub version: String,
}

/// Settings for webhook-based application injection.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppInjectionSpec {
    /// Custom code-modules image. Requires the CSI driver module, which
    /// stages the image contents onto the nodes.
    #[serde(default)]
    pub code_modules_image: String,
}

/// ActiveGate deployment configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateSpec {
    /// Enabled capabilities, in declaration order. Order is significant: the
    /// generated gateway argument string follows it. Unknown names are
    /// ignored for forward compatibility.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Name of a Secret holding a custom TLS certificate for the gateway
    /// endpoints (`server.p12` + password).
    #[serde(default)]
    pub tls_secret_name: String,

    #[serde(flatten)]
    pub properties: ActiveGateProperties,
}

/// Instance-level ActiveGate properties shared by all enabled capabilities.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateProperties {
    /// Node selector for ActiveGate pod placement.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Additional labels for ActiveGate pods.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// ActiveGate group name.
    #[serde(default)]
    pub group: String,

    /// Number of ActiveGate replicas (default 1).
    #[serde(default = "default_activegate_replicas")]
    pub replicas: i32,
}

fn default_activegate_replicas() -> i32 {
    1
}

/// Standalone log monitoring. Present-but-empty enables it with defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogMonitoringSpec {
    /// Restrict ingestion to specific log sources.
    #[serde(default)]
    pub ingest_rule_matchers: Vec<IngestRuleMatcher>,
}

/// A single log-source matcher rule.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestRuleMatcher {
    #[serde(default)]
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Component templates.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesSpec {
    /// Template for the standalone log monitoring DaemonSet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_monitoring: Option<LogMonitoringTemplateSpec>,
}

/// Template for the standalone log monitoring DaemonSet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogMonitoringTemplateSpec {
    /// Node selector for log monitoring pod placement.
    /// An empty selector targets every node.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

impl DynaKube {
    /// Count the OneAgent mode variants that are set. Valid specs have 0 or 1.
    pub fn one_agent_mode_count(&self) -> usize {
        let oa = &self.spec.one_agent;
        [
            oa.classic_full_stack.is_some(),
            oa.host_monitoring.is_some(),
            oa.cloud_native_full_stack.is_some(),
            oa.application_monitoring.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Whether any OneAgent mode rolls a DaemonSet onto the nodes.
    pub fn needs_oneagent(&self) -> bool {
        let oa = &self.spec.one_agent;
        oa.classic_full_stack.is_some()
            || oa.host_monitoring.is_some()
            || oa.cloud_native_full_stack.is_some()
    }

    /// Standalone log monitoring: log monitoring requested without any
    /// OneAgent mode (otherwise the OneAgent takes over log collection).
    pub fn is_standalone_log_monitoring(&self) -> bool {
        self.spec.log_monitoring.is_some() && self.one_agent_mode_count() == 0
    }

    /// The node selector of the active host-based OneAgent mode, if any.
    pub fn oneagent_node_selector(&self) -> Option<&BTreeMap<String, String>> {
        let oa = &self.spec.one_agent;
        oa.classic_full_stack
            .as_ref()
            .or(oa.host_monitoring.as_ref())
            .map(|host| &host.node_selector)
            .or_else(|| {
                oa.cloud_native_full_stack
                    .as_ref()
                    .map(|cnfs| &cnfs.host_inject.node_selector)
            })
    }

    /// Node selector of the standalone log monitoring DaemonSet template.
    /// Defaults to the empty selector (all nodes) when no template is given.
    pub fn log_monitoring_node_selector(&self) -> Option<&BTreeMap<String, String>> {
        if !self.is_standalone_log_monitoring() {
            return None;
        }
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        Some(
            self.spec
                .templates
                .log_monitoring
                .as_ref()
                .map(|tpl| &tpl.node_selector)
                .unwrap_or(&EMPTY),
        )
    }

    /// The host-inject settings of the active host-based mode, if any.
    pub fn host_inject_spec(&self) -> Option<&HostInjectSpec> {
        let oa = &self.spec.one_agent;
        oa.classic_full_stack
            .as_ref()
            .or(oa.host_monitoring.as_ref())
            .or(oa
                .cloud_native_full_stack
                .as_ref()
                .map(|cnfs| &cnfs.host_inject))
    }

    /// OneAgent installer arguments of the active mode.
    pub fn oneagent_args(&self) -> &[String] {
        self.host_inject_spec()
            .map(|host| host.args.as_slice())
            .unwrap_or(&[])
    }

    /// OneAgent environment variables of the active mode.
    pub fn oneagent_env(&self) -> &[NameValuePair] {
        self.host_inject_spec()
            .map(|host| host.env.as_slice())
            .unwrap_or(&[])
    }

    /// Every custom OneAgent version pinned anywhere in the spec.
    pub fn custom_oneagent_versions(&self) -> Vec<&str> {
        let oa = &self.spec.one_agent;
        let mut versions = Vec::new();
        if let Some(host) = self.host_inject_spec() {
            if !host.version.is_empty() {
                versions.push(host.version.as_str());
            }
        }
        if let Some(app_mon) = &oa.application_monitoring {
            if !app_mon.version.is_empty() {
                versions.push(app_mon.version.as_str());
            }
        }
        versions
    }

    /// Custom code-modules image, if one is declared by the active mode.
    pub fn code_modules_image(&self) -> Option<&str> {
        let oa = &self.spec.one_agent;
        let image = oa
            .application_monitoring
            .as_ref()
            .map(|app_mon| app_mon.app_injection.code_modules_image.as_str())
            .or_else(|| {
                oa.cloud_native_full_stack
                    .as_ref()
                    .map(|cnfs| cnfs.app_injection.code_modules_image.as_str())
            })?;
        if image.is_empty() { None } else { Some(image) }
    }

    /// Host part of the tenant API URL, which doubles as the tenant image
    /// registry. `https://tenant.live.dynatrace.com/api` yields
    /// `tenant.live.dynatrace.com`.
    pub fn registry_host(&self) -> &str {
        let url = &self.spec.api_url;
        let host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        host.split('/').next().unwrap_or_default()
    }

    /// ActiveGate image: the tenant registry default, no override supported.
    pub fn activegate_image(&self) -> String {
        format!("{}/linux/activegate:latest", self.registry_host())
    }

    /// OneAgent image: the custom image when one is set on the active mode,
    /// the tenant registry default otherwise.
    pub fn oneagent_image(&self) -> String {
        if let Some(host) = self.host_inject_spec() {
            if !host.image.is_empty() {
                return host.image.clone();
            }
        }
        format!("{}/linux/oneagent:latest", self.registry_host())
    }

    /// TLS secret declared on the ActiveGate, if any.
    pub fn activegate_tls_secret(&self) -> Option<&str> {
        self.spec
            .active_gate
            .as_ref()
            .map(|ag| ag.tls_secret_name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Status of a DynaKube.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeStatus {
    /// Current phase of the deployment lifecycle.
    #[serde(default)]
    pub phase: DynaKubePhase,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Timestamp of the last status update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_timestamp: Option<String>,
}

/// DynaKubePhase represents the current lifecycle phase of a DynaKube.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
    JsonSchema,
)]
pub enum DynaKubePhase {
    /// Initial state, waiting for reconciliation.
    #[default]
    Pending,
    /// Component resources are being created or updated.
    Deploying,
    /// All requested components are rolled out.
    Running,
    /// Reconciliation failed and requires intervention.
    Error,
    /// The DynaKube is being deleted.
    Deleting,
}

impl std::fmt::Display for DynaKubePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DynaKubePhase::Pending => write!(f, "Pending"),
            DynaKubePhase::Deploying => write!(f, "Deploying"),
            DynaKubePhase::Running => write!(f, "Running"),
            DynaKubePhase::Error => write!(f, "Error"),
            DynaKubePhase::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Condition describes the state of a DynaKube at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }
}
