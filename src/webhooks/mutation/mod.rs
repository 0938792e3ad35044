//! Pod-mutation support: injection feature resolution.
//!
//! At pod admission time the webhook decides, per feature, whether to inject
//! it. The decision is derived from the pod's own annotations with explicit
//! precedence rules and rendered into a single summary annotation.

use std::collections::BTreeMap;

/// Annotation overriding OneAgent injection for a pod.
pub const ANNOTATION_ONEAGENT_INJECT: &str = "oneagent.dynatrace.com/inject";
/// Annotation overriding data-ingest injection for a pod.
pub const ANNOTATION_DATA_INGEST_INJECT: &str = "data-ingest.dynatrace.com/inject";
/// Annotation written onto mutated pods, summarizing the injected features.
pub const ANNOTATION_INJECTED: &str = "dynakube.dynatrace.com/injected";

/// Features the webhook can inject into a pod.
///
/// The `Ord` derive fixes the rendering order: variants are compared by
/// name, so the summary annotation is lexically sorted and deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeatureKind {
    DataIngest,
    OneAgent,
}

impl FeatureKind {
    /// Feature name as rendered into the summary annotation.
    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::OneAgent => "oneagent",
            FeatureKind::DataIngest => "data-ingest",
        }
    }
}

/// Per-pod injection decisions, one enabled flag per feature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InjectionInfo {
    features: BTreeMap<FeatureKind, bool>,
}

impl InjectionInfo {
    /// Resolve the injection decisions for a pod from its annotations.
    ///
    /// Precedence, rule by rule:
    /// 1. OneAgent injection: the pod annotation if present, else `true`.
    /// 2. Data-ingest injection: the pod annotation if present, else
    ///    whatever rule 1 resolved to - disabling OneAgent injection
    ///    silently disables data ingest unless explicitly re-enabled.
    pub fn resolve(annotations: &BTreeMap<String, String>) -> Self {
        let oneagent_inject = annotation_bool(annotations, ANNOTATION_ONEAGENT_INJECT, true);
        let data_ingest_inject =
            annotation_bool(annotations, ANNOTATION_DATA_INGEST_INJECT, oneagent_inject);

        let mut info = Self::default();
        info.add(FeatureKind::OneAgent, oneagent_inject);
        info.add(FeatureKind::DataIngest, data_ingest_inject);
        info
    }

    /// Record the decision for a feature.
    pub fn add(&mut self, feature: FeatureKind, enabled: bool) {
        self.features.insert(feature, enabled);
    }

    /// Whether injection is enabled for the given feature.
    pub fn enabled(&self, feature: FeatureKind) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }

    /// Whether any feature is enabled.
    pub fn has_any_enabled(&self) -> bool {
        self.features.values().any(|enabled| *enabled)
    }

    /// Render the summary annotation value: enabled feature names, sorted
    /// lexically, comma-joined. Returns `None` when nothing is enabled -
    /// absence of the annotation, not an empty string, signals "nothing
    /// injected".
    pub fn render(&self) -> Option<String> {
        let mut names: Vec<&str> = self
            .features
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(feature, _)| feature.name())
            .collect();
        if names.is_empty() {
            return None;
        }
        names.sort_unstable();
        Some(names.join(","))
    }
}

/// Parse a boolean annotation, falling back to `default` when the key is
/// absent or the value does not parse.
fn annotation_bool(annotations: &BTreeMap<String, String>, key: &str, default: bool) -> bool {
    annotations
        .get(key)
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(default)
}
