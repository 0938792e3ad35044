//! Common resource generation utilities.
//!
//! Provides the shared label scheme, owner references and naming helpers used
//! by every resource the operator manages.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::DynaKube;

/// Label key identifying the Dynatrace component of a managed resource.
pub const KEY_COMPONENT: &str = "dynatrace.com/component";
/// Label key carrying the owning DynaKube's name.
pub const KEY_INSTANCE: &str = "operator.dynatrace.com/instance";
/// Label key carrying the feature a resource belongs to.
pub const KEY_FEATURE: &str = "operator.dynatrace.com/feature";

/// Component label value for ActiveGate resources.
pub const VALUE_ACTIVEGATE: &str = "activegate";
/// Component label value for OneAgent resources.
pub const VALUE_ONEAGENT: &str = "oneagent";

/// Labels identifying a managed resource: component, owning instance and
/// feature. Also used as the pod selector, so these must stay stable across
/// operator versions.
pub fn component_labels(
    dynakube: &DynaKube,
    component: &str,
    feature: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(KEY_COMPONENT.to_string(), component.to_string());
    labels.insert(KEY_INSTANCE.to_string(), dynakube.name_any());
    labels.insert(KEY_FEATURE.to_string(), feature.to_string());
    labels
}

/// Merge label maps left to right; later maps win on key collisions.
pub fn merge_labels(maps: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for map in maps {
        for (key, value) in map.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Name of the merged ActiveGate StatefulSet and its Service.
pub fn activegate_name(dynakube: &DynaKube, short_name: &str) -> String {
    format!("{}-{}", dynakube.name_any(), short_name)
}

/// Name of the OneAgent DaemonSet.
pub fn oneagent_name(dynakube: &DynaKube) -> String {
    format!("{}-{}", dynakube.name_any(), VALUE_ONEAGENT)
}

/// Create owner reference for a DynaKube
pub fn owner_reference(dynakube: &DynaKube) -> OwnerReference {
    OwnerReference {
        api_version: "dynatrace.com/v1beta3".to_string(),
        kind: "DynaKube".to_string(),
        name: dynakube.name_any(),
        uid: dynakube.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crd::DynaKubeSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_dynakube(name: &str) -> DynaKube {
        DynaKube {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("dynatrace".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: DynaKubeSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_component_labels() {
        let dk = test_dynakube("dynakube");
        let labels = component_labels(&dk, VALUE_ACTIVEGATE, "activegate");

        assert_eq!(
            labels.get(KEY_COMPONENT),
            Some(&"activegate".to_string())
        );
        assert_eq!(labels.get(KEY_INSTANCE), Some(&"dynakube".to_string()));
        assert_eq!(labels.get(KEY_FEATURE), Some(&"activegate".to_string()));
    }

    #[test]
    fn test_merge_labels_later_wins() {
        let mut base = BTreeMap::new();
        base.insert("a".to_string(), "1".to_string());
        base.insert("b".to_string(), "1".to_string());
        let mut overlay = BTreeMap::new();
        overlay.insert("b".to_string(), "2".to_string());

        let merged = merge_labels(&[&base, &overlay]);
        assert_eq!(merged.get("a"), Some(&"1".to_string()));
        assert_eq!(merged.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn test_resource_names() {
        let dk = test_dynakube("dynakube");
        assert_eq!(activegate_name(&dk, "activegate"), "dynakube-activegate");
        assert_eq!(oneagent_name(&dk), "dynakube-oneagent");
    }

    #[test]
    fn test_owner_reference() {
        let dk = test_dynakube("dynakube");
        let owner = owner_reference(&dk);

        assert_eq!(owner.api_version, "dynatrace.com/v1beta3");
        assert_eq!(owner.kind, "DynaKube");
        assert_eq!(owner.name, "dynakube");
        assert_eq!(owner.uid, "test-uid");
        assert_eq!(owner.controller, Some(true));
    }
}
