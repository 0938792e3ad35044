//! Unit tests for dynakube-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the public
//! API: CRD accessors, capability composition, admission validation,
//! injection resolution and the resource generators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

mod fixtures;

mod crd_tests {
    use crate::fixtures::DynaKubeBuilder;
    use dynakube_operator::crd::{Condition, DynaKubePhase};

    #[test]
    fn test_phase_display() {
        assert_eq!(DynaKubePhase::Pending.to_string(), "Pending");
        assert_eq!(DynaKubePhase::Deploying.to_string(), "Deploying");
        assert_eq!(DynaKubePhase::Running.to_string(), "Running");
        assert_eq!(DynaKubePhase::Error.to_string(), "Error");
        assert_eq!(DynaKubePhase::Deleting.to_string(), "Deleting");
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(DynaKubePhase::default(), DynaKubePhase::Pending);
    }

    #[test]
    fn test_condition_ready() {
        let condition = Condition::ready(true, "ComponentsRolledOut", "All components ready", Some(1));
        assert_eq!(condition.r#type, "Ready");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, "ComponentsRolledOut");
        assert_eq!(condition.message, "All components ready");
        assert_eq!(condition.observed_generation, Some(1));
    }

    #[test]
    fn test_condition_not_ready() {
        let condition = Condition::ready(false, "Reconciling", "Components starting", None);
        assert_eq!(condition.status, "False");
    }

    #[test]
    fn test_condition_progressing() {
        let condition = Condition::progressing(true, "Reconciling", "Updating resources", Some(2));
        assert_eq!(condition.r#type, "Progressing");
        assert_eq!(condition.status, "True");
    }

    #[test]
    fn test_images_derived_from_api_url() {
        let dk = DynaKubeBuilder::new("dynakube")
            .api_url("https://tenant.live.dynatrace.com/api")
            .build();
        assert_eq!(
            dk.activegate_image(),
            "tenant.live.dynatrace.com/linux/activegate:latest"
        );
        assert_eq!(
            dk.oneagent_image(),
            "tenant.live.dynatrace.com/linux/oneagent:latest"
        );
    }

    #[test]
    fn test_needs_oneagent_per_mode() {
        use dynakube_operator::crd::HostInjectSpec;
        use std::collections::BTreeMap;

        assert!(!DynaKubeBuilder::new("dk").build().needs_oneagent());
        assert!(
            DynaKubeBuilder::new("dk")
                .classic_full_stack(HostInjectSpec::default())
                .build()
                .needs_oneagent()
        );
        assert!(
            DynaKubeBuilder::new("dk")
                .cloud_native(BTreeMap::new())
                .build()
                .needs_oneagent()
        );
        assert!(
            DynaKubeBuilder::new("dk")
                .host_monitoring(BTreeMap::new())
                .build()
                .needs_oneagent()
        );
        // Application monitoring injects into pods, not hosts.
        assert!(
            !DynaKubeBuilder::new("dk")
                .application_monitoring("")
                .build()
                .needs_oneagent()
        );
    }

    #[test]
    fn test_standalone_log_monitoring_detection() {
        use std::collections::BTreeMap;

        let dk = DynaKubeBuilder::new("dk")
            .standalone_log_monitoring(BTreeMap::new())
            .build();
        assert!(dk.is_standalone_log_monitoring());

        // Log monitoring next to a OneAgent mode is not standalone.
        let dk = DynaKubeBuilder::new("dk")
            .standalone_log_monitoring(BTreeMap::new())
            .host_monitoring(BTreeMap::new())
            .build();
        assert!(!dk.is_standalone_log_monitoring());
    }
}

mod capability_tests {
    use crate::fixtures::DynaKubeBuilder;
    use dynakube_operator::capability::{SECRETS_ROOT_DIR, compose};

    #[test]
    fn test_compose_joins_args_in_declaration_order() {
        let dk = DynaKubeBuilder::new("dynakube")
            .active_gate(&["kube-monitoring", "routing", "metrics-ingest"])
            .build();
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);

        assert!(footprint.enabled);
        assert_eq!(
            footprint.arg_name,
            "kubernetes_monitoring,routing,metrics-ingest"
        );
        assert_eq!(footprint.short_name, "activegate");
    }

    #[test]
    fn test_compose_without_capabilities_requests_cleanup() {
        let dk = DynaKubeBuilder::new("dynakube").build();
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);

        assert!(!footprint.enabled);
        assert!(footprint.create_service);
        assert!(footprint.properties.is_none());
    }

    #[test]
    fn test_compose_with_tls_secret_mounts_certs() {
        let dk = DynaKubeBuilder::new("dynakube")
            .active_gate(&["routing"])
            .tls_secret("gateway-tls")
            .build();
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);

        assert!(footprint.volumes.iter().any(|v| v.name == "server-certs"));
        assert!(
            footprint
                .container_volume_mounts
                .iter()
                .any(|m| m.mount_path == "/var/lib/dynatrace/secrets/tls")
        );
    }
}

mod validation_tests {
    use crate::fixtures::{DynaKubeBuilder, selector};
    use dynakube_operator::crd::{DynaKube, HostInjectSpec};
    use dynakube_operator::modules::Modules;
    use dynakube_operator::webhooks::validation::oneagent::{
        ERROR_CONFLICTING_ONEAGENT_MODE, ERROR_IMAGE_WITHOUT_CSI, ERROR_VERSION_INVALID,
        WARNING_HOST_GROUP_CONFLICT, WARNING_INSTALLER_ENV_VARS, node_selector_conflict_message,
    };
    use dynakube_operator::webhooks::{ValidationContext, Verdict, validate};

    fn validate_in_scope(dk: &DynaKube, others: &[DynaKube], modules: &Modules) -> Verdict {
        let ctx = ValidationContext {
            dynakube: dk,
            all_dynakubes: others,
            modules,
        };
        validate(&ctx)
    }

    #[test]
    fn test_default_spec_is_allowed() {
        let dk = DynaKubeBuilder::new("dynakube").build();
        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(verdict.is_allowed());
        assert!(verdict.warnings().is_empty());
    }

    #[test]
    fn test_multiple_oneagent_modes_denied() {
        let dk = DynaKubeBuilder::new("dynakube")
            .classic_full_stack(HostInjectSpec::default())
            .host_monitoring(selector(&[]))
            .build();
        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(!verdict.is_allowed());
        assert_eq!(
            verdict.errors(),
            &[ERROR_CONFLICTING_ONEAGENT_MODE.to_string()]
        );
    }

    #[test]
    fn test_cross_instance_selector_conflict_denied() {
        let dk = DynaKubeBuilder::new("dynakube")
            .cloud_native(selector(&[("node", "1")]))
            .build();
        let scope = [
            DynaKubeBuilder::new("other-dk")
                .host_monitoring(selector(&[("node", "1")]))
                .build(),
        ];
        let verdict = validate_in_scope(&dk, &scope, &Modules::default());
        assert!(!verdict.is_allowed());
        assert_eq!(
            verdict.errors(),
            &[node_selector_conflict_message("other-dk")]
        );
    }

    #[test]
    fn test_disjoint_selectors_allowed() {
        let dk = DynaKubeBuilder::new("dynakube")
            .cloud_native(selector(&[("node", "1")]))
            .build();
        let scope = [
            DynaKubeBuilder::new("other-dk")
                .host_monitoring(selector(&[("node", "2")]))
                .build(),
        ];
        let verdict = validate_in_scope(&dk, &scope, &Modules::default());
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_empty_selector_conflicts_with_all_instances() {
        let dk = DynaKubeBuilder::new("dynakube")
            .host_monitoring(selector(&[]))
            .build();
        let scope = [
            DynaKubeBuilder::new("dk-a")
                .cloud_native(selector(&[("node", "1")]))
                .build(),
            DynaKubeBuilder::new("dk-b")
                .standalone_log_monitoring(selector(&[("node", "2")]))
                .build(),
        ];
        let verdict = validate_in_scope(&dk, &scope, &Modules::default());
        assert!(!verdict.is_allowed());
        assert_eq!(
            verdict.errors(),
            &[node_selector_conflict_message("dk-a, dk-b")]
        );
    }

    #[test]
    fn test_stored_revision_of_self_does_not_conflict() {
        let dk = DynaKubeBuilder::new("dynakube")
            .host_monitoring(selector(&[]))
            .build();
        let scope = [
            DynaKubeBuilder::new("dynakube")
                .host_monitoring(selector(&[("node", "1")]))
                .build(),
        ];
        let verdict = validate_in_scope(&dk, &scope, &Modules::default());
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_code_modules_image_requires_csi_module() {
        let dk = DynaKubeBuilder::new("dynakube")
            .application_monitoring("")
            .with_spec(|spec| {
                if let Some(am) = spec.one_agent.application_monitoring.as_mut() {
                    am.app_injection.code_modules_image = "custom-image".to_string();
                }
            })
            .build();

        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(verdict.is_allowed());

        let modules = Modules {
            csi_driver: false,
            ..Default::default()
        };
        let verdict = validate_in_scope(&dk, &[], &modules);
        assert!(!verdict.is_allowed());
        assert_eq!(verdict.errors(), &[ERROR_IMAGE_WITHOUT_CSI.to_string()]);
    }

    #[test]
    fn test_pinned_version_format_enforced() {
        let dk = DynaKubeBuilder::new("dynakube")
            .application_monitoring("1.0.0.20240101-000000")
            .build();
        assert!(validate_in_scope(&dk, &[], &Modules::default()).is_allowed());

        let dk = DynaKubeBuilder::new("dynakube")
            .application_monitoring("latest")
            .build();
        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(!verdict.is_allowed());
        assert_eq!(verdict.errors(), &[ERROR_VERSION_INVALID.to_string()]);
    }

    #[test]
    fn test_deprecated_host_group_arg_warns() {
        let dk = DynaKubeBuilder::new("dynakube")
            .classic_full_stack(HostInjectSpec {
                args: vec!["--set-host-group=legacy".to_string()],
                ..Default::default()
            })
            .host_group("field")
            .build();
        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(verdict.is_allowed());
        assert_eq!(
            verdict.warnings(),
            &[WARNING_HOST_GROUP_CONFLICT.to_string()]
        );
    }

    #[test]
    fn test_installer_env_vars_warn() {
        use dynakube_operator::crd::NameValuePair;

        let dk = DynaKubeBuilder::new("dynakube")
            .classic_full_stack(HostInjectSpec {
                env: vec![NameValuePair {
                    name: "ONEAGENT_INSTALLER_TOKEN".to_string(),
                    value: "secret".to_string(),
                }],
                ..Default::default()
            })
            .build();
        let verdict = validate_in_scope(&dk, &[], &Modules::default());
        assert!(verdict.is_allowed());
        assert_eq!(
            verdict.warnings(),
            &[WARNING_INSTALLER_ENV_VARS.to_string()]
        );
    }
}

mod injection_tests {
    use dynakube_operator::webhooks::mutation::{
        ANNOTATION_DATA_INGEST_INJECT, ANNOTATION_ONEAGENT_INJECT, FeatureKind, InjectionInfo,
    };
    use std::collections::BTreeMap;

    fn annotations(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unannotated_pod_gets_everything() {
        let info = InjectionInfo::resolve(&BTreeMap::new());
        assert!(info.enabled(FeatureKind::OneAgent));
        assert!(info.enabled(FeatureKind::DataIngest));
        assert_eq!(info.render(), Some("data-ingest,oneagent".to_string()));
    }

    #[test]
    fn test_opting_out_of_oneagent_disables_data_ingest() {
        let info = InjectionInfo::resolve(&annotations(&[(ANNOTATION_ONEAGENT_INJECT, "false")]));
        assert!(!info.has_any_enabled());
        assert_eq!(info.render(), None);
    }

    #[test]
    fn test_data_ingest_can_be_kept_alone() {
        let info = InjectionInfo::resolve(&annotations(&[
            (ANNOTATION_ONEAGENT_INJECT, "false"),
            (ANNOTATION_DATA_INGEST_INJECT, "true"),
        ]));
        assert!(!info.enabled(FeatureKind::OneAgent));
        assert!(info.enabled(FeatureKind::DataIngest));
        assert_eq!(info.render(), Some("data-ingest".to_string()));
    }
}

mod resources_tests {
    use crate::fixtures::{DynaKubeBuilder, selector};
    use dynakube_operator::capability::{SECRETS_ROOT_DIR, compose};
    use dynakube_operator::crd::DynaKube;
    use dynakube_operator::resources::daemonset::{generate_daemonset, oneagent_feature};
    use dynakube_operator::resources::services::{
        HTTP_SERVICE_PORT, HTTPS_SERVICE_PORT, generate_activegate_service,
    };
    use dynakube_operator::resources::statefulset::generate_statefulset;

    fn activegate_dynakube(capabilities: &[&str]) -> DynaKube {
        DynaKubeBuilder::new("dynakube")
            .active_gate(capabilities)
            .build()
    }

    #[test]
    fn test_statefulset_reflects_footprint() {
        let dk = activegate_dynakube(&["routing", "metrics-ingest"]);
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);
        let sts = generate_statefulset(&dk, &footprint);

        assert_eq!(sts.metadata.name.as_deref(), Some("dynakube-activegate"));

        let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        let capabilities = env.iter().find(|v| v.name == "DT_CAPABILITIES").unwrap();
        assert_eq!(
            capabilities.value.as_deref(),
            Some("routing,metrics-ingest")
        );
        assert!(container.readiness_probe.is_some());
    }

    #[test]
    fn test_resources_follow_dynakube_namespace() {
        let dk = DynaKubeBuilder::new("dynakube")
            .namespace("monitoring")
            .active_gate(&["routing"])
            .build();
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);

        let sts = generate_statefulset(&dk, &footprint);
        assert_eq!(sts.metadata.namespace.as_deref(), Some("monitoring"));

        let service = generate_activegate_service(&dk, &footprint);
        assert_eq!(service.metadata.namespace.as_deref(), Some("monitoring"));
    }

    #[test]
    fn test_statefulset_owned_by_dynakube() {
        let dk = activegate_dynakube(&["routing"]);
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);
        let sts = generate_statefulset(&dk, &footprint);

        let owners = sts.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "DynaKube");
        assert_eq!(owners[0].name, "dynakube");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_service_exposes_https_and_http() {
        let dk = activegate_dynakube(&["routing"]);
        let footprint = compose(dk.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);
        let service = generate_activegate_service(&dk, &footprint);

        assert_eq!(
            service.metadata.name.as_deref(),
            Some("dynakube-activegate")
        );
        let ports = service.spec.unwrap().ports.unwrap();
        assert!(ports.iter().any(|p| p.port == HTTPS_SERVICE_PORT));
        assert!(ports.iter().any(|p| p.port == HTTP_SERVICE_PORT));
    }

    #[test]
    fn test_daemonset_feature_follows_mode() {
        let dk = DynaKubeBuilder::new("dynakube")
            .cloud_native(selector(&[]))
            .build();
        assert_eq!(oneagent_feature(&dk), "cloud-native-fullstack");

        let dk = DynaKubeBuilder::new("dynakube")
            .host_monitoring(selector(&[]))
            .build();
        assert_eq!(oneagent_feature(&dk), "host-monitoring");
    }

    #[test]
    fn test_daemonset_mounts_host_and_certs() {
        let dk = DynaKubeBuilder::new("dynakube")
            .host_monitoring(selector(&[("node", "1")]))
            .trusted_cas("dynatrace-cas")
            .build();
        let ds = generate_daemonset(&dk);

        assert_eq!(ds.metadata.name.as_deref(), Some("dynakube-oneagent"));
        let pod_spec = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.host_network, Some(true));
        assert_eq!(
            pod_spec.node_selector,
            Some(selector(&[("node", "1")]))
        );
        let volumes = pod_spec.volumes.unwrap();
        assert!(volumes.iter().any(|v| v.name == "host-root"));
        assert!(volumes.iter().any(|v| v.name == "certs"));
    }
}

mod error_tests {
    use dynakube_operator::controller::error::Error;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(api_error(429).is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!api_error(404).is_retryable());
        assert!(!api_error(409).is_retryable());
        assert!(!Error::Validation("bad spec".to_string()).is_retryable());
        assert!(!Error::Permanent("no recovery".to_string()).is_retryable());
        assert!(Error::Transient("try again".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_not_found());
        assert!(!Error::Transient("nope".to_string()).is_not_found());
    }

    #[test]
    fn test_requeue_durations() {
        assert!(api_error(500).requeue_after() < api_error(404).requeue_after());
    }
}
