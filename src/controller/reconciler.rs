//! Reconciliation loop for DynaKube.
//!
//! This module contains the main reconcile function that turns one DynaKube
//! into its managed workloads: the merged ActiveGate StatefulSet and Service,
//! and the OneAgent DaemonSet. Components whose configuration was removed are
//! deleted, not orphaned.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::{
    Api, ResourceExt,
    api::{DeleteParams, Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::{
    capability::{EffectiveFootprint, SECRETS_ROOT_DIR, compose},
    controller::{context::Context, error::Error},
    crd::{Condition, DynaKube, DynaKubePhase, DynaKubeStatus},
    resources,
};

/// Field manager name for server-side apply
pub const FIELD_MANAGER: &str = "dynakube-operator";

/// Finalizer name for graceful deletion
pub const FINALIZER: &str = "dynatrace.com/finalizer";

/// Reconcile a DynaKube
///
/// This is the main reconciliation function called by the controller.
/// It handles the full lifecycle: creation, updates, and deletion.
pub async fn reconcile(obj: Arc<DynaKube>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling DynaKube");

    let api: Api<DynaKube> = Api::namespaced(ctx.client.clone(), &namespace);

    // Handle deletion
    if obj.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&obj, &ctx, &namespace).await;
    }

    // Ensure finalizer is present
    if !obj.finalizers().iter().any(|f| f == FINALIZER) {
        info!(name = %name, "Adding finalizer");
        add_finalizer(&api, &name).await?;
        return Ok(Action::requeue(std::time::Duration::from_secs(1)));
    }

    let footprint = compose(obj.spec.active_gate.as_ref(), SECRETS_ROOT_DIR);

    reconcile_activegate(&obj, &ctx, &namespace, &footprint).await?;
    reconcile_oneagent(&obj, &ctx, &namespace).await?;

    let rolled_out = check_rollout(&obj, &ctx, &namespace, &footprint).await?;
    let next_phase = if rolled_out {
        DynaKubePhase::Running
    } else {
        DynaKubePhase::Deploying
    };

    let previous_phase = obj
        .status
        .as_ref()
        .map(|status| status.phase)
        .unwrap_or_default();
    if previous_phase != next_phase && next_phase == DynaKubePhase::Running {
        ctx.publish_normal_event(
            &obj,
            "Ready",
            "Reconciling",
            Some("All requested components are rolled out".to_string()),
        )
        .await;
    }

    update_status(&api, &name, next_phase).await?;

    // Record metrics
    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }

    let requeue_duration = match next_phase {
        DynaKubePhase::Running => std::time::Duration::from_secs(300),
        _ => std::time::Duration::from_secs(15),
    };

    Ok(Action::requeue(requeue_duration))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<DynaKube>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
        Action::requeue(error.requeue_after())
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
        Action::requeue(std::time::Duration::from_secs(300))
    }
}

/// Reconcile the merged ActiveGate deployment.
///
/// An enabled footprint gets its StatefulSet applied and, when a capability
/// requires it, the gateway Service. A disabled footprint deletes both; the
/// `create_service` flag on a disabled footprint means a Service from an
/// earlier configuration may still exist and must go.
async fn reconcile_activegate(
    obj: &DynaKube,
    ctx: &Context,
    namespace: &str,
    footprint: &EffectiveFootprint,
) -> Result<(), Error> {
    let name = resources::common::activegate_name(obj, footprint.short_name);
    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);

    if footprint.enabled {
        let statefulset = resources::statefulset::generate_statefulset(obj, footprint);
        sts_api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&statefulset),
            )
            .await?;

        if footprint.create_service {
            let service = resources::services::generate_activegate_service(obj, footprint);
            svc_api
                .patch(
                    &name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&service),
                )
                .await?;
        } else {
            delete_if_exists(&svc_api, &name).await?;
        }

        debug!(name = %name, capabilities = %footprint.arg_name, "Applied ActiveGate resources");
    } else {
        delete_if_exists(&sts_api, &name).await?;
        if footprint.create_service {
            delete_if_exists(&svc_api, &name).await?;
        }
    }

    Ok(())
}

/// Reconcile the OneAgent DaemonSet: applied for the host-based modes,
/// deleted otherwise.
async fn reconcile_oneagent(obj: &DynaKube, ctx: &Context, namespace: &str) -> Result<(), Error> {
    let name = resources::common::oneagent_name(obj);
    let ds_api: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), namespace);

    if obj.needs_oneagent() {
        let daemonset = resources::daemonset::generate_daemonset(obj);
        ds_api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&daemonset),
            )
            .await?;
        debug!(name = %name, "Applied OneAgent DaemonSet");
    } else {
        delete_if_exists(&ds_api, &name).await?;
    }

    Ok(())
}

/// Whether every requested component finished its rollout.
async fn check_rollout(
    obj: &DynaKube,
    ctx: &Context,
    namespace: &str,
    footprint: &EffectiveFootprint,
) -> Result<bool, Error> {
    if footprint.enabled {
        let name = resources::common::activegate_name(obj, footprint.short_name);
        let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
        let desired = footprint
            .properties
            .as_ref()
            .map(|properties| properties.replicas)
            .unwrap_or(1);
        let ready = match sts_api.get(&name).await {
            Ok(statefulset) => statefulset
                .status
                .as_ref()
                .and_then(|status| status.ready_replicas)
                .unwrap_or(0),
            Err(kube::Error::Api(e)) if e.code == 404 => 0,
            Err(e) => return Err(Error::Kube(e)),
        };

        if let Some(ref health_state) = ctx.health_state {
            health_state.metrics.set_activegate_replicas(
                namespace,
                &obj.name_any(),
                i64::from(desired),
                i64::from(ready),
            );
        }
        if ready < desired {
            return Ok(false);
        }
    }

    if obj.needs_oneagent() {
        let name = resources::common::oneagent_name(obj);
        let ds_api: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), namespace);
        match ds_api.get(&name).await {
            Ok(daemonset) => {
                let status = daemonset.status.unwrap_or_default();
                if status.number_ready < status.desired_number_scheduled {
                    return Ok(false);
                }
            }
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(false),
            Err(e) => return Err(Error::Kube(e)),
        }
    }

    Ok(true)
}

/// Delete a managed resource, treating "already gone" as success.
async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(name = %name, "Deleted stale managed resource");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Handle deletion of a DynaKube
async fn handle_deletion(obj: &DynaKube, ctx: &Context, namespace: &str) -> Result<Action, Error> {
    let name = obj.name_any();
    info!(name = %name, "Handling deletion");

    // Owned resources are garbage collected via owner references.

    // Remove finalizer
    let api: Api<DynaKube> = Api::namespaced(ctx.client.clone(), namespace);
    remove_finalizer(&api, &name).await?;

    Ok(Action::await_change())
}

/// Add finalizer to resource
async fn add_finalizer(api: &Api<DynaKube>, name: &str) -> Result<(), Error> {
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": [FINALIZER]
        }
    });
    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Remove finalizer from resource
async fn remove_finalizer(api: &Api<DynaKube>, name: &str) -> Result<(), Error> {
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": null
        }
    });
    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Update the status of a DynaKube
async fn update_status(
    api: &Api<DynaKube>,
    name: &str,
    phase: DynaKubePhase,
) -> Result<(), Error> {
    let generation = api.get(name).await?.metadata.generation;

    let conditions = if phase == DynaKubePhase::Running {
        vec![Condition::ready(
            true,
            "ComponentsRolledOut",
            "All requested components are rolled out",
            generation,
        )]
    } else {
        vec![Condition::progressing(
            true,
            "Reconciling",
            &format!("Phase: {}", phase),
            generation,
        )]
    };

    let status = DynaKubeStatus {
        phase,
        observed_generation: generation,
        conditions,
        updated_timestamp: Some(jiff::Timestamp::now().to_string()),
    };

    let patch = serde_json::json!({
        "status": status
    });

    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    Ok(())
}
