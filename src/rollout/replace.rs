//! Replace strategy
//!
//! Moves a component or sharding to new instance templates one instance per
//! pass: scale a template created by the Rollout up by one, then take the
//! old stable instance with the highest ordinal offline, until every
//! instance runs from the new templates. For a sharding each step moves the
//! shared template, so every shard gains or loses one instance.
//!
//! The templates are named after the first 8 characters of the Rollout uid:
//! `<uid[:8]>` replaces the component defaults and `<tpl>-<uid[:8]>`
//! replaces the existing template `<tpl>`. New templates carry the replace
//! strategy's scheduling policy and canary instance metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

use super::context::RolloutTransformContext;
use super::target::Target;
use super::{COMPONENT_NOT_READY_REQUEUE, INFINITE_DELAY_REQUEUE, STALE_STATUS_REQUEUE};
use crate::crd::{
    Cluster, ClusterComponentSpec, InstanceTemplate, Rollout, RolloutComponentStatus,
    RolloutStrategyReplace, INSTANCE_TEMPLATE_LABEL, TEMPLATE_CREATED_BY_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::events::{actions, reasons};
use crate::model::{is_object_deleting, GraphClient, ObjectGraph};
use crate::plan::{TransformContext, Transformer};

// =============================================================================
// Instance Templates
// =============================================================================

/// Suffix of the instance templates created by `rollout`
pub(super) fn template_suffix(rollout: &Rollout) -> Result<String> {
    rollout
        .metadata
        .uid
        .as_deref()
        .and_then(|uid| uid.get(..8))
        .map(str::to_string)
        .ok_or_else(|| Error::Internal(format!("rollout {} has no uid", rollout.name_any())))
}

/// Original and target replicas of a replaced target, per shard.
///
/// Only complete rollouts are supported: the target is 0 (meaning all) or
/// the original replicas.
pub(super) fn replace_replicas(
    rollout: &Rollout,
    target: &Target,
    spec: &ClusterComponentSpec,
    shards: i32,
) -> Result<(i32, i32)> {
    let replicas = match target.status(rollout) {
        Some(status) if shards > 0 => status.replicas / shards,
        Some(_) => 0,
        None => spec.replicas,
    };

    let target_replicas = match &target.replicas {
        Some(value) => scaled_value(value, replicas).map_err(|e| {
            Error::Validation(format!(
                "failed to get scaled value for replicas of {}: {}",
                target, e
            ))
        })?,
        None => 0,
    };
    if target_replicas < 0 || target_replicas > replicas {
        return Err(Error::Validation(format!(
            "the target replicas {} is out-of-range, {}, replicas: {}",
            target_replicas, target, replicas
        )));
    }
    if target_replicas > 0 && target_replicas < replicas {
        return Err(Error::Validation(format!(
            "partially rollout with the replace strategy not supported, {}",
            target
        )));
    }
    Ok((replicas, target_replicas))
}

/// Absolute value of an int-or-percent, percentages rounded down
fn scaled_value(value: &IntOrString, total: i32) -> std::result::Result<i32, String> {
    match value {
        IntOrString::Int(v) => Ok(*v),
        IntOrString::String(s) => {
            let percent = s
                .strip_suffix('%')
                .ok_or_else(|| format!("{:?} is not a percentage", s))?;
            let percent: i64 = percent
                .parse()
                .map_err(|e| format!("invalid percentage {:?}: {}", s, e))?;
            let scaled = (i64::from(total) * percent).div_euclid(100);
            i32::try_from(scaled).map_err(|e| e.to_string())
        }
    }
}

/// Templates created by the Rollout, by the name of the template they
/// replace; the component defaults are replaced under `""`
pub(super) fn rollout_templates(spec: &ClusterComponentSpec, suffix: &str) -> BTreeMap<String, usize> {
    let dashed = format!("-{}", suffix);
    spec.instances
        .iter()
        .enumerate()
        .filter(|(_, tpl)| tpl.name.ends_with(suffix))
        .map(|(i, tpl)| {
            let key = if tpl.name == suffix {
                String::new()
            } else {
                tpl.name.strip_suffix(&dashed).unwrap_or(&tpl.name).to_string()
            };
            (key, i)
        })
        .collect()
}

pub(super) fn template_replicas(spec: &ClusterComponentSpec, tpls: &BTreeMap<String, usize>) -> i32 {
    tpls.values()
        .filter_map(|i| spec.instances.get(*i))
        .map(InstanceTemplate::replicas)
        .sum()
}

/// Name of the template `tpl` stands for; templates created by an earlier
/// Rollout stand for the one they replaced
fn replaced_template_name(tpl: &InstanceTemplate) -> &str {
    if !tpl.annotations.contains_key(TEMPLATE_CREATED_BY_ANNOTATION) {
        return &tpl.name;
    }
    match tpl.name.rsplit_once('-') {
        Some((name, _)) => name,
        None => "",
    }
}

fn new_template_name(tpl: &InstanceTemplate, suffix: &str) -> String {
    match replaced_template_name(tpl) {
        "" => suffix.to_string(),
        name => format!("{}-{}", name, suffix),
    }
}

fn new_template(
    target: &Target,
    replace: &RolloutStrategyReplace,
    name: String,
    base: Option<&InstanceTemplate>,
) -> InstanceTemplate {
    let mut tpl = base.cloned().unwrap_or_default();
    tpl.name = name;
    tpl.replicas = Some(0);
    if let Some(service_version) = &target.service_version {
        tpl.service_version = Some(service_version.clone());
    }
    if let Some(comp_def) = &target.comp_def {
        tpl.comp_def = Some(comp_def.clone());
    }
    if let Some(policy) = &replace.scheduling_policy {
        tpl.scheduling_policy = Some(policy.clone());
    }
    if let Some(canary) = replace.instance_meta.as_ref().and_then(|meta| meta.canary.as_ref()) {
        tpl.labels
            .extend(canary.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        tpl.annotations
            .extend(canary.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    tpl.annotations
        .insert(TEMPLATE_CREATED_BY_ANNOTATION.to_string(), "yes".to_string());
    tpl
}

/// Templates to add to a target the Rollout has not touched yet
fn initial_templates(
    target: &Target,
    replace: &RolloutStrategyReplace,
    spec: &ClusterComponentSpec,
    suffix: &str,
) -> Result<Vec<InstanceTemplate>> {
    if !spec.instances.is_empty() && !spec.flat_instance_ordinal {
        return Err(Error::Validation(
            "not support the replace strategy with the flatInstanceOrdinal is false".into(),
        ));
    }

    let mut tpls = BTreeMap::new();
    tpls.insert(
        String::new(),
        new_template(target, replace, suffix.to_string(), None),
    );
    for tpl in spec.instances.iter().filter(|tpl| tpl.replicas() > 0) {
        tpls.insert(
            replaced_template_name(tpl).to_string(),
            new_template(target, replace, new_template_name(tpl, suffix), Some(tpl)),
        );
    }
    Ok(tpls.into_values().collect())
}

// =============================================================================
// Pods
// =============================================================================

fn ordinal(name: &str) -> Option<u32> {
    name.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
}

/// Stable pods of a target, highest ordinal first
pub(super) async fn stable_pods(client: &GraphClient, cluster: &Cluster, target: &Target) -> Result<Vec<Pod>> {
    let labels = target.stable_pod_labels(cluster);
    let mut pods: Vec<Pod> = client.list(cluster.namespace().as_deref(), &labels).await?;
    pods.sort_by_cached_key(|pod| {
        let name = pod.name_any();
        std::cmp::Reverse((ordinal(&name), name))
    });
    Ok(pods)
}

fn pod_template(pod: &Pod) -> &str {
    pod.labels()
        .get(INSTANCE_TEMPLATE_LABEL)
        .map(String::as_str)
        .unwrap_or_default()
}

/// The pod was not created from a template of the Rollout
pub(super) fn is_old_pod(pod: &Pod, suffix: &str) -> bool {
    !pod_template(pod).ends_with(suffix)
}

/// Next old instance to take offline, with the index of its template
fn pick_instance(
    pods: &[Pod],
    spec: &ClusterComponentSpec,
    suffix: &str,
) -> Result<Option<(String, Option<usize>)>> {
    let Some(pod) = pods
        .iter()
        .find(|pod| !is_object_deleting(*pod) && is_old_pod(pod, suffix))
    else {
        return Ok(None);
    };

    let tpl_name = pod_template(pod);
    if tpl_name.is_empty() {
        return Ok(Some((pod.name_any(), None)));
    }
    match spec.instances.iter().position(|tpl| tpl.name == tpl_name) {
        Some(i) => Ok(Some((pod.name_any(), Some(i)))),
        None => Err(Error::Internal(format!(
            "the instance template {} has not been found",
            tpl_name
        ))),
    }
}

// =============================================================================
// Delays
// =============================================================================

/// Wait for the configured delay since the last opposite step.
///
/// The status must already reflect the previous step, otherwise the
/// timestamp it carries is stale.
fn check_delay(
    now: DateTime<Utc>,
    status: Option<&RolloutComponentStatus>,
    replace: &RolloutStrategyReplace,
    new_replicas: i32,
    scale_down: bool,
) -> Result<()> {
    let delay = if scale_down {
        replace.scale_down_delay_seconds
    } else {
        replace.per_instance_interval_seconds
    };
    let delay = match delay {
        None | Some(0) => return Ok(()),
        Some(d) if d < 0 => return Err(Error::requeue_after(INFINITE_DELAY_REQUEUE, "infinite delay")),
        Some(d) => d,
    };

    let Some(status) = status else {
        return Ok(());
    };
    let last = if scale_down {
        if status.new_replicas != new_replicas {
            return Err(Error::requeue_after(STALE_STATUS_REQUEUE, "stale up status"));
        }
        status.last_scale_up_timestamp
    } else {
        if status.rolled_out_replicas != new_replicas {
            return Err(Error::requeue_after(STALE_STATUS_REQUEUE, "stale down status"));
        }
        status.last_scale_down_timestamp
    };
    let Some(last) = last else {
        return Ok(());
    };

    let remaining = last + chrono::Duration::seconds(i64::from(delay)) - now;
    match remaining.to_std() {
        Ok(remaining) if !remaining.is_zero() => {
            let step = if scale_down {
                "scale down"
            } else {
                "rollout next instance"
            };
            Err(Error::requeue_after(
                remaining,
                format!("delay to {} for {:?}", step, remaining),
            ))
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Transformer
// =============================================================================

enum Step {
    Up,
    Down(Option<String>),
}

/// Plans one replace step for each component and sharding using the
/// replace strategy
pub struct ReplaceTransformer;

impl ReplaceTransformer {
    async fn target(
        &self,
        ctx: &mut RolloutTransformContext,
        target: &Target,
        replace: &RolloutStrategyReplace,
        suffix: &str,
    ) -> Result<()> {
        let cluster = ctx.cluster()?;
        let spec = target.require_spec(cluster)?;
        let shards = target.shards(cluster);
        let (replicas, _) = replace_replicas(&ctx.rollout, target, spec, shards)?;

        let existing = rollout_templates(spec, suffix);
        let pending = if existing.is_empty() {
            initial_templates(target, replace, spec, suffix)?
        } else {
            Vec::new()
        };
        let new_replicas = template_replicas(spec, &existing);
        if new_replicas == replicas && spec.replicas == replicas {
            return Ok(());
        }

        if !target.is_running(cluster) {
            return Err(Error::requeue_after(
                COMPONENT_NOT_READY_REQUEUE,
                format!("the {} is not ready", target),
            ));
        }
        let pods = stable_pods(ctx.client(), cluster, target).await?;

        let now = ctx.now;
        let status = target.status(&ctx.rollout).cloned();
        let spec = target
            .spec_mut(ctx.cluster_mut()?)
            .ok_or_else(|| Error::Internal(format!("{} vanished", target)))?;

        if !pending.is_empty() {
            spec.instances.extend(pending);
            spec.flat_instance_ordinal = true;
        }
        let tpls = rollout_templates(spec, suffix);
        let (instance, instance_tpl) = match pick_instance(&pods, spec, suffix)? {
            Some((name, tpl)) => (Some(name), tpl),
            None => (None, None),
        };

        let total = new_replicas * shards;
        let step = if spec.replicas == replicas {
            check_delay(now, status.as_ref(), replace, total, false)?;
            let replaced = instance_tpl
                .map(|i| replaced_template_name(&spec.instances[i]).to_string())
                .unwrap_or_default();
            let index = *tpls.get(&replaced).ok_or_else(|| {
                Error::Internal(format!("no instance template replaces {:?}", replaced))
            })?;
            let tpl = &mut spec.instances[index];
            tpl.replicas = Some(tpl.replicas() + 1);
            spec.replicas += 1;
            Step::Up
        } else {
            check_delay(now, status.as_ref(), replace, total, true)?;
            spec.replicas -= 1;
            if let Some(i) = instance_tpl {
                let tpl = &mut spec.instances[i];
                if tpl.replicas() == 0 {
                    return Err(Error::Internal(format!(
                        "the instance template {} still has running instances, but its replicas is already 0",
                        tpl.name
                    )));
                }
                tpl.replicas = Some(tpl.replicas() - 1);
            }
            if let Some(instance) = &instance {
                spec.offline_instances.push(instance.clone());
            }
            Step::Down(instance)
        };

        match step {
            Step::Up => {
                let scaled = (new_replicas + 1) * shards;
                info!(parent: ctx.span(), target = %target, new_replicas = scaled, "Scaling up new instance");
                ctx.publish(
                    EventType::Normal,
                    reasons::SCALED_UP,
                    actions::SCALE,
                    Some(format!("{}: new instances {}", target, scaled)),
                )
                .await;
            }
            Step::Down(instance) => {
                info!(parent: ctx.span(), target = %target, instance = ?instance, "Scaling down old instance");
                if let Some(instance) = &instance {
                    if let Some(status) = target.status_mut(&mut ctx.rollout) {
                        status.scale_down_instances.push(instance.clone());
                    }
                }
                ctx.publish(
                    EventType::Normal,
                    reasons::SCALED_DOWN,
                    actions::SCALE,
                    instance.map(|i| format!("{}: instance {} offline", target, i)),
                )
                .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transformer<RolloutTransformContext> for ReplaceTransformer {
    fn name(&self) -> &'static str {
        "replace"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        _graph: &mut ObjectGraph,
    ) -> Result<()> {
        if is_object_deleting(&ctx.rollout_orig) || ctx.rollout_orig.is_succeed() {
            return Ok(());
        }
        let suffix = template_suffix(&ctx.rollout)?;
        for target in Target::all(&ctx.rollout) {
            if let Some(replace) = &target.strategy.replace {
                self.target(ctx, &target, replace, &suffix).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        InstanceMetadata, RolloutComponent, RolloutInstanceMeta, RolloutSharding, RolloutSpec,
        RolloutStatus, SchedulingPolicy,
    };
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn rollout(replicas: Option<IntOrString>) -> (Rollout, Target) {
        let comp = RolloutComponent {
            name: "comp".into(),
            service_version: Some("v2".into()),
            replicas,
            ..Default::default()
        };
        let mut rollout = Rollout::new(
            "r1",
            RolloutSpec {
                cluster_name: "c1".into(),
                components: vec![comp.clone()],
                ..Default::default()
            },
        );
        rollout.metadata.uid = Some("5f4e3d2c-1b0a-4a2b-9c8d-7e6f5a4b3c2d".into());
        (rollout, Target::from(&comp))
    }

    fn spec(replicas: i32) -> ClusterComponentSpec {
        ClusterComponentSpec {
            name: "comp".into(),
            service_version: "v1".into(),
            replicas,
            ..Default::default()
        }
    }

    fn template(name: &str, replicas: i32) -> InstanceTemplate {
        InstanceTemplate {
            name: name.into(),
            replicas: Some(replicas),
            ..Default::default()
        }
    }

    #[test]
    fn test_template_suffix() {
        let (mut rollout, _) = rollout(None);
        assert_eq!(template_suffix(&rollout).unwrap(), "5f4e3d2c");
        rollout.metadata.uid = None;
        assert_matches!(template_suffix(&rollout), Err(Error::Internal(_)));
    }

    #[test]
    fn test_replace_replicas() {
        let (rollout_all, comp) = rollout(None);
        assert_eq!(replace_replicas(&rollout_all, &comp, &spec(3), 1).unwrap(), (3, 0));

        let (r, comp) = rollout(Some(IntOrString::String("100%".into())));
        assert_eq!(replace_replicas(&r, &comp, &spec(3), 1).unwrap(), (3, 3));

        let (r, comp) = rollout(Some(IntOrString::String("50%".into())));
        assert_matches!(
            replace_replicas(&r, &comp, &spec(3), 1),
            Err(Error::Validation(msg)) if msg.contains("partially")
        );

        let (r, comp) = rollout(Some(IntOrString::Int(4)));
        assert_matches!(
            replace_replicas(&r, &comp, &spec(3), 1),
            Err(Error::Validation(msg)) if msg.contains("out-of-range")
        );

        // the recorded original replicas win over the current spec
        let (mut r, comp) = rollout(Some(IntOrString::Int(3)));
        r.status = Some(RolloutStatus {
            components: vec![RolloutComponentStatus {
                name: "comp".into(),
                replicas: 3,
                ..Default::default()
            }],
            ..Default::default()
        });
        assert_eq!(replace_replicas(&r, &comp, &spec(4), 1).unwrap(), (3, 3));
    }

    #[test]
    fn test_sharding_replicas_per_shard() {
        let shard = Target::from(&RolloutSharding {
            name: "shard".into(),
            ..Default::default()
        });
        let mut r = Rollout::new("r1", RolloutSpec::default());
        assert_eq!(replace_replicas(&r, &shard, &spec(3), 2).unwrap(), (3, 0));

        // the status records the total over all shards
        r.status_mut().shardings.push(RolloutComponentStatus {
            name: "shard".into(),
            replicas: 6,
            ..Default::default()
        });
        assert_eq!(replace_replicas(&r, &shard, &spec(4), 2).unwrap(), (3, 0));
        assert_eq!(replace_replicas(&r, &shard, &spec(4), 0).unwrap(), (0, 0));
    }

    #[test]
    fn test_scaled_value_rounds_down() {
        assert_eq!(scaled_value(&IntOrString::String("34%".into()), 3), Ok(1));
        assert_eq!(scaled_value(&IntOrString::Int(2), 3), Ok(2));
        assert!(scaled_value(&IntOrString::String("two".into()), 3).is_err());
    }

    #[test]
    fn test_initial_templates() {
        let (_, comp) = rollout(None);
        let replace = RolloutStrategyReplace::default();
        let mut spec = spec(3);
        assert_eq!(
            initial_templates(&comp, &replace, &spec, "5f4e3d2c")
                .unwrap()
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>(),
            vec!["5f4e3d2c"]
        );

        spec.instances = vec![template("aaa", 1), template("bbb", 0)];
        assert_matches!(
            initial_templates(&comp, &replace, &spec, "5f4e3d2c"),
            Err(Error::Validation(msg)) if msg.contains("flatInstanceOrdinal")
        );

        spec.flat_instance_ordinal = true;
        let tpls = initial_templates(&comp, &replace, &spec, "5f4e3d2c").unwrap();
        assert_eq!(tpls.len(), 2);
        assert_eq!(tpls[0].name, "5f4e3d2c");
        assert_eq!(tpls[1].name, "aaa-5f4e3d2c");
        for tpl in &tpls {
            assert_eq!(tpl.replicas, Some(0));
            assert_eq!(tpl.service_version.as_deref(), Some("v2"));
            assert_eq!(tpl.annotations[TEMPLATE_CREATED_BY_ANNOTATION], "yes");
        }
    }

    #[test]
    fn test_new_template_scheduling_and_canary_meta() {
        let (_, comp) = rollout(None);
        let policy = SchedulingPolicy {
            node_selector: BTreeMap::from([("pool".to_string(), "canary".to_string())]),
            scheduler_name: Some("bin-packing".into()),
            ..Default::default()
        };
        let replace = RolloutStrategyReplace {
            scheduling_policy: Some(policy.clone()),
            instance_meta: Some(RolloutInstanceMeta {
                canary: Some(InstanceMetadata {
                    labels: BTreeMap::from([("track".to_string(), "canary".to_string())]),
                    annotations: BTreeMap::from([("note".to_string(), "new".to_string())]),
                }),
            }),
            ..Default::default()
        };
        let mut base = template("aaa", 2);
        base.labels.insert("tier".into(), "gold".into());
        base.labels.insert("track".into(), "stable".into());

        let tpl = new_template(&comp, &replace, "aaa-5f4e3d2c".into(), Some(&base));
        assert_eq!(tpl.name, "aaa-5f4e3d2c");
        assert_eq!(tpl.replicas, Some(0));
        assert_eq!(tpl.scheduling_policy, Some(policy));
        assert_eq!(tpl.labels["tier"], "gold");
        assert_eq!(tpl.labels["track"], "canary");
        assert_eq!(tpl.annotations["note"], "new");
        assert_eq!(tpl.annotations[TEMPLATE_CREATED_BY_ANNOTATION], "yes");

        // without a policy the base template keeps its own
        let mut placed = template("bbb", 1);
        placed.scheduling_policy = Some(SchedulingPolicy {
            node_name: Some("node-1".into()),
            ..Default::default()
        });
        let tpl = new_template(&comp, &RolloutStrategyReplace::default(), "x".into(), Some(&placed));
        assert_eq!(tpl.scheduling_policy, placed.scheduling_policy);
        assert!(tpl.labels.is_empty());
    }

    #[test]
    fn test_rollout_templates_keys() {
        let mut spec = spec(3);
        let mut created = template("aaa-5f4e3d2c", 2);
        created
            .annotations
            .insert(TEMPLATE_CREATED_BY_ANNOTATION.into(), "yes".into());
        spec.instances = vec![template("aaa", 1), template("5f4e3d2c", 1), created];

        let tpls = rollout_templates(&spec, "5f4e3d2c");
        assert_eq!(tpls, BTreeMap::from([(String::new(), 1), ("aaa".to_string(), 2)]));
        assert_eq!(template_replicas(&spec, &tpls), 3);

        assert_eq!(replaced_template_name(&spec.instances[0]), "aaa");
        assert_eq!(replaced_template_name(&spec.instances[2]), "aaa");
        assert_eq!(new_template_name(&spec.instances[2], "0a1b2c3d"), "aaa-0a1b2c3d");
    }

    fn stable_pod(name: &str, tpl: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.into());
        if let Some(tpl) = tpl {
            pod.labels_mut()
                .insert(INSTANCE_TEMPLATE_LABEL.into(), tpl.into());
        }
        pod
    }

    #[test]
    fn test_pick_instance() {
        let mut spec = spec(3);
        spec.instances = vec![template("aaa", 1)];
        let pods = vec![
            stable_pod("c1-comp-3", Some("5f4e3d2c")),
            stable_pod("c1-comp-2", Some("aaa")),
            stable_pod("c1-comp-1", None),
        ];
        assert_eq!(
            pick_instance(&pods, &spec, "5f4e3d2c").unwrap(),
            Some(("c1-comp-2".to_string(), Some(0)))
        );
        assert_eq!(
            pick_instance(&pods[2..], &spec, "5f4e3d2c").unwrap(),
            Some(("c1-comp-1".to_string(), None))
        );
        assert_eq!(pick_instance(&pods[..1], &spec, "5f4e3d2c").unwrap(), None);

        let unknown = vec![stable_pod("c1-comp-0", Some("zzz"))];
        assert_matches!(pick_instance(&unknown, &spec, "5f4e3d2c"), Err(Error::Internal(_)));
    }

    #[test]
    fn test_ordinal_sorting_key() {
        assert_eq!(ordinal("c1-comp-10"), Some(10));
        assert_eq!(ordinal("pod"), None);
        assert!(ordinal("c1-comp-10") > ordinal("c1-comp-9"));
    }

    #[test]
    fn test_check_delay() {
        let now = Utc::now();
        let replace = RolloutStrategyReplace {
            per_instance_interval_seconds: Some(60),
            scale_down_delay_seconds: Some(-1),
            ..Default::default()
        };
        let mut status = RolloutComponentStatus {
            name: "comp".into(),
            new_replicas: 1,
            rolled_out_replicas: 1,
            last_scale_down_timestamp: Some(now - chrono::Duration::seconds(20)),
            ..Default::default()
        };

        assert_matches!(
            check_delay(now, Some(&status), &replace, 1, true),
            Err(Error::Requeue { after, .. }) if after == INFINITE_DELAY_REQUEUE
        );
        assert_matches!(
            check_delay(now, Some(&status), &replace, 2, false),
            Err(Error::Requeue { reason, .. }) if reason == "stale down status"
        );
        assert_matches!(
            check_delay(now, Some(&status), &replace, 1, false),
            Err(Error::Requeue { after, .. }) if after == Duration::from_secs(40)
        );

        status.last_scale_down_timestamp = Some(now - chrono::Duration::seconds(61));
        assert!(check_delay(now, Some(&status), &replace, 1, false).is_ok());

        let no_delay = RolloutStrategyReplace::default();
        assert!(check_delay(now, None, &no_delay, 5, true).is_ok());
    }
}
