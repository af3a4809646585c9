//! Builder for the cluster's alert rules

use std::collections::BTreeMap;

use crate::apis::monitoring::{
    self, PrometheusRule, PrometheusRuleSpec, Rule, RuleGroup,
};
use crate::controller::resourcecreator::objectmeta::object_meta;
use crate::crd::Postgres;

/// Rule object carrying only identity, used on the delete path
///
/// Lives in the owner's namespace so the team's prometheus picks it up.
pub fn minimal_prometheus_rule(owner: &Postgres, cluster_name: &str) -> PrometheusRule {
    let mut meta = object_meta(owner);
    meta.name = Some(format!("pg-{cluster_name}"));

    let mut rule = PrometheusRule::new(
        meta.name.as_deref().unwrap_or_default(),
        &monitoring::api_resource(),
        PrometheusRuleSpec::default(),
    );
    rule.metadata = meta;
    rule
}

/// Alert rules covering resource exhaustion and cluster availability
pub fn create_prometheus_rule(
    owner: &Postgres,
    cluster_name: &str,
    pg_namespace: &str,
) -> PrometheusRule {
    let mut rule = minimal_prometheus_rule(owner, cluster_name);

    let pod_pattern = format!("pod=~\"{cluster_name}-[0-9]\"");
    let namespace_label = format!("namespace=\"{pg_namespace}\"");
    let pvc_pattern = format!("persistentvolumeclaim=~\"pgdata-{cluster_name}-[0-9]\"");

    rule.spec = PrometheusRuleSpec {
        groups: vec![RuleGroup {
            name: format!("{cluster_name}-rules"),
            rules: vec![
                Rule {
                    alert: Some("PostgresMemoryUsageHigh".to_string()),
                    expr: ratio_query(
                        &single_query(
                            "container_memory_usage_bytes",
                            "pod",
                            &["container=\"postgres\"", &namespace_label, &pod_pattern],
                            false,
                        ),
                        &single_query(
                            "kube_pod_container_resource_limits",
                            "pod",
                            &[
                                "container=\"postgres\"",
                                &namespace_label,
                                &pod_pattern,
                                "resource=\"memory\"",
                            ],
                            false,
                        ),
                        "> 0.9",
                    ),
                    for_: Some("5m".to_string()),
                    labels: severity("warning"),
                    annotations: annotations(
                        "PostgreSQL memory usage is high",
                        &format!("Memory usage for PostgreSQL instance {cluster_name} is above 90%."),
                        "Increase requested resources",
                    ),
                },
                Rule {
                    alert: Some("PostgresCpuUsageHigh".to_string()),
                    expr: ratio_query(
                        &single_query(
                            "container_cpu_usage_seconds_total",
                            "pod",
                            &["container=\"postgres\"", &namespace_label, &pod_pattern],
                            true,
                        ),
                        &single_query(
                            "kube_pod_container_resource_limits",
                            "pod",
                            &[
                                "container=\"postgres\"",
                                &namespace_label,
                                &pod_pattern,
                                "resource=\"cpu\"",
                            ],
                            false,
                        ),
                        "> 0.9",
                    ),
                    for_: Some("5m".to_string()),
                    labels: severity("warning"),
                    annotations: annotations(
                        "PostgreSQL CPU usage is high",
                        &format!("CPU usage for PostgreSQL instance {cluster_name} is above 90%."),
                        "Increase requested resources",
                    ),
                },
                Rule {
                    alert: Some("PostgresDiskIsFull".to_string()),
                    expr: ratio_query(
                        &single_query(
                            "kubelet_volume_stats_used_bytes",
                            "persistentvolumeclaim",
                            &[&namespace_label, &pvc_pattern],
                            false,
                        ),
                        &single_query(
                            "kubelet_volume_stats_capacity_bytes",
                            "persistentvolumeclaim",
                            &[&namespace_label, &pvc_pattern],
                            false,
                        ),
                        "> 0.99",
                    ),
                    for_: Some("5m".to_string()),
                    labels: severity("critical"),
                    annotations: annotations(
                        "PostgreSQL Disk is full",
                        &format!("Disk for PostgreSQL instance {cluster_name} is full."),
                        "Increase requested resources",
                    ),
                },
                Rule {
                    alert: Some("PostgresDiskUsageHigh".to_string()),
                    expr: ratio_query(
                        &single_query(
                            "kubelet_volume_stats_used_bytes",
                            "persistentvolumeclaim",
                            &[&namespace_label, &pvc_pattern],
                            false,
                        ),
                        &single_query(
                            "kubelet_volume_stats_capacity_bytes",
                            "persistentvolumeclaim",
                            &[&namespace_label, &pvc_pattern],
                            false,
                        ),
                        "> 0.9",
                    ),
                    for_: Some("5m".to_string()),
                    labels: severity("warning"),
                    annotations: annotations(
                        "PostgreSQL Disk usage is high",
                        &format!("Disk usage for PostgreSQL instance {cluster_name} is above 90%."),
                        "Increase requested resources",
                    ),
                },
                Rule {
                    alert: Some("ClusterIsDown".to_string()),
                    expr: format!(
                        "sum(up{{namespace=\"{pg_namespace}\", pod=~\"{cluster_name}-[0-9]\"}}) < 1"
                    ),
                    for_: Some("5m".to_string()),
                    labels: severity("critical"),
                    annotations: annotations(
                        "PostgreSQL cluster is down",
                        &format!("The PostgreSQL instance {cluster_name} is down."),
                        "Investigate causes",
                    ),
                },
                Rule {
                    alert: Some("MissingClusterInstance".to_string()),
                    expr: format!(
                        "sum(up{{namespace=\"{pg_namespace}\", pod=~\"{cluster_name}-[0-9]\"}}) < 2"
                    ),
                    for_: Some("10m".to_string()),
                    labels: severity("warning"),
                    annotations: annotations(
                        "PostgreSQL cluster is missing pods",
                        &format!("The PostgreSQL instance {cluster_name} has only 1 live pod."),
                        "Investigate causes",
                    ),
                },
            ],
        }],
    };

    rule
}

fn ratio_query(numerator: &str, denominator: &str, limit: &str) -> String {
    format!("({numerator} / {denominator}) {limit}")
}

fn single_query(metric: &str, group_by: &str, labels: &[&str], rate: bool) -> String {
    let mut query = format!("{metric}{{{}}}", labels.join(", "));
    if rate {
        query = format!("rate({query}[5m])");
    }
    format!("avg({query}) by ({group_by})")
}

fn severity(level: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("severity".to_string(), level.to_string())])
}

fn annotations(summary: &str, description: &str, action: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("summary".to_string(), summary.to_string()),
        ("description".to_string(), description.to_string()),
        ("action".to_string(), action.to_string()),
    ])
}
