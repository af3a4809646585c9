//! Builder for the cluster's network isolation policy

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

use crate::controller::resourcecreator::objectmeta::{object_meta, set_annotation};
use crate::controller::resourcecreator::postgres::ALLOW_DELETION_ANNOTATION;
use crate::crd::Postgres;

/// Policy object carrying only identity, used on the delete path
pub fn minimal_netpol(owner: &Postgres, cluster_name: &str, namespace: &str) -> NetworkPolicy {
    let mut meta = object_meta(owner);
    meta.name = Some(cluster_name.to_string());
    meta.namespace = Some(namespace.to_string());

    if owner.spec.cluster.allow_deletion {
        set_annotation(&mut meta, ALLOW_DELETION_ANNOTATION, cluster_name);
    }

    NetworkPolicy {
        metadata: meta,
        ..Default::default()
    }
}

/// Isolation policy for the cluster pods
///
/// Permits intra-cluster replication, the connection pooler, the zalando
/// operator and prometheus from the system namespace, and the owning
/// application from its own namespace. Everything else is cut off.
pub fn create_network_policy(
    owner: &Postgres,
    cluster_name: &str,
    namespace: &str,
) -> NetworkPolicy {
    let mut netpol = minimal_netpol(owner, cluster_name, namespace);

    let spilo_pods = labels(&[("application", "spilo"), ("app", &owner.name_any())]);

    netpol.spec = Some(NetworkPolicySpec {
        pod_selector: spilo_pods.clone(),
        egress: Some(vec![NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                pod_selector: Some(spilo_pods.clone()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
        ingress: Some(vec![
            NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(spilo_pods),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(labels(&[
                        ("application", "db-connection-pooler"),
                        ("app", &owner.name_any()),
                    ])),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(labels(&[(
                        "kubernetes.io/metadata.name",
                        "nais-system",
                    )])),
                    pod_selector: Some(labels(&[(
                        "app.kubernetes.io/name",
                        "postgres-operator",
                    )])),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(labels(&[(
                        "kubernetes.io/metadata.name",
                        "nais-system",
                    )])),
                    pod_selector: Some(labels(&[("app.kubernetes.io/name", "prometheus")])),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(labels(&[(
                        "kubernetes.io/metadata.name",
                        &owner.namespace().unwrap_or_default(),
                    )])),
                    pod_selector: Some(labels(&[("app", &owner.name_any())])),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        ]),
        policy_types: Some(vec!["Egress".to_string(), "Ingress".to_string()]),
    });

    netpol
}

fn labels(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}
