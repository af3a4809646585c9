//! Minimal model of the zalando `postgresql.acid.zalan.do/v1` resource
//!
//! Only the fields this operator sets or reads are modelled. The resource
//! is applied through the dynamic API, so no schema is generated for it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::NodeAffinity;
use kube::core::object::Object;
use kube::core::ApiResource;
use serde::{Deserialize, Serialize};

/// Typed view of a zalando postgresql cluster
pub type Postgresql = Object<PostgresqlSpec, PostgresqlStatus>;

/// Descriptor for the zalando postgresql kind
///
/// The kind is lowercase on the wire, as published by the zalando operator.
pub fn api_resource() -> ApiResource {
    ApiResource {
        group: "acid.zalan.do".to_string(),
        version: "v1".to_string(),
        api_version: "acid.zalan.do/v1".to_string(),
        kind: "postgresql".to_string(),
        plural: "postgresqls".to_string(),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_connection_pooler: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_replica_connection_pooler: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_pooler: Option<ConnectionPooler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,

    pub postgresql: PostgresqlParam,

    pub volume: Volume,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patroni: Option<Patroni>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    pub team_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image: String,

    pub number_of_instances: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintenance_windows: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prepared_databases: BTreeMap<String, PreparedDatabase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spilo_run_as_user: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spilo_run_as_group: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "spiloFSGroup")]
    pub spilo_fs_group: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPooler {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PostgresqlParam {
    /// PostgreSQL major version
    pub version: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Patroni {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initdb: BTreeMap<String, String>,

    #[serde(default)]
    pub synchronous_mode: bool,

    #[serde(default)]
    pub synchronous_mode_strict: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceDescription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceDescription>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ResourceDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreparedDatabase {
    #[serde(default)]
    pub default_users: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", rename = "schemas")]
    pub prepared_schemas: BTreeMap<String, PreparedSchema>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreparedSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_users: Option<bool>,
}

/// Status reported by the zalando operator
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PostgresqlStatus {
    #[serde(default, rename = "PostgresClusterStatus")]
    pub postgres_cluster_status: String,
}

impl PostgresqlStatus {
    /// Whether the cluster is in a healthy or progressing state
    pub fn success(&self) -> bool {
        !(self.postgres_cluster_status.ends_with("Failed")
            || self.postgres_cluster_status == "Invalid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_success_classification() {
        for status in ["Running", "Creating", "Updating", ""] {
            let s = PostgresqlStatus {
                postgres_cluster_status: status.to_string(),
            };
            assert!(s.success(), "{status} should be success");
        }
        for status in ["CreateFailed", "UpdateFailed", "SyncFailed", "Invalid"] {
            let s = PostgresqlStatus {
                postgres_cluster_status: status.to_string(),
            };
            assert!(!s.success(), "{status} should not be success");
        }
    }

    #[test]
    fn spec_serializes_zalando_field_names() {
        let spec = PostgresqlSpec {
            postgresql: PostgresqlParam {
                version: "17".to_string(),
                parameters: BTreeMap::new(),
            },
            volume: Volume {
                size: "1G".to_string(),
                storage_class: None,
            },
            team_id: "default".to_string(),
            number_of_instances: 2,
            spilo_fs_group: Some(103),
            ..Default::default()
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["postgresql"]["version"], "17");
        assert_eq!(value["teamId"], "default");
        assert_eq!(value["numberOfInstances"], 2);
        assert_eq!(value["spiloFSGroup"], 103);
    }
}
