use std::collections::BTreeMap;

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation carrying the correlation id threaded through events and status
pub const CORRELATION_ID_ANNOTATION: &str = "nais.io/deploymentCorrelationID";

/// Postgres is the Schema for the postgreses API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "data.nais.io",
    version = "v1",
    kind = "Postgres",
    plural = "postgreses",
    shortname = "pg",
    namespaced,
    status = "PostgresStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.cluster.majorVersion"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.reconcilePhase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    /// PostgreSQL cluster shape and lifecycle settings
    pub cluster: ClusterSpec,

    /// Preferred window for disruptive maintenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<MaintenanceWindow>,

    /// Database-level settings (extensions, collation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,
}

/// Cluster-level configuration for the backing PostgreSQL cluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// PostgreSQL major version (e.g., "16", "17")
    pub major_version: String,

    /// Compute and storage resources for each cluster member
    pub resources: ClusterResources,

    /// Run three instances instead of two
    #[serde(default)]
    pub high_availability: bool,

    /// Guard flag: deletion of the Postgres resource only tears down the
    /// cluster when this is true
    #[serde(default)]
    pub allow_deletion: bool,

    /// Statement auditing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditSpec>,
}

/// Resource requests for the PostgreSQL pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResources {
    /// CPU request quantity (e.g., "500m", "2")
    pub cpu: String,

    /// Memory request quantity (e.g., "1G", "4Gi")
    pub memory: String,

    /// Size of the data volume (e.g., "10Gi")
    pub disk_size: String,
}

/// Audit logging configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditSpec {
    /// Enable pgaudit logging
    #[serde(default)]
    pub enabled: bool,

    /// Statement classes to audit; defaults to write, ddl and role
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statement_classes: Vec<String>,
}

/// Weekly maintenance window
///
/// `day` is Mon 1-7 Sun, with 0 meaning every day.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    #[serde(default)]
    pub day: u8,

    /// Starting hour of the one hour window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
}

/// Database settings applied to the prepared database
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Collation locale, combined with UTF-8 (e.g., "nb_NO")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,

    /// Extensions enabled in the default schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    pub name: String,
}

/// Status written by the synchronizer
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresStatus {
    /// Time of the most recent reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_time: Option<String>,

    /// Generation most recently observed by the synchronizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Correlation id of the change that triggered the reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Phase the reconciliation last entered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_phase: Option<ReconcilePhase>,

    /// Outcome of the most recent reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_status: Option<RolloutStatus>,

    /// Consecutive failed reconciliations, cleared on success
    ///
    /// Drives the escalating retry delay between reconcile attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,

    /// Conditions aggregated from the dependent resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Reconciliation phase
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum ReconcilePhase {
    Preparing,
    Updating,
    Deleting,
    DetectingUnreferenced,
    PerformingActions,
    Completed,
    Error,
}

impl std::fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcilePhase::Preparing => write!(f, "Preparing"),
            ReconcilePhase::Updating => write!(f, "Updating"),
            ReconcilePhase::Deleting => write!(f, "Deleting"),
            ReconcilePhase::DetectingUnreferenced => write!(f, "DetectingUnreferenced"),
            ReconcilePhase::PerformingActions => write!(f, "PerformingActions"),
            ReconcilePhase::Completed => write!(f, "Completed"),
            ReconcilePhase::Error => write!(f, "Error"),
        }
    }
}

/// Rollout outcome
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum RolloutStatus {
    Succeeded,
    Failed,
}

/// Kubernetes-style condition on the Postgres status
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, prefixed with the dependent's group-kind
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Owner generation observed when the condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Postgres {
    /// Correlation id from the deployment annotation, empty when absent
    pub fn correlation_id(&self) -> String {
        self.annotations()
            .get(CORRELATION_ID_ANNOTATION)
            .cloned()
            .unwrap_or_default()
    }

    /// User labels merged into dependent resources
    pub fn propagated_labels(&self) -> BTreeMap<String, String> {
        self.labels().clone()
    }
}
