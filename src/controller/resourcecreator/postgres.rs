//! Builder for the zalando postgresql cluster resource

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};

use crate::apis::postgresql::{
    self, ConnectionPooler, Patroni, Postgresql, PostgresqlParam, PostgresqlSpec,
    PreparedDatabase, PreparedSchema, ResourceDescription, Resources, Volume,
};
use crate::config::Config;
use crate::controller::resourcecreator::objectmeta::{object_meta, set_annotation, set_label};
use crate::crd::Postgres;
use crate::synchronizer::error::{Error, Result};

const CPU_LIMIT_FACTOR: u64 = 4;

/// Annotation the zalando operator requires before it deletes a cluster
pub const ALLOW_DELETION_ANNOTATION: &str = "nais.io/postgresqlDeleteResource";

const DEFAULT_NUM_INSTANCES: i32 = 2;
const HA_NUM_INSTANCES: i32 = 3;

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_DATABASE_NAME: &str = "app";

const SHARED_PRELOAD_LIBRARIES: &str =
    "bg_mon,pg_stat_statements,pgextwlist,pg_auth_mon,set_user,timescaledb,pg_cron,pg_stat_kcache,pgaudit";

const RUN_AS_USER: i64 = 101;
const RUN_AS_GROUP: i64 = 103;
const FS_GROUP: i64 = 103;

const DEFAULT_EXTENSIONS: [&str; 1] = ["pgaudit"];

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Cluster object carrying only identity, used on the delete path
pub fn minimal_cluster(owner: &Postgres, cluster_name: &str, namespace: &str) -> Postgresql {
    let mut meta = object_meta(owner);
    meta.name = Some(cluster_name.to_string());
    meta.namespace = Some(namespace.to_string());
    set_label(&mut meta, "apiserver-access", "enabled");

    if owner.spec.cluster.allow_deletion {
        set_annotation(&mut meta, ALLOW_DELETION_ANNOTATION, cluster_name);
    }

    let mut cluster = Postgresql::new(cluster_name, &postgresql::api_resource(), PostgresqlSpec::default());
    cluster.metadata = meta;
    cluster
}

/// Full desired state of the zalando cluster
pub fn create_cluster(
    owner: &Postgres,
    config: &Config,
    cluster_name: &str,
    namespace: &str,
) -> Result<Postgresql> {
    let mut cluster = minimal_cluster(owner, cluster_name, namespace);

    let cpu = owner.spec.cluster.resources.cpu.as_str();
    let cpu_limit = multiply_quantity(cpu, CPU_LIMIT_FACTOR)?;

    let number_of_instances = if owner.spec.cluster.high_availability {
        HA_NUM_INSTANCES
    } else {
        DEFAULT_NUM_INSTANCES
    };

    let mut extensions = BTreeMap::new();
    if let Some(database) = &owner.spec.database {
        for extension in &database.extensions {
            extensions.insert(extension.name.clone(), DEFAULT_SCHEMA.to_string());
        }
    }
    for extension in DEFAULT_EXTENSIONS {
        extensions.insert(extension.to_string(), DEFAULT_SCHEMA.to_string());
    }

    let collation = owner
        .spec
        .database
        .as_ref()
        .and_then(|d| d.collation.as_deref())
        .map(|c| format!("{c}.UTF-8"))
        .unwrap_or_else(|| "en_US.UTF-8".to_string());

    cluster.spec = PostgresqlSpec {
        enable_connection_pooler: Some(true),
        enable_replica_connection_pooler: Some(false),
        connection_pooler: Some(ConnectionPooler {
            resources: Some(Resources {
                requests: Some(ResourceDescription {
                    cpu: Some("50m".to_string()),
                    memory: Some("50Mi".to_string()),
                }),
                limits: None,
            }),
        }),
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: "nais.io/type".to_string(),
                        operator: "In".to_string(),
                        values: Some(vec!["postgres".to_string()]),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        postgresql: PostgresqlParam {
            version: owner.spec.cluster.major_version.clone(),
            parameters: postgres_parameters(owner),
        },
        volume: Volume {
            size: owner.spec.cluster.resources.disk_size.clone(),
            storage_class: config.postgres_storage_class.clone(),
        },
        patroni: Some(Patroni {
            initdb: BTreeMap::from([
                ("encoding".to_string(), "UTF8".to_string()),
                ("locale".to_string(), collation),
            ]),
            synchronous_mode: true,
            synchronous_mode_strict: true,
        }),
        resources: Some(Resources {
            requests: Some(ResourceDescription {
                cpu: Some(cpu.to_string()),
                memory: Some(owner.spec.cluster.resources.memory.clone()),
            }),
            limits: Some(ResourceDescription {
                cpu: Some(cpu_limit),
                memory: Some(owner.spec.cluster.resources.memory.clone()),
            }),
        }),
        team_id: owner.metadata.namespace.clone().unwrap_or_default(),
        docker_image: config.postgres_image.clone(),
        number_of_instances,
        maintenance_windows: maintenance_windows(owner),
        prepared_databases: BTreeMap::from([(
            DEFAULT_DATABASE_NAME.to_string(),
            PreparedDatabase {
                default_users: true,
                extensions,
                secret_namespace: owner.metadata.namespace.clone().unwrap_or_default(),
                prepared_schemas: BTreeMap::from([(
                    DEFAULT_SCHEMA.to_string(),
                    PreparedSchema::default(),
                )]),
            },
        )]),
        spilo_run_as_user: Some(RUN_AS_USER),
        spilo_run_as_group: Some(RUN_AS_GROUP),
        spilo_fs_group: Some(FS_GROUP),
    };

    Ok(cluster)
}

fn postgres_parameters(owner: &Postgres) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::from([
        ("log_destination".to_string(), "jsonlog".to_string()),
        ("log_filename".to_string(), "postgresql.log".to_string()),
        (
            "shared_preload_libraries".to_string(),
            SHARED_PRELOAD_LIBRARIES.to_string(),
        ),
        ("pg_stat_statements.track".to_string(), "all".to_string()),
        ("track_io_timing".to_string(), "on".to_string()),
    ]);

    if let Some(audit) = &owner.spec.cluster.audit {
        if audit.enabled {
            let classes = if audit.statement_classes.is_empty() {
                "write,ddl,role".to_string()
            } else {
                audit.statement_classes.join(",")
            };
            parameters.insert("pgaudit.log".to_string(), classes);
            parameters.insert("pgaudit.log_parameter".to_string(), "on".to_string());
        }
    }

    parameters
}

/// Maintenance windows in the zalando wire format
///
/// Day is Mon 1-7 Sun with 0 meaning every day; zalando takes
/// `HH:MM-HH:MM` for daily windows and `Ddd:HH:MM-HH:MM` for weekly ones.
fn maintenance_windows(owner: &Postgres) -> Vec<String> {
    let Some(window) = &owner.spec.maintenance_window else {
        return Vec::new();
    };
    let Some(hour) = window.hour else {
        return Vec::new();
    };

    let start = u32::from(hour) % 24;
    let end = (start + 1) % 24;
    let times = format!("{start:02}:00-{end:02}:00");

    if window.day == 0 {
        vec![times]
    } else {
        let weekday = WEEKDAYS[usize::from(window.day) % 7];
        vec![format!("{weekday}:{times}")]
    }
}

/// Multiply a Kubernetes cpu quantity by an integer factor
fn multiply_quantity(quantity: &str, factor: u64) -> Result<String> {
    if let Some(millis) = quantity.strip_suffix('m') {
        let value: u64 = millis
            .parse()
            .map_err(|_| Error::Plan(format!("invalid cpu quantity {quantity:?}")))?;
        return Ok(format!("{}m", value * factor));
    }

    let value: f64 = quantity
        .parse()
        .map_err(|_| Error::Plan(format!("invalid cpu quantity {quantity:?}")))?;
    let result = value * factor as f64;
    if result.fract() == 0.0 {
        Ok(format!("{}", result as u64))
    } else {
        Ok(format!("{result}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        AuditSpec, ClusterResources, ClusterSpec, MaintenanceWindow, PostgresSpec,
    };

    fn postgres(high_availability: bool) -> Postgres {
        Postgres::new(
            "db",
            PostgresSpec {
                cluster: ClusterSpec {
                    major_version: "17".to_string(),
                    resources: ClusterResources {
                        cpu: "1".to_string(),
                        memory: "1G".to_string(),
                        disk_size: "1G".to_string(),
                    },
                    high_availability,
                    allow_deletion: false,
                    audit: None,
                },
                maintenance_window: None,
                database: None,
            },
        )
    }

    fn in_namespace(mut pg: Postgres, namespace: &str) -> Postgres {
        pg.metadata.namespace = Some(namespace.to_string());
        pg
    }

    #[test]
    fn cluster_carries_version_and_resources() {
        let pg = in_namespace(postgres(false), "default");
        let config = Config::default();
        let cluster = create_cluster(&pg, &config, "db", "pg-default").unwrap();

        assert_eq!(cluster.spec.postgresql.version, "17");
        assert_eq!(cluster.spec.volume.size, "1G");
        assert_eq!(cluster.spec.team_id, "default");
        assert_eq!(cluster.spec.number_of_instances, 2);

        let resources = cluster.spec.resources.unwrap();
        assert_eq!(resources.requests.unwrap().cpu.as_deref(), Some("1"));
        assert_eq!(resources.limits.unwrap().cpu.as_deref(), Some("4"));
    }

    #[test]
    fn high_availability_runs_three_instances() {
        let pg = in_namespace(postgres(true), "default");
        let cluster = create_cluster(&pg, &Config::default(), "db", "pg-default").unwrap();
        assert_eq!(cluster.spec.number_of_instances, 3);
    }

    #[test]
    fn audit_enables_pgaudit_parameters() {
        let mut pg = in_namespace(postgres(false), "default");
        pg.spec.cluster.audit = Some(AuditSpec {
            enabled: true,
            statement_classes: vec![],
        });
        let cluster = create_cluster(&pg, &Config::default(), "db", "pg-default").unwrap();
        assert_eq!(
            cluster.spec.postgresql.parameters.get("pgaudit.log"),
            Some(&"write,ddl,role".to_string())
        );
    }

    #[test]
    fn default_extension_is_always_prepared() {
        let pg = in_namespace(postgres(false), "default");
        let cluster = create_cluster(&pg, &Config::default(), "db", "pg-default").unwrap();
        let prepared = cluster.spec.prepared_databases.get("app").unwrap();
        assert_eq!(prepared.extensions.get("pgaudit"), Some(&"public".to_string()));
        assert_eq!(prepared.secret_namespace, "default");
    }

    #[test]
    fn weekly_maintenance_window_format() {
        let mut pg = in_namespace(postgres(false), "default");
        pg.spec.maintenance_window = Some(MaintenanceWindow {
            day: 2,
            hour: Some(1),
        });
        let cluster = create_cluster(&pg, &Config::default(), "db", "pg-default").unwrap();
        assert_eq!(cluster.spec.maintenance_windows, vec!["Tue:01:00-02:00"]);
    }

    #[test]
    fn daily_maintenance_window_format() {
        let mut pg = in_namespace(postgres(false), "default");
        pg.spec.maintenance_window = Some(MaintenanceWindow {
            day: 0,
            hour: Some(23),
        });
        let cluster = create_cluster(&pg, &Config::default(), "db", "pg-default").unwrap();
        assert_eq!(cluster.spec.maintenance_windows, vec!["23:00-00:00"]);
    }

    #[test]
    fn allow_deletion_sets_zalando_annotation() {
        let mut pg = in_namespace(postgres(false), "default");
        pg.spec.cluster.allow_deletion = true;
        let cluster = minimal_cluster(&pg, "db", "pg-default");
        assert_eq!(
            cluster
                .metadata
                .annotations
                .unwrap()
                .get(ALLOW_DELETION_ANNOTATION),
            Some(&"db".to_string())
        );
    }

    #[test]
    fn cpu_quantities_multiply() {
        assert_eq!(multiply_quantity("500m", 4).unwrap(), "2000m");
        assert_eq!(multiply_quantity("1", 4).unwrap(), "4");
        assert_eq!(multiply_quantity("0.5", 4).unwrap(), "2");
        assert!(multiply_quantity("chunky", 4).is_err());
    }
}
