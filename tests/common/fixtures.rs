//! Builders for test resources

use std::collections::BTreeMap;

use pgrator::crd::{
    ClusterResources, ClusterSpec, Postgres, PostgresSpec, CORRELATION_ID_ANNOTATION,
};

/// A Postgres resource as a user would apply it
pub fn make_postgres(name: &str, namespace: &str, allow_deletion: bool) -> Postgres {
    let mut postgres = Postgres::new(
        name,
        PostgresSpec {
            cluster: ClusterSpec {
                major_version: "17".to_string(),
                resources: ClusterResources {
                    cpu: "1".to_string(),
                    memory: "1G".to_string(),
                    disk_size: "1G".to_string(),
                },
                high_availability: false,
                allow_deletion,
                audit: None,
            },
            maintenance_window: None,
            database: None,
        },
    );
    postgres.metadata.namespace = Some(namespace.to_string());
    postgres.metadata.generation = Some(1);
    postgres.metadata.uid = Some("test-uid-12345".to_string());
    postgres
}

/// Stamp a correlation id the way a deployment pipeline would
pub fn with_correlation_id(mut postgres: Postgres, correlation_id: &str) -> Postgres {
    postgres
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            CORRELATION_ID_ANNOTATION.to_string(),
            correlation_id.to_string(),
        );
    postgres
}
