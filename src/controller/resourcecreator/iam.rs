//! Builder for the workload-identity IAM binding

use crate::apis::iam::{self, IamPolicyMember, IamPolicyMemberSpec, ResourceRef};
use crate::config::Config;
use crate::controller::resourcecreator::objectmeta::{object_meta, set_annotation};
use crate::crd::Postgres;
use crate::namegen;

/// Namespace holding the managed IAM service accounts
pub const IAM_SERVICE_ACCOUNT_NAMESPACE: &str = "serviceaccounts";

pub const PROJECT_ID_ANNOTATION: &str = "cnrm.cloud.google.com/project-id";

pub const PROJECT_ROLE: &str = "roles/iam.workloadIdentityUser";

/// Kubernetes DNS label length limit
const DNS_LABEL_MAX_LENGTH: usize = 63;

/// Binding object carrying only identity
pub fn minimal_iam_policy_member(owner: &Postgres, pg_namespace: &str) -> IamPolicyMember {
    let mut meta = object_meta(owner);
    meta.name = Some(namegen::suffixed_short_name(
        pg_namespace,
        "postgres-pod",
        DNS_LABEL_MAX_LENGTH,
    ));
    meta.namespace = Some(IAM_SERVICE_ACCOUNT_NAMESPACE.to_string());

    let mut member = IamPolicyMember::new(
        meta.name.as_deref().unwrap_or_default(),
        &iam::api_resource(),
        IamPolicyMemberSpec::default(),
    );
    member.metadata = meta;
    member
}

/// Bind the workload-identity user role to the cluster pods
pub fn create_iam_policy_member(
    owner: &Postgres,
    config: &Config,
    pg_namespace: &str,
) -> IamPolicyMember {
    let mut member = minimal_iam_policy_member(owner, pg_namespace);

    member.spec = IamPolicyMemberSpec {
        member: format!(
            "serviceAccount:{}.svc.id.goog[{}/postgres-pod]",
            config.google_project_id, pg_namespace
        ),
        role: PROJECT_ROLE.to_string(),
        resource_ref: ResourceRef {
            api_version: "iam.cnrm.cloud.google.com/v1beta1".to_string(),
            kind: "IAMServiceAccount".to_string(),
            name: Some("postgres-pod".to_string()),
        },
    };
    set_annotation(
        &mut member.metadata,
        PROJECT_ID_ANNOTATION,
        &config.google_project_id,
    );

    member
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ClusterResources, ClusterSpec, PostgresSpec};

    fn postgres() -> Postgres {
        let mut pg = Postgres::new(
            "db",
            PostgresSpec {
                cluster: ClusterSpec {
                    major_version: "17".to_string(),
                    resources: ClusterResources {
                        cpu: "1".to_string(),
                        memory: "1G".to_string(),
                        disk_size: "1G".to_string(),
                    },
                    high_availability: false,
                    allow_deletion: true,
                    audit: None,
                },
                maintenance_window: None,
                database: None,
            },
        );
        pg.metadata.namespace = Some("default".to_string());
        pg
    }

    fn config() -> Config {
        Config {
            google_project_id: "example-project".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn member_binds_workload_identity() {
        let member = create_iam_policy_member(&postgres(), &config(), "pg-default");
        assert_eq!(
            member.spec.member,
            "serviceAccount:example-project.svc.id.goog[pg-default/postgres-pod]"
        );
        assert_eq!(member.spec.role, PROJECT_ROLE);
        assert_eq!(member.spec.resource_ref.kind, "IAMServiceAccount");
    }

    #[test]
    fn member_lives_in_service_account_namespace() {
        let member = create_iam_policy_member(&postgres(), &config(), "pg-default");
        assert_eq!(
            member.metadata.namespace.as_deref(),
            Some(IAM_SERVICE_ACCOUNT_NAMESPACE)
        );
        assert_eq!(
            member.metadata.name.as_deref(),
            Some("pg-default-postgres-pod")
        );
    }

    #[test]
    fn project_id_annotation_is_set() {
        let member = create_iam_policy_member(&postgres(), &config(), "pg-default");
        assert_eq!(
            member
                .metadata
                .annotations
                .unwrap()
                .get(PROJECT_ID_ANNOTATION),
            Some(&"example-project".to_string())
        );
    }

    #[test]
    fn long_namespaces_shorten_to_dns_label() {
        let pg_namespace = format!("pg-{}", "n".repeat(70));
        let member = create_iam_policy_member(&postgres(), &config(), &pg_namespace);
        let name = member.metadata.name.unwrap();
        assert!(name.len() <= 63);
        assert!(name.ends_with("-postgres-pod"));
    }
}
