//! Template builders for the dependent resources
//!
//! Pure functions from the Postgres spec to dependent objects. The
//! synchronizer never sees these; the reconciler wraps their output in
//! actions.

pub mod iam;
pub mod netpol;
pub mod objectmeta;
pub mod postgres;
pub mod prometheusrule;

pub use iam::{create_iam_policy_member, minimal_iam_policy_member};
pub use netpol::{create_network_policy, minimal_netpol};
pub use objectmeta::{object_meta, set_annotation};
pub use postgres::{create_cluster, minimal_cluster};
pub use prometheusrule::{create_prometheus_rule, minimal_prometheus_rule};
