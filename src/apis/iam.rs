//! Minimal model of the Config Connector `IAMPolicyMember` resource

use kube::core::object::Object;
use kube::core::ApiResource;
use serde::{Deserialize, Serialize};

pub type IamPolicyMember = Object<IamPolicyMemberSpec, IamPolicyMemberStatus>;

pub fn api_resource() -> ApiResource {
    ApiResource {
        group: "iam.cnrm.cloud.google.com".to_string(),
        version: "v1beta1".to_string(),
        api_version: "iam.cnrm.cloud.google.com/v1beta1".to_string(),
        kind: "IAMPolicyMember".to_string(),
        plural: "iampolicymembers".to_string(),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicyMemberSpec {
    pub member: String,

    pub role: String,

    pub resource_ref: ResourceRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,

    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicyMemberStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<IamCondition>,
}

/// Condition as reported by Config Connector
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IamCondition {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}
