//! Configuration from the environment

use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Directory holding tls.crt and tls.key for the metrics server
    pub metrics_cert_path: Option<String>,

    /// Google project the IAM bindings live in
    pub google_project_id: String,

    /// Storage class for the cluster data volumes
    pub postgres_storage_class: Option<String>,

    /// Spilo image for the clusters
    pub postgres_image: String,

    /// Log planned actions without mutating the cluster
    pub dry_run: bool,

    /// Skip creation of PrometheusRule resources
    pub prometheus_rules_disabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            metrics_cert_path: env_opt("METRICS_CERT_PATH"),
            google_project_id: env_opt("GOOGLE_PROJECT_ID").unwrap_or_default(),
            postgres_storage_class: env_opt("POSTGRES_STORAGE_CLASS"),
            postgres_image: env_opt("POSTGRES_IMAGE").unwrap_or_default(),
            dry_run: env_bool("DRY_RUN"),
            prometheus_rules_disabled: env_bool("PROMETHEUS_RULES_DISABLED"),
        }
    }

    /// Log the effective configuration at startup
    pub fn log(&self) {
        info!("MetricsCertPath: {:?}", self.metrics_cert_path);
        info!("GoogleProjectID: {}", self.google_project_id);
        info!("PostgresStorageClass: {:?}", self.postgres_storage_class);
        info!("PostgresImage: {}", self.postgres_image);
        info!("DryRun: {}", self.dry_run);
        info!("PrometheusRulesDisabled: {}", self.prometheus_rules_disabled);
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
