//! Reconciliation metrics
//!
//! Counters and a duration histogram labelled by reconciler name, exposed
//! through the registry on the metrics endpoint.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Prometheus default histogram buckets
const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Labels for reconciliation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResourceLabels {
    pub resource: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ResourceLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("resource", self.resource.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

pub struct Metrics {
    reconciliations: Family<ResourceLabels, Counter>,
    reconcile_success: Family<ResourceLabels, Counter>,
    reconcile_errors: Family<ResourceLabels, Counter>,
    reconcile_duration: Family<ResourceLabels, Histogram>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "pgrator_reconciliations",
            "Total number of reconciliations by resource type",
            reconciliations.clone(),
        );

        let reconcile_success = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "pgrator_reconcile_success",
            "Number of successful reconciles by resource type",
            reconcile_success.clone(),
        );

        let reconcile_errors = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "pgrator_reconcile_errors",
            "Number of reconcile errors by resource type",
            reconcile_errors.clone(),
        );

        let reconcile_duration = Family::<ResourceLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(DURATION_BUCKETS.into_iter())
        });
        registry.register(
            "pgrator_reconcile_duration_seconds",
            "Duration of reconciliations by resource type",
            reconcile_duration.clone(),
        );

        Self {
            reconciliations,
            reconcile_success,
            reconcile_errors,
            reconcile_duration,
            registry,
        }
    }

    fn labels(resource: &str) -> ResourceLabels {
        ResourceLabels {
            resource: resource.to_string(),
        }
    }

    pub fn inc_reconciliations(&self, resource: &str) {
        self.reconciliations
            .get_or_create(&Self::labels(resource))
            .inc();
    }

    pub fn inc_reconcile_success(&self, resource: &str) {
        self.reconcile_success
            .get_or_create(&Self::labels(resource))
            .inc();
    }

    pub fn inc_reconcile_errors(&self, resource: &str) {
        self.reconcile_errors
            .get_or_create(&Self::labels(resource))
            .inc();
    }

    pub fn observe_reconcile_duration(&self, resource: &str, duration_secs: f64) {
        self.reconcile_duration
            .get_or_create(&Self::labels(resource))
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return String::new();
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_expose_expected_names() {
        let metrics = Metrics::new();
        metrics.inc_reconciliations("postgres.data.nais.io");
        metrics.inc_reconcile_success("postgres.data.nais.io");
        metrics.inc_reconcile_errors("postgres.data.nais.io");
        metrics.observe_reconcile_duration("postgres.data.nais.io", 0.05);

        let output = metrics.encode();
        assert!(output.contains("pgrator_reconciliations_total"));
        assert!(output.contains("pgrator_reconcile_success_total"));
        assert!(output.contains("pgrator_reconcile_errors_total"));
        assert!(output.contains("pgrator_reconcile_duration_seconds"));
        assert!(output.contains("resource=\"postgres.data.nais.io\""));
    }
}
