//! OpenTelemetry OTLP metrics exporter.
//!
//! Records runtime metrics as OpenTelemetry gauge instruments and exports
//! them via gRPC or HTTP to any OTLP-compatible collector (e.g. Prometheus,
//! Grafana Alloy, Datadog, New Relic).

use super::{MetricsError, MetricsExporter, MetricsSnapshot, OtlpConfig, OtlpProtocol};
use async_trait::async_trait;
use opentelemetry::metrics::{Gauge, MeterProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;

/// Holds all OpenTelemetry gauge instruments.
struct Instruments {
    // Bus
    bus_messages_published: Gauge<f64>,
    bus_messages_delivered: Gauge<f64>,
    bus_messages_acked: Gauge<f64>,
    bus_in_flight: Gauge<f64>,
    bus_dead_lettered: Gauge<f64>,
    // State graph
    sg_scopes_created: Gauge<f64>,
    sg_advances_applied: Gauge<f64>,
    sg_epoch_conflicts: Gauge<f64>,
    // Policy
    policy_allowed: Gauge<f64>,
    policy_denied: Gauge<f64>,
    policy_pending: Gauge<f64>,
    // Finality
    finality_resolved: Gauge<f64>,
    finality_escalated: Gauge<f64>,
    finality_blocked: Gauge<f64>,
    finality_avg_goal_score: Gauge<f64>,
    // System
    system_memory_mb: Gauge<f64>,
    system_cpu_percent: Gauge<f64>,
}

/// Exports metrics via OpenTelemetry OTLP protocol.
pub struct OtlpExporter {
    provider: SdkMeterProvider,
    instruments: Instruments,
}

impl OtlpExporter {
    /// Create a new OTLP exporter from configuration.
    pub fn new(
        config: OtlpConfig,
        service_name: &str,
        service_namespace: &str,
        export_interval: Duration,
    ) -> Result<Self, MetricsError> {
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::MetricExporter;
        use opentelemetry_sdk::metrics::PeriodicReader;
        use opentelemetry_sdk::Resource;

        let timeout = Duration::from_secs(config.timeout_seconds);

        let metric_exporter = match config.protocol {
            OtlpProtocol::Grpc => MetricExporter::builder()
                .with_tonic()
                .with_endpoint(&config.endpoint)
                .with_timeout(timeout)
                .build()
                .map_err(|e| {
                    MetricsError::ConfigError(format!("Failed to build gRPC OTLP exporter: {}", e))
                })?,
            OtlpProtocol::HttpBinary | OtlpProtocol::HttpJson => MetricExporter::builder()
                .with_http()
                .with_endpoint(&config.endpoint)
                .with_timeout(timeout)
                .build()
                .map_err(|e| {
                    MetricsError::ConfigError(format!("Failed to build HTTP OTLP exporter: {}", e))
                })?,
        };

        let reader = PeriodicReader::builder(metric_exporter)
            .with_interval(export_interval)
            .build();

        let resource = Resource::builder()
            .with_service_name(service_name.to_string())
            .with_attribute(KeyValue::new(
                "service.namespace",
                service_namespace.to_string(),
            ))
            .build();

        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource)
            .build();

        let meter = provider.meter("conclave.runtime");

        let instruments = Instruments {
            bus_messages_published: meter
                .f64_gauge("bus.messages_published")
                .with_description("Total messages published to the event bus")
                .build(),
            bus_messages_delivered: meter
                .f64_gauge("bus.messages_delivered")
                .with_description("Total messages delivered to consumers")
                .build(),
            bus_messages_acked: meter
                .f64_gauge("bus.messages_acked")
                .with_description("Total messages acknowledged")
                .build(),
            bus_in_flight: meter
                .f64_gauge("bus.in_flight")
                .with_description("Messages delivered but not yet acked")
                .build(),
            bus_dead_lettered: meter
                .f64_gauge("bus.dead_lettered")
                .with_description("Messages moved to the dead-letter set")
                .build(),
            sg_scopes_created: meter
                .f64_gauge("state_graph.scopes_created")
                .with_description("Scopes created in the state graph")
                .build(),
            sg_advances_applied: meter
                .f64_gauge("state_graph.advances_applied")
                .with_description("Successful epoch-CAS advances")
                .build(),
            sg_epoch_conflicts: meter
                .f64_gauge("state_graph.epoch_conflicts")
                .with_description("Rejected advances due to epoch mismatch")
                .build(),
            policy_allowed: meter
                .f64_gauge("policy.proposals_allowed")
                .with_description("Proposals allowed by the policy engine")
                .build(),
            policy_denied: meter
                .f64_gauge("policy.proposals_denied")
                .with_description("Proposals denied by the policy engine")
                .build(),
            policy_pending: meter
                .f64_gauge("policy.proposals_pending_approval")
                .with_description("Proposals queued for human approval")
                .build(),
            finality_resolved: meter
                .f64_gauge("finality.scopes_resolved")
                .with_description("Scopes that reached a resolved finality state")
                .build(),
            finality_escalated: meter
                .f64_gauge("finality.scopes_escalated")
                .with_description("Scopes escalated due to risk")
                .build(),
            finality_blocked: meter
                .f64_gauge("finality.scopes_blocked")
                .with_description("Scopes blocked by a low goal score")
                .build(),
            finality_avg_goal_score: meter
                .f64_gauge("finality.average_goal_score")
                .with_description("Rolling average goal score across active scopes")
                .build(),
            system_memory_mb: meter
                .f64_gauge("system.memory_usage_mb")
                .with_description("System memory usage in megabytes")
                .build(),
            system_cpu_percent: meter
                .f64_gauge("system.cpu_usage_percent")
                .with_description("System CPU usage percentage")
                .build(),
        };

        tracing::info!(
            "OTLP metrics exporter initialized: endpoint={}, protocol={:?}",
            config.endpoint,
            config.protocol
        );

        Ok(Self {
            provider,
            instruments,
        })
    }
}

#[async_trait]
impl MetricsExporter for OtlpExporter {
    async fn export(&self, snapshot: &MetricsSnapshot) -> Result<(), MetricsError> {
        let i = &self.instruments;

        i.bus_messages_published
            .record(snapshot.bus.messages_published as f64, &[]);
        i.bus_messages_delivered
            .record(snapshot.bus.messages_delivered as f64, &[]);
        i.bus_messages_acked
            .record(snapshot.bus.messages_acked as f64, &[]);
        i.bus_in_flight.record(snapshot.bus.in_flight as f64, &[]);
        i.bus_dead_lettered
            .record(snapshot.bus.dead_lettered as f64, &[]);

        i.sg_scopes_created
            .record(snapshot.state_graph.scopes_created as f64, &[]);
        i.sg_advances_applied
            .record(snapshot.state_graph.advances_applied as f64, &[]);
        i.sg_epoch_conflicts
            .record(snapshot.state_graph.epoch_conflicts as f64, &[]);

        i.policy_allowed
            .record(snapshot.policy.proposals_allowed as f64, &[]);
        i.policy_denied
            .record(snapshot.policy.proposals_denied as f64, &[]);
        i.policy_pending
            .record(snapshot.policy.proposals_pending_approval as f64, &[]);

        i.finality_resolved
            .record(snapshot.finality.scopes_resolved as f64, &[]);
        i.finality_escalated
            .record(snapshot.finality.scopes_escalated as f64, &[]);
        i.finality_blocked
            .record(snapshot.finality.scopes_blocked as f64, &[]);
        i.finality_avg_goal_score
            .record(snapshot.finality.average_goal_score, &[]);

        i.system_memory_mb
            .record(snapshot.system.memory_usage_mb, &[]);
        i.system_cpu_percent
            .record(snapshot.system.cpu_usage_percent, &[]);

        tracing::trace!("Recorded metrics snapshot to OTLP gauges");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MetricsError> {
        self.provider.shutdown().map_err(|e| {
            MetricsError::ShutdownFailed(format!("OTLP meter provider shutdown failed: {}", e))
        })
    }
}
