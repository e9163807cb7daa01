//! Context enrichment: metrics, logs, and resource metadata for an alert.
//!
//! [`ConcurrentEnricher`] implements the core
//! [`EnrichmentCollaborator`] by fanning out to three independent sources
//! and joining them with `futures::try_join!`. All three calls are in
//! flight at once; the first failure fails the whole enrichment and the
//! remaining calls are dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use runbook_rag_core::collaborators::EnrichmentCollaborator;
use runbook_rag_core::models::{Alert, EnrichedContext, LogEntry, MetricSample, ResourceMetadata};

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn recent_metrics(&self, alert: &Alert) -> Result<Vec<MetricSample>>;
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn recent_logs(&self, alert: &Alert) -> Result<Vec<LogEntry>>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn resource_metadata(&self, alert: &Alert) -> Result<ResourceMetadata>;
}

/// Fan-out/fan-in enricher over the three sources.
pub struct ConcurrentEnricher {
    metrics: Arc<dyn MetricsSource>,
    logs: Arc<dyn LogSource>,
    metadata: Arc<dyn MetadataSource>,
}

impl ConcurrentEnricher {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        logs: Arc<dyn LogSource>,
        metadata: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            metrics,
            logs,
            metadata,
        }
    }

    /// Metadata from alert labels, no metrics, no logs.
    pub fn labels_only() -> Self {
        Self::new(Arc::new(NoMetrics), Arc::new(NoLogs), Arc::new(AlertMetadataSource))
    }
}

#[async_trait]
impl EnrichmentCollaborator for ConcurrentEnricher {
    async fn enrich(&self, alert: &Alert) -> Result<EnrichedContext> {
        let (metrics, logs, resource) = futures::try_join!(
            async {
                self.metrics
                    .recent_metrics(alert)
                    .await
                    .context("metrics source failed")
            },
            async {
                self.logs
                    .recent_logs(alert)
                    .await
                    .context("log source failed")
            },
            async {
                self.metadata
                    .resource_metadata(alert)
                    .await
                    .context("metadata source failed")
            },
        )?;

        debug!(
            alert_id = %alert.id,
            metrics = metrics.len(),
            logs = logs.len(),
            "alert enriched"
        );

        let mut context = EnrichedContext::from_alert(alert.clone());
        context.resource = resource;
        context.metrics = metrics;
        context.logs = logs;
        Ok(context)
    }
}

// ============ Built-in sources ============

/// No metrics backend.
pub struct NoMetrics;

#[async_trait]
impl MetricsSource for NoMetrics {
    async fn recent_metrics(&self, _alert: &Alert) -> Result<Vec<MetricSample>> {
        Ok(Vec::new())
    }
}

/// No log backend.
pub struct NoLogs;

#[async_trait]
impl LogSource for NoLogs {
    async fn recent_logs(&self, _alert: &Alert) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }
}

/// Resource metadata read from well-known alert labels.
///
/// | Field | Labels (first present wins) |
/// |-------|-----------------------------|
/// | `shape` | `shape`, `instance_shape`, `instance_type`, `machine_type` |
/// | `kind` | `kind`, `resource_type`, `resource_kind` |
/// | `region` | `region`, `location` |
///
/// Labels prefixed `resource.` land in `attributes` with the prefix removed.
pub struct AlertMetadataSource;

const SHAPE_LABELS: &[&str] = &["shape", "instance_shape", "instance_type", "machine_type"];
const KIND_LABELS: &[&str] = &["kind", "resource_type", "resource_kind"];
const REGION_LABELS: &[&str] = &["region", "location"];

#[async_trait]
impl MetadataSource for AlertMetadataSource {
    async fn resource_metadata(&self, alert: &Alert) -> Result<ResourceMetadata> {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| alert.labels.get(*k))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(ResourceMetadata {
            kind: first(KIND_LABELS),
            shape: first(SHAPE_LABELS),
            region: first(REGION_LABELS),
            attributes: alert
                .labels
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix("resource.")
                        .map(|key| (key.to_string(), v.clone()))
                })
                .collect(),
        })
    }
}
