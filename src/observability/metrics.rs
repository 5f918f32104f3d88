//! Prometheus metrics.
//!
//! The recorder is only installed when metrics are enabled. Without it the
//! `metrics` macros used throughout the crate are no-ops.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle for rendering collected metrics.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder if `enabled`.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn install_prometheus(enabled: bool) -> Result<Option<MetricsHandle>> {
    if !enabled {
        return Ok(None);
    }
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::operation("metrics_recorder_install", e))?;
    Ok(Some(MetricsHandle { prometheus }))
}
