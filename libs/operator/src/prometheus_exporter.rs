use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::metrics::Temporality;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;

/// Keeps the last export of a periodic reader rendered in Prometheus text format.
#[derive(Clone, Default)]
pub struct PrometheusExporter {
    rendered: Arc<Mutex<Option<String>>>,
}

impl PrometheusExporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn rendered(&self) -> MutexGuard<'_, Option<String>> {
        self.rendered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest export, `None` until the reader ran once.
    pub fn render(&self) -> Option<String> {
        self.rendered().clone()
    }
}

fn render(metrics: &ResourceMetrics) -> String {
    let mut out = String::new();
    for scope in metrics.scope_metrics() {
        for metric in scope.metrics() {
            let name = format!("{}_{}", scope.scope().name(), metric.name());
            let _ = writeln!(out, "# HELP {name} {}", metric.description());
            match metric.data() {
                AggregatedMetrics::F64(data) => render_data(&mut out, &name, data, |v| v),
                AggregatedMetrics::U64(data) => render_data(&mut out, &name, data, |v| v as f64),
                AggregatedMetrics::I64(data) => render_data(&mut out, &name, data, |v| v as f64),
            }
        }
    }
    let _ = writeln!(out, "# EOF");
    out
}

fn render_data<T: Copy>(
    out: &mut String,
    name: &str,
    data: &MetricData<T>,
    to_f64: impl Fn(T) -> f64,
) {
    match data {
        MetricData::Sum(sum) => {
            let _ = writeln!(out, "# TYPE {name} counter");
            for point in sum.data_points() {
                let labels = labels(point.attributes(), None);
                let _ = writeln!(out, "{name}{labels} {}", to_f64(point.value()));
            }
        }
        MetricData::Gauge(gauge) => {
            let _ = writeln!(out, "# TYPE {name} gauge");
            for point in gauge.data_points() {
                let labels = labels(point.attributes(), None);
                let _ = writeln!(out, "{name}{labels} {}", to_f64(point.value()));
            }
        }
        MetricData::Histogram(histogram) => {
            let _ = writeln!(out, "# TYPE {name} histogram");
            for point in histogram.data_points() {
                let bounds: Vec<f64> = point.bounds().collect();
                let mut cumulative = 0u64;
                for (i, count) in point.bucket_counts().enumerate() {
                    cumulative += count;
                    let le = bounds
                        .get(i)
                        .map(f64::to_string)
                        .unwrap_or_else(|| "+Inf".to_string());
                    let labels = labels(point.attributes(), Some(&le));
                    let _ = writeln!(out, "{name}_bucket{labels} {cumulative}");
                }
                let labels = labels(point.attributes(), None);
                let _ = writeln!(out, "{name}_sum{labels} {}", to_f64(point.sum()));
                let _ = writeln!(out, "{name}_count{labels} {}", point.count());
            }
        }
        MetricData::ExponentialHistogram(_) => {}
    }
}

fn labels<'a>(attributes: impl Iterator<Item = &'a KeyValue>, le: Option<&str>) -> String {
    let mut pairs: Vec<String> = attributes
        .map(|kv| format!("{}=\"{}\"", kv.key.as_str(), kv.value))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

impl PushMetricExporter for PrometheusExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> Result<(), OTelSdkError> {
        *self.rendered() = Some(render(metrics));
        Ok(())
    }

    fn force_flush(&self) -> Result<(), OTelSdkError> {
        Ok(())
    }

    fn shutdown(&self) -> Result<(), OTelSdkError> {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> Result<(), OTelSdkError> {
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}
