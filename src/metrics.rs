//! Per-job conversion metrics.
//!
//! Attach a [`MetricsCollector`] to a [`ConversionJob`](crate::job::ConversionJob)
//! and the orchestrator fills in the built-in counters listed below. Custom
//! metrics can be registered alongside them through the [`Metric`] trait.
//!
//! | name              | kind    | meaning                                   |
//! |-------------------|---------|-------------------------------------------|
//! | `rows_written`    | counter | rows committed to the artifact            |
//! | `batches_written` | counter | blocks committed to the artifact          |
//! | `warnings`        | counter | fast-mode repairs recorded                |
//! | `output_bytes`    | counter | size of the finished artifact             |
//! | `reorder_peak`    | counter | most blocks held by the reorder buffer    |
//! | `execution_time_ms` | derived | from `record_start` to `record_end`     |
//!
//! ```no_run
//! use arffbeam::job::ConversionJob;
//! use arffbeam::metrics::MetricsCollector;
//! use arffbeam::orchestrator::convert;
//! use arffbeam::writer::TargetFormat;
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! let job = ConversionJob::builder("iris.arff", TargetFormat::Parquet)
//!     .output("iris.parquet")
//!     .metrics(metrics.clone())
//!     .build()?;
//! convert(job)?;
//! metrics.report();
//! metrics.save_to_file("iris.metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const ROWS_WRITTEN: &str = "rows_written";
pub const BATCHES_WRITTEN: &str = "batches_written";
pub const WARNINGS: &str = "warnings";
pub const OUTPUT_BYTES: &str = "output_bytes";
pub const REORDER_PEAK: &str = "reorder_peak";

/// A named value reported with the job.
pub trait Metric: Send + Sync + Any {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Thread-safe, cheaply cloneable metric registry.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metric, replacing any metric of the same name.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it at zero if needed. A non-counter
    /// metric of the same name is replaced.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        if let Some(counter) = inner
            .metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<CounterMetric>())
        {
            counter.count += value;
            return;
        }
        inner
            .metrics
            .insert(name.to_string(), Box::new(CounterMetric::with_value(name, value)));
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock()
            .metrics
            .insert(name.to_string(), Box::new(CounterMetric::with_value(name, value)));
    }

    /// Current value of a counter, if one is registered under `name`.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock().metrics.get(name).and_then(|m| m.value().as_u64())
    }

    /// All metrics as a JSON object of `{ name: { value, description? } }`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut out = Map::new();
        for (name, metric) in &inner.metrics {
            let mut obj = Map::new();
            obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                obj.insert("description".to_string(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(obj));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": end.duration_since(start).as_millis() as u64,
                    "description": "Wall time of the conversion in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Log every metric at `info` level, sorted by name.
    pub fn report(&self) {
        let inner = self.lock();
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            tracing::info!(elapsed_ms = end.duration_since(start).as_millis() as u64, "conversion metrics");
        }
        let mut sorted: Vec<_> = inner.metrics.iter().collect();
        sorted.sort_by_key(|(name, _)| *name);
        for (name, metric) in sorted {
            tracing::info!(metric = %name, value = %metric.value(), "metric");
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, formatted).with_context(|| format!("write {}", path.display()))
    }

    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

/// A monotonically increasing count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A single floating-point reading, e.g. rows per second.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = MetricsCollector::new();
        m.increment_counter(ROWS_WRITTEN, 3);
        m.increment_counter(ROWS_WRITTEN, 4);
        assert_eq!(m.counter(ROWS_WRITTEN), Some(7));
        m.set_counter(ROWS_WRITTEN, 1);
        assert_eq!(m.counter(ROWS_WRITTEN), Some(1));
    }

    #[test]
    fn gauges_show_up_in_json() {
        let m = MetricsCollector::new();
        m.register(Box::new(GaugeMetric::new("rows_per_sec", 12.5).with_description("throughput")));
        m.record_start();
        m.record_end();
        let json = m.to_json();
        assert_eq!(json["rows_per_sec"]["value"], json!(12.5));
        assert_eq!(json["rows_per_sec"]["description"], json!("throughput"));
        assert!(json.get("execution_time_ms").is_some());
    }
}
