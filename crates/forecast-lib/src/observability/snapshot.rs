//! Cross-process metric aggregation
//!
//! Each serving process periodically writes a [`MetricsSnapshot`] of its own
//! registry into a shared directory. Whichever process answers `/metrics`
//! reads every snapshot and merges them: counters and histograms are summed,
//! gauges are kept per worker under a `worker` label.

use crate::loader::compute_checksum;
use chrono::{DateTime, Utc};
use prometheus::proto::{self, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WORKER_LABEL: &str = "worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyKind {
    Counter,
    Gauge,
    Histogram,
}

impl FamilyKind {
    fn from_proto(kind: MetricType) -> Option<Self> {
        match kind {
            MetricType::COUNTER => Some(FamilyKind::Counter),
            MetricType::GAUGE => Some(FamilyKind::Gauge),
            MetricType::HISTOGRAM => Some(FamilyKind::Histogram),
            _ => None,
        }
    }

    fn to_proto(self) -> MetricType {
        match self {
            FamilyKind::Counter => MetricType::COUNTER,
            FamilyKind::Gauge => MetricType::GAUGE,
            FamilyKind::Histogram => MetricType::HISTOGRAM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub buckets: Vec<BucketSnapshot>,
}

impl HistogramSnapshot {
    fn merge(&mut self, other: &HistogramSnapshot) {
        self.count += other.count;
        self.sum += other.sum;
        for bucket in &other.buckets {
            match self
                .buckets
                .iter_mut()
                .find(|b| b.upper_bound == bucket.upper_bound)
            {
                Some(existing) => existing.cumulative_count += bucket.cumulative_count,
                None => self.buckets.push(bucket.clone()),
            }
        }
        self.buckets
            .sort_by(|a, b| a.upper_bound.total_cmp(&b.upper_bound));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<HistogramSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: FamilyKind,
    pub series: Vec<SeriesSnapshot>,
}

/// Point-in-time copy of one process's registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub worker: String,
    pub taken_at: DateTime<Utc>,
    pub families: Vec<FamilySnapshot>,
}

impl MetricsSnapshot {
    pub fn from_families(worker: &str, families: &[MetricFamily]) -> Self {
        let families = families
            .iter()
            .filter_map(|family| {
                let kind = FamilyKind::from_proto(family.get_field_type())?;
                let series = family
                    .get_metric()
                    .iter()
                    .map(|metric| series_from_proto(kind, metric))
                    .collect();
                Some(FamilySnapshot {
                    name: family.get_name().to_string(),
                    help: family.get_help().to_string(),
                    kind,
                    series,
                })
            })
            .collect();

        Self {
            worker: worker.to_string(),
            taken_at: Utc::now(),
            families,
        }
    }
}

fn series_from_proto(kind: FamilyKind, metric: &proto::Metric) -> SeriesSnapshot {
    let labels = metric
        .get_label()
        .iter()
        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
        .collect();

    match kind {
        FamilyKind::Counter => SeriesSnapshot {
            labels,
            value: metric.get_counter().get_value(),
            histogram: None,
        },
        FamilyKind::Gauge => SeriesSnapshot {
            labels,
            value: metric.get_gauge().get_value(),
            histogram: None,
        },
        FamilyKind::Histogram => {
            let h = metric.get_histogram();
            SeriesSnapshot {
                labels,
                value: 0.0,
                histogram: Some(HistogramSnapshot {
                    count: h.get_sample_count(),
                    sum: h.get_sample_sum(),
                    buckets: h
                        .get_bucket()
                        .iter()
                        .map(|b| BucketSnapshot {
                            upper_bound: b.get_upper_bound(),
                            cumulative_count: b.get_cumulative_count(),
                        })
                        .collect(),
                }),
            }
        }
    }
}

struct FamilyAccumulator {
    help: String,
    kind: FamilyKind,
    series: BTreeMap<BTreeMap<String, String>, SeriesSnapshot>,
}

/// Merge snapshots from every worker into one set of metric families
pub fn aggregate(snapshots: &[MetricsSnapshot]) -> Vec<MetricFamily> {
    let mut merged: BTreeMap<String, FamilyAccumulator> = BTreeMap::new();

    for snapshot in snapshots {
        for family in &snapshot.families {
            let acc = merged
                .entry(family.name.clone())
                .or_insert_with(|| FamilyAccumulator {
                    help: family.help.clone(),
                    kind: family.kind,
                    series: BTreeMap::new(),
                });
            if acc.kind != family.kind {
                warn!(
                    family = %family.name,
                    worker = %snapshot.worker,
                    "Metric type differs between workers, skipping"
                );
                continue;
            }

            for series in &family.series {
                let mut labels = series.labels.clone();
                if family.kind == FamilyKind::Gauge {
                    labels.insert(WORKER_LABEL.to_string(), snapshot.worker.clone());
                }

                match acc.series.get_mut(&labels) {
                    Some(existing) => {
                        existing.value += series.value;
                        if let (Some(total), Some(h)) =
                            (existing.histogram.as_mut(), series.histogram.as_ref())
                        {
                            total.merge(h);
                        }
                    }
                    None => {
                        acc.series.insert(
                            labels.clone(),
                            SeriesSnapshot {
                                labels,
                                value: series.value,
                                histogram: series.histogram.clone(),
                            },
                        );
                    }
                }
            }
        }
    }

    merged
        .into_iter()
        // the text encoder rejects families without series
        .filter(|(_, acc)| !acc.series.is_empty())
        .map(|(name, acc)| family_to_proto(&name, acc))
        .collect()
}

fn family_to_proto(name: &str, acc: FamilyAccumulator) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(name.to_string());
    family.set_help(acc.help);
    family.set_field_type(acc.kind.to_proto());

    for series in acc.series.into_values() {
        let mut metric = proto::Metric::default();
        for (key, value) in &series.labels {
            let mut pair = proto::LabelPair::default();
            pair.set_name(key.clone());
            pair.set_value(value.clone());
            metric.mut_label().push(pair);
        }

        match acc.kind {
            FamilyKind::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(series.value);
                metric.set_counter(counter);
            }
            FamilyKind::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(series.value);
                metric.set_gauge(gauge);
            }
            FamilyKind::Histogram => {
                let snapshot = series.histogram.unwrap_or_default();
                let mut histogram = proto::Histogram::default();
                histogram.set_sample_count(snapshot.count);
                histogram.set_sample_sum(snapshot.sum);
                for b in snapshot.buckets {
                    let mut bucket = proto::Bucket::default();
                    bucket.set_upper_bound(b.upper_bound);
                    bucket.set_cumulative_count(b.cumulative_count);
                    histogram.mut_bucket().push(bucket);
                }
                metric.set_histogram(histogram);
            }
        }
        family.mut_metric().push(metric);
    }

    family
}

/// Encode families in the Prometheus text exposition format
pub fn render_families(families: &[MetricFamily]) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buffer) {
        warn!(error = %e, "Failed to encode aggregated metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Directory of per-worker snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sanitized worker id plus a digest of the raw id, so ids that sanitize
    /// alike (`w/1` and `w_1`) still get separate files
    fn path_for(&self, worker: &str) -> PathBuf {
        let digest = compute_checksum(worker.as_bytes());
        let file: String = worker
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}-{}.json", &digest[..8]))
    }

    /// Replace this worker's snapshot file atomically
    pub fn write(&self, snapshot: &MetricsSnapshot) -> io::Result<()> {
        let path = self.path_for(&snapshot.worker);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "Wrote metrics snapshot");
        Ok(())
    }

    /// Read every worker's latest snapshot; unreadable files are skipped
    pub fn read_all(&self) -> io::Result<Vec<MetricsSnapshot>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_slice::<MetricsSnapshot>(&raw).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping metrics snapshot"),
            }
        }
        snapshots.sort_by(|a, b| a.worker.cmp(&b.worker));
        Ok(snapshots)
    }

    pub fn render_aggregate(&self) -> io::Result<String> {
        Ok(render_families(&aggregate(&self.read_all()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StatusClass, ValidationReason};
    use crate::observability::{MetricsRecorder, PREDICT_ENDPOINT};
    use std::time::Duration;
    use tempfile::TempDir;

    fn traffic(recorder: &MetricsRecorder, ok: usize, rejected: usize) {
        for _ in 0..ok {
            recorder.observe(PREDICT_ENDPOINT, StatusClass::Success, Duration::from_millis(2));
            recorder.observe_batch_size(3);
        }
        for _ in 0..rejected {
            recorder.observe(PREDICT_ENDPOINT, StatusClass::ClientError, Duration::from_millis(1));
            recorder.observe_validation_failure(ValidationReason::LengthMismatch);
        }
    }

    #[test]
    fn test_aggregate_sums_counters_across_workers() {
        let a = MetricsRecorder::new();
        let b = MetricsRecorder::new();
        traffic(&a, 3, 1);
        traffic(&b, 2, 4);

        let text = render_families(&aggregate(&[a.snapshot("a"), b.snapshot("b")]));

        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 5"#));
        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="4xx"} 5"#));
        assert!(text.contains(r#"forecast_validation_failures_total{reason="length_mismatch"} 5"#));
        assert!(text.contains(r#"forecast_request_duration_seconds_count{endpoint="/predict"} 10"#));
        assert!(text.contains("forecast_batch_size_count 5"));
    }

    #[test]
    fn test_aggregate_keeps_gauges_per_worker() {
        let a = MetricsRecorder::new();
        let b = MetricsRecorder::new();
        a.set_model(Some("v1"));

        let text = render_families(&aggregate(&[a.snapshot("a"), b.snapshot("b")]));

        assert!(text.contains(r#"forecast_model_ready{worker="a"} 1"#));
        assert!(text.contains(r#"forecast_model_ready{worker="b"} 0"#));
        assert!(text.contains(r#"forecast_model_info{version="v1",worker="a"} 1"#));
    }

    #[test]
    fn test_aggregate_of_single_worker_matches_counts() {
        let a = MetricsRecorder::new();
        traffic(&a, 2, 0);
        let text = render_families(&aggregate(&[a.snapshot("solo")]));
        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 2"#));
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[]).is_empty());
        assert_eq!(render_families(&[]), "");
    }

    #[test]
    fn test_store_round_trip_through_files() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        let a = MetricsRecorder::new();
        let b = MetricsRecorder::new();
        traffic(&a, 1, 0);
        traffic(&b, 1, 2);
        store.write(&a.snapshot("worker-1")).unwrap();
        store.write(&b.snapshot("worker/2")).unwrap();
        // second flush replaces the first
        traffic(&a, 1, 0);
        store.write(&a.snapshot("worker-1")).unwrap();

        let snapshots = store.read_all().unwrap();
        assert_eq!(snapshots.len(), 2);

        let text = store.render_aggregate().unwrap();
        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 3"#));
        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="4xx"} 2"#));
    }

    #[test]
    fn test_store_keeps_workers_with_similar_ids_apart() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        let a = MetricsRecorder::new();
        let b = MetricsRecorder::new();
        traffic(&a, 2, 0);
        traffic(&b, 3, 0);
        store.write(&a.snapshot("w/1")).unwrap();
        store.write(&b.snapshot("w_1")).unwrap();

        let workers: Vec<String> = store
            .read_all()
            .unwrap()
            .into_iter()
            .map(|snapshot| snapshot.worker)
            .collect();
        assert_eq!(workers, vec!["w/1".to_string(), "w_1".to_string()]);

        let text = store.render_aggregate().unwrap();
        assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 5"#));
    }

    #[test]
    fn test_store_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        store.write(&MetricsRecorder::new().snapshot("ok")).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }
}
