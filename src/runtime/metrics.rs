//! Metrics Collector (C9).
//!
//! Bounded ring buffer of per-action outcomes with on-demand aggregation
//! and trend detection. Novel relative to the teacher (which has no
//! metrics module), but follows `orchestration.rs`'s plain `log` idiom for
//! surfacing notable events and `tools/memory.rs`'s `Arc<Mutex<_>>` state
//! pattern for the shared buffer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// One recorded outcome for a single dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub action_tag: String,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub context: Option<String>,
}

/// Classification + message recorded alongside a failed action, threaded
/// through by the dispatcher so `errorDistribution` can group by kind.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub error_type: String,
    pub error_message: String,
    pub context: Option<String>,
}

/// Aggregate statistics computed over the records currently in the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStats {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Direction of the success-rate trend across the window's recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

struct Inner {
    records: VecDeque<MetricRecord>,
    capacity: usize,
}

/// Thread-safe, bounded (N records, oldest evicted) metrics store.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    persist_dir: Option<PathBuf>,
}

impl MetricsCollector {
    pub fn new(capacity: usize, persist_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity),
                capacity,
            }),
            persist_dir,
        }
    }

    pub fn record(
        &self,
        action_tag: impl Into<String>,
        success: bool,
        duration_ms: u64,
        error: Option<ErrorDetail>,
    ) {
        let record = MetricRecord {
            action_tag: action_tag.into(),
            success,
            duration_ms,
            timestamp: Utc::now(),
            error_type: error.as_ref().map(|e| e.error_type.clone()),
            error_message: error.as_ref().map(|e| e.error_message.clone()),
            context: error.and_then(|e| e.context),
        };
        let mut inner = self.inner.lock().unwrap();
        if inner.records.len() >= inner.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record.clone());
        drop(inner);
        if let Some(dir) = &self.persist_dir {
            let _ = self.append_jsonl(dir, &record);
        }
    }

    fn append_jsonl(&self, dir: &PathBuf, record: &MetricRecord) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        let line = serde_json::to_string(record)?;
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.jsonl"))?;
        writeln!(file, "{}", line)
    }

    pub fn aggregate(&self) -> AggregateStats {
        let inner = self.inner.lock().unwrap();
        aggregate_of(inner.records.iter())
    }

    pub fn aggregate_for(&self, action_tag: &str) -> AggregateStats {
        let inner = self.inner.lock().unwrap();
        aggregate_of(inner.records.iter().filter(|r| r.action_tag == action_tag))
    }

    /// Count of failed records per `error_type`, across every record
    /// currently in the buffer.
    pub fn error_distribution(&self) -> std::collections::HashMap<String, usize> {
        let inner = self.inner.lock().unwrap();
        let mut dist = std::collections::HashMap::new();
        for r in inner.records.iter() {
            if let Some(kind) = &r.error_type {
                *dist.entry(kind.clone()).or_insert(0) += 1;
            }
        }
        dist
    }

    /// The `k` most frequent distinct `error_message`s, most common first.
    pub fn top_errors(&self, k: usize) -> Vec<(String, usize)> {
        let inner = self.inner.lock().unwrap();
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for r in inner.records.iter() {
            if let Some(message) = &r.error_message {
                *counts.entry(message.clone()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }

    /// Compares the success rate of the first half vs the second half of
    /// the most recent 50 records; a delta beyond +-0.1 is a trend, else
    /// stable. Fewer than 2 records is always stable.
    pub fn trend(&self) -> Trend {
        let inner = self.inner.lock().unwrap();
        let window: Vec<&MetricRecord> = inner.records.iter().rev().take(50).collect();
        if window.len() < 2 {
            return Trend::Stable;
        }
        let mut chronological = window.clone();
        chronological.reverse();
        let mid = chronological.len() / 2;
        let (first_half, second_half) = chronological.split_at(mid);
        let first_rate = success_rate(first_half.iter().copied());
        let second_rate = success_rate(second_half.iter().copied());
        let delta = second_rate - first_rate;
        if delta > 0.1 {
            Trend::Improving
        } else if delta < -0.1 {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn success_rate<'a>(records: impl Iterator<Item = &'a MetricRecord>) -> f64 {
    let mut total = 0usize;
    let mut successes = 0usize;
    for r in records {
        total += 1;
        if r.success {
            successes += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    }
}

fn aggregate_of<'a>(records: impl Iterator<Item = &'a MetricRecord>) -> AggregateStats {
    let mut total = 0usize;
    let mut successes = 0usize;
    let mut duration_sum = 0u64;
    for r in records {
        total += 1;
        duration_sum += r.duration_ms;
        if r.success {
            successes += 1;
        }
    }
    let failures = total - successes;
    AggregateStats {
        total,
        successes,
        failures,
        success_rate: if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        },
        avg_duration_ms: if total == 0 {
            0.0
        } else {
            duration_sum as f64 / total as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let collector = MetricsCollector::new(3, None);
        for i in 0..5 {
            collector.record(format!("bash{i}"), true, 1, None);
        }
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn aggregate_computes_success_rate() {
        let collector = MetricsCollector::new(100, None);
        collector.record("bash", true, 10, None);
        collector.record("bash", true, 20, None);
        collector.record("bash", false, 30, None);
        let stats = collector.aggregate();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert!((stats.success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn trend_is_stable_with_fewer_than_two_records() {
        let collector = MetricsCollector::new(100, None);
        assert_eq!(collector.trend(), Trend::Stable);
        collector.record("bash", true, 1, None);
        assert_eq!(collector.trend(), Trend::Stable);
    }

    #[test]
    fn trend_detects_degrading_window() {
        let collector = MetricsCollector::new(100, None);
        for _ in 0..10 {
            collector.record("bash", true, 1, None);
        }
        for _ in 0..10 {
            collector.record("bash", false, 1, None);
        }
        assert_eq!(collector.trend(), Trend::Degrading);
    }

    #[test]
    fn error_distribution_groups_failures_by_type() {
        let collector = MetricsCollector::new(100, None);
        collector.record(
            "bash",
            false,
            1,
            Some(ErrorDetail {
                error_type: "permission".to_string(),
                error_message: "denied".to_string(),
                context: None,
            }),
        );
        collector.record(
            "write",
            false,
            1,
            Some(ErrorDetail {
                error_type: "permission".to_string(),
                error_message: "denied again".to_string(),
                context: None,
            }),
        );
        collector.record(
            "bash",
            false,
            1,
            Some(ErrorDetail {
                error_type: "not_found".to_string(),
                error_message: "missing".to_string(),
                context: None,
            }),
        );
        let dist = collector.error_distribution();
        assert_eq!(dist.get("permission"), Some(&2));
        assert_eq!(dist.get("not_found"), Some(&1));
    }

    #[test]
    fn top_errors_ranks_by_frequency() {
        let collector = MetricsCollector::new(100, None);
        for _ in 0..3 {
            collector.record(
                "bash",
                false,
                1,
                Some(ErrorDetail {
                    error_type: "transient".to_string(),
                    error_message: "connection refused".to_string(),
                    context: None,
                }),
            );
        }
        collector.record(
            "bash",
            false,
            1,
            Some(ErrorDetail {
                error_type: "syntax".to_string(),
                error_message: "unexpected token".to_string(),
                context: None,
            }),
        );
        let top = collector.top_errors(1);
        assert_eq!(top, vec![("connection refused".to_string(), 3)]);
    }
}
