//! Rolling per-metric windows backing the relative-threshold rules.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::Serialize;

/// Number of recent samples kept per metric.
pub const HISTORY_CAPACITY: usize = 5;

/// Fixed-capacity FIFO windows of recent raw values, one per tracked metric.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    windows: IndexMap<String, VecDeque<f64>>,
}

/// Snapshot of one metric's window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricWindow {
    pub count: usize,
    /// Oldest first.
    pub values: Vec<f64>,
    /// `None` while the window is empty.
    pub average: Option<f64>,
}

pub type HistorySummary = IndexMap<String, MetricWindow>;

impl RollingHistory {
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let windows = metrics
            .into_iter()
            .map(|m| (m.into(), VecDeque::with_capacity(HISTORY_CAPACITY)))
            .collect();
        Self { windows }
    }

    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    /// Append a value, evicting the oldest once the window is full.
    /// Returns `false` when the metric is not tracked.
    pub fn append(&mut self, metric: &str, value: f64) -> bool {
        let Some(window) = self.windows.get_mut(metric) else {
            return false;
        };
        if window.len() == HISTORY_CAPACITY {
            window.pop_front();
        }
        window.push_back(value);
        true
    }

    pub fn sample_count(&self, metric: &str) -> usize {
        self.windows.get(metric).map_or(0, VecDeque::len)
    }

    pub fn average(&self, metric: &str) -> Option<f64> {
        let window = self.windows.get(metric)?;
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    pub fn summary(&self) -> HistorySummary {
        self.windows
            .iter()
            .map(|(metric, window)| {
                let snapshot = MetricWindow {
                    count: window.len(),
                    values: window.iter().copied().collect(),
                    average: self.average(metric),
                };
                (metric.clone(), snapshot)
            })
            .collect()
    }
}
