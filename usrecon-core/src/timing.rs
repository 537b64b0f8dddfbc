use crate::error::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::Write,
    path::Path,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// A record of timing information for one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Name of the stage (e.g. "load_h", "solve")
    pub stage: String,
    /// Duration of the stage in milliseconds
    pub duration_ms: f64,
    /// Unix timestamp when the stage was recorded
    pub timestamp: u64,
}

/// Per-request timing of the reconstruction pipeline.
///
/// `TimingTracker` collects one record per executed stage. It provides
/// per-stage statistics and CSV export, and is used by the
/// [`Reconstructor`](crate::pipeline::Reconstructor) to fill the request
/// metadata.
#[derive(Debug, Default)]
pub struct TimingTracker {
    stage_timings: Vec<TimingRecord>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&mut self, stage: &str, duration: Duration) {
        self.stage_timings.push(TimingRecord {
            stage: stage.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: unix_now(),
        });
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.stage_timings
    }

    /// Total milliseconds spent in each stage.
    pub fn stage_totals(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for record in &self.stage_timings {
            *totals.entry(record.stage.clone()).or_insert(0.0) += record.duration_ms;
        }
        totals
    }

    /// `(average, max, count)` per stage.
    pub fn stage_statistics(&self) -> BTreeMap<String, (f64, f64, usize)> {
        let mut stats = BTreeMap::new();

        for record in &self.stage_timings {
            let entry = stats
                .entry(record.stage.clone())
                .or_insert((0.0f64, 0.0f64, 0));
            entry.0 += record.duration_ms;
            entry.1 = entry.1.max(record.duration_ms);
            entry.2 += 1;
        }

        // Convert to (average, max, count)
        for (_, stats) in stats.iter_mut() {
            stats.0 /= stats.2 as f64;
        }

        stats
    }

    pub fn write_stage_timings_to_csv(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ReconError::io(path, e))?;

        writeln!(file, "stage,duration_ms,timestamp").map_err(|e| ReconError::io(path, e))?;

        for record in &self.stage_timings {
            writeln!(
                file,
                "{},{:.3},{}",
                record.stage, record.duration_ms, record.timestamp
            )
            .map_err(|e| ReconError::io(path, e))?;
        }

        Ok(())
    }
}

/// Runs `f`, recording its duration under `stage`.
pub fn time_stage<R>(tracker: &mut TimingTracker, stage: &str, f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    tracker.record_stage(stage, start.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_per_stage() {
        let mut tracker = TimingTracker::new();
        tracker.record_stage("solve", Duration::from_millis(10));
        tracker.record_stage("solve", Duration::from_millis(30));
        tracker.record_stage("gain", Duration::from_millis(1));

        let stats = tracker.stage_statistics();
        let (avg, max, count) = stats["solve"];
        assert!((avg - 20.0).abs() < 1e-9);
        assert!((max - 30.0).abs() < 1e-9);
        assert_eq!(count, 2);
        assert_eq!(stats["gain"].2, 1);
        assert!((tracker.stage_totals()["solve"] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn time_stage_returns_value() {
        let mut tracker = TimingTracker::new();
        let value = time_stage(&mut tracker, "work", || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(tracker.records().len(), 1);
        assert_eq!(tracker.records()[0].stage, "work");
    }

    #[test]
    fn csv_export() {
        let dir = std::env::temp_dir().join(format!("usrecon-timing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("timings.csv");

        let mut tracker = TimingTracker::new();
        tracker.record_stage("load_h", Duration::from_micros(1500));
        tracker.write_stage_timings_to_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("stage,duration_ms,timestamp"));
        assert!(lines.next().unwrap().starts_with("load_h,1.500,"));
    }
}
