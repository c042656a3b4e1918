use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;

/// Counters for the sizing protocol and the setup coordinator.
#[derive(Debug, Default, Clone)]
pub struct LayoutMetrics {
    placeholder_measures: u64,
    solved_measures: u64,
    layout_passes: u64,
    solves: u64,
    intrinsic_edits: u64,
    setups_started: u64,
    setups_completed: u64,
    setups_discarded: u64,
    setups_failed: u64,
}

impl LayoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_placeholder_measure(&mut self) {
        self.placeholder_measures = self.placeholder_measures.saturating_add(1);
    }

    pub fn record_solved_measure(&mut self) {
        self.solved_measures = self.solved_measures.saturating_add(1);
    }

    pub fn record_layout(&mut self) {
        self.layout_passes = self.layout_passes.saturating_add(1);
    }

    pub fn record_solves(&mut self, count: u64) {
        self.solves = self.solves.saturating_add(count);
    }

    pub fn record_intrinsic_edits(&mut self, count: usize) {
        if count > 0 {
            self.intrinsic_edits = self.intrinsic_edits.saturating_add(count as u64);
        }
    }

    pub fn record_setup_started(&mut self) {
        self.setups_started = self.setups_started.saturating_add(1);
    }

    pub fn record_setup_completed(&mut self) {
        self.setups_completed = self.setups_completed.saturating_add(1);
    }

    pub fn record_setup_discarded(&mut self) {
        self.setups_discarded = self.setups_discarded.saturating_add(1);
    }

    pub fn record_setup_failed(&mut self) {
        self.setups_failed = self.setups_failed.saturating_add(1);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            placeholder_measures: self.placeholder_measures,
            solved_measures: self.solved_measures,
            layout_passes: self.layout_passes,
            solves: self.solves,
            intrinsic_edits: self.intrinsic_edits,
            setups_started: self.setups_started,
            setups_completed: self.setups_completed,
            setups_discarded: self.setups_discarded,
            setups_failed: self.setups_failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub placeholder_measures: u64,
    pub solved_measures: u64,
    pub layout_passes: u64,
    pub solves: u64,
    pub intrinsic_edits: u64,
    pub setups_started: u64,
    pub setups_completed: u64,
    pub setups_discarded: u64,
    pub setups_failed: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "layout_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert(
            "placeholder_measures".to_string(),
            json!(self.placeholder_measures),
        );
        map.insert("solved_measures".to_string(), json!(self.solved_measures));
        map.insert("layout_passes".to_string(), json!(self.layout_passes));
        map.insert("solves".to_string(), json!(self.solves));
        map.insert("intrinsic_edits".to_string(), json!(self.intrinsic_edits));
        map.insert("setups_started".to_string(), json!(self.setups_started));
        map.insert("setups_completed".to_string(), json!(self.setups_completed));
        map.insert("setups_discarded".to_string(), json!(self.setups_discarded));
        map.insert("setups_failed".to_string(), json!(self.setups_failed));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let mut metrics = LayoutMetrics::new();
        metrics.record_solved_measure();
        metrics.record_solves(2);
        metrics.record_intrinsic_edits(0);
        metrics.record_intrinsic_edits(3);
        metrics.record_setup_started();
        metrics.record_setup_discarded();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.solved_measures, 1);
        assert_eq!(snapshot.solves, 2);
        assert_eq!(snapshot.intrinsic_edits, 3);
        assert_eq!(snapshot.setups_discarded, 1);

        let event = snapshot.to_log_event(crate::logging::METRICS_TARGET);
        assert_eq!(event.field("solves"), Some(&json!(2)));
    }
}
