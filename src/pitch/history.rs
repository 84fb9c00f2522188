// Detection history - Rolling log of recent detections for the settings screen

use super::engine::PitchEstimate;
use super::notes::BassString;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Utc>,
    pub note: String,
    pub frequency: f32,
    pub cents: i32,
    pub string: BassString,
    pub clarity: f32,
}

impl DetectionRecord {
    pub fn new(estimate: &PitchEstimate, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            note: estimate.note.to_string(),
            frequency: estimate.frequency,
            cents: estimate.cents,
            string: estimate.string,
            clarity: estimate.clarity,
        }
    }
}

/// Newest-first log of the last N detections
#[derive(Debug, Clone)]
pub struct DetectionLog {
    records: VecDeque<DetectionRecord>,
    capacity: usize,
    paused: bool,
}

impl DetectionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            paused: false,
        }
    }

    /// Record a detection unless paused
    pub fn record(&mut self, estimate: &PitchEstimate) {
        self.record_at(estimate, Utc::now());
    }

    pub fn record_at(&mut self, estimate: &PitchEstimate, timestamp: DateTime<Utc>) {
        if self.paused {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_back();
        }
        self.records
            .push_front(DetectionRecord::new(estimate, timestamp));
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.records.iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let records: Vec<&DetectionRecord> = self.records.iter().collect();
        serde_json::to_string_pretty(&records)
    }
}

impl Default for DetectionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_newest_twenty() {
        let mut log = DetectionLog::default();
        for i in 0..25 {
            log.record(&PitchEstimate::from_frequency(40.0 + i as f32, 0.9));
        }
        assert_eq!(log.len(), DEFAULT_HISTORY_LEN);
        let newest = log.records().next().unwrap();
        assert!((newest.frequency - 64.0).abs() < 1e-3);
    }

    #[test]
    fn test_paused_log_ignores_detections() {
        let mut log = DetectionLog::default();
        log.set_paused(true);
        log.record(&PitchEstimate::from_frequency(55.0, 0.9));
        assert!(log.is_empty());

        log.set_paused(false);
        log.record(&PitchEstimate::from_frequency(55.0, 0.9));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_json_export() {
        let mut log = DetectionLog::default();
        log.record(&PitchEstimate::from_frequency(98.0, 0.95));
        let json = log.to_json().unwrap();
        assert!(json.contains("\"note\": \"G2\""));
        assert!(json.contains("\"string\": \"G\""));
        assert!(json.contains("timestamp"));
    }
}
