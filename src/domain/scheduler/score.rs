use serde::Serialize;
use std::cmp::Ordering;

/// Placement score of an action on a worker.
///
/// Higher priority wins outright. Between equal priorities the placement expected to complete
/// first wins: `max(resource_free_time, data_ready_time) + implementation_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub priority: i64,
    pub data_ready_time: i64,
    pub resource_free_time: i64,
    pub implementation_duration: i64,
}

impl Score {
    pub fn new(priority: i64, data_ready_time: i64, resource_free_time: i64, implementation_duration: i64) -> Self {
        Score { priority, data_ready_time, resource_free_time, implementation_duration }
    }

    pub fn expected_start(&self) -> i64 {
        self.resource_free_time.max(self.data_ready_time)
    }

    pub fn expected_end(&self) -> i64 {
        self.expected_start().saturating_add(self.implementation_duration)
    }

    pub fn is_better(&self, other: &Score) -> bool {
        self.rank(other) == Ordering::Less
    }

    /// Orders scores best first. Scores with equal priority and equal expected end are equivalent.
    pub fn rank(&self, other: &Score) -> Ordering {
        other.priority.cmp(&self.priority).then_with(|| self.expected_end().cmp(&other.expected_end()))
    }
}
