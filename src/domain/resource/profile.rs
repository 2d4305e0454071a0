use serde::Serialize;

/// Execution statistics of one implementation on one worker.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    executions: u64,
    average_ms: Option<i64>,
    min_ms: i64,
    max_ms: i64,
}

impl Profile {
    /// Creates a profile, optionally seeded with a configured expectation that the first real
    /// measurement replaces.
    pub fn new(seed_ms: Option<i64>) -> Self {
        Profile { executions: 0, average_ms: seed_ms, min_ms: i64::MAX, max_ms: 0 }
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn average_ms(&self) -> Option<i64> {
        self.average_ms
    }

    pub fn min_ms(&self) -> Option<i64> {
        (self.executions > 0).then_some(self.min_ms)
    }

    pub fn max_ms(&self) -> Option<i64> {
        (self.executions > 0).then_some(self.max_ms)
    }

    /// Duration used for planning: the average, floored at zero, or zero without any history.
    pub fn expected_duration(&self) -> i64 {
        self.average_ms.unwrap_or(0).max(0)
    }

    pub fn update(&mut self, duration_ms: i64) {
        let duration_ms = duration_ms.max(0);
        let average = match (self.executions, self.average_ms) {
            (0, _) | (_, None) => duration_ms,
            (n, Some(avg)) => (avg * n as i64 + duration_ms) / (n as i64 + 1),
        };

        self.executions += 1;
        self.average_ms = Some(average);
        self.min_ms = self.min_ms.min(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::new(None)
    }
}
