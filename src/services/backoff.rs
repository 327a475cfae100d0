use std::time::Duration;

/// Delay schedule between retries. Once the schedule is exhausted the last
/// step repeats.
#[derive(Clone, Debug)]
pub struct Backoff {
    schedule: Vec<Duration>,
    index: usize,
}

impl Backoff {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule, index: 0 }
    }

    /// 50 ms, 100 ms, 200 ms.
    pub fn transfer_default() -> Self {
        Self::new(vec![
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200),
        ])
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self
            .schedule
            .get(self.index)
            .cloned()
            .unwrap_or(Duration::ZERO);
        if self.index + 1 < self.schedule.len() {
            self.index += 1;
        }
        delay
    }
}
