//! Running latency summary printed when a command stops.

use std::fmt;
use std::time::Duration;

/// Min/max/mean over the recorded samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            (self.total.as_nanos() / self.count as u128) as u64,
        ))
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max, self.mean()) {
            (Some(min), Some(max), Some(mean)) => write!(
                f,
                "{} samples, min {:.3}us, max {:.3}us, mean {:.3}us",
                self.count,
                min.as_nanos() as f64 / 1_000.0,
                max.as_nanos() as f64 / 1_000.0,
                mean.as_nanos() as f64 / 1_000.0,
            ),
            _ => write!(f, "no samples"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let stats = LatencyStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.to_string(), "no samples");
    }

    #[test]
    fn test_record() {
        let mut stats = LatencyStats::new();
        stats.record(Duration::from_micros(30));
        stats.record(Duration::from_micros(10));
        stats.record(Duration::from_micros(20));

        assert_eq!(stats.count(), 3);
        assert_eq!(stats.min(), Some(Duration::from_micros(10)));
        assert_eq!(stats.max(), Some(Duration::from_micros(30)));
        assert_eq!(stats.mean(), Some(Duration::from_micros(20)));
        assert_eq!(
            stats.to_string(),
            "3 samples, min 10.000us, max 30.000us, mean 20.000us"
        );
    }
}
