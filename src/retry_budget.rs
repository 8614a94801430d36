use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RetryBudgetConfig;

/// Per-URL sliding-window error-ratio tracker. Routes whose observed ratio
/// meets the configured threshold are skipped by the RouteResolver before a
/// worker is ever dispatched against them.
///
/// Unlike a circuit breaker this never blocks admission on its own; it only
/// answers `error_ratio` queries. The RouteResolver is the one that decides
/// what to do with the number.
pub struct RetryBudget {
    config: RetryBudgetConfig,
    urls: DashMap<Arc<str>, Mutex<VecDeque<Observation>>>,
}

struct Observation {
    at: Instant,
    is_error: bool,
}

impl RetryBudget {
    pub fn new(config: RetryBudgetConfig) -> Self {
        Self {
            config,
            urls: DashMap::new(),
        }
    }

    /// Record one outcome for `url`. Callers classify the observation
    /// themselves: 5xx and all 4xx except the FDSN no-content codes (204,
    /// 404) count as errors, since those two reflect an empty result rather
    /// than an unhealthy endpoint.
    pub fn record(&self, url: &str, is_error: bool) {
        let entry = self
            .urls
            .entry(Arc::from(url))
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut ring = entry.lock().unwrap();
        ring.push_back(Observation {
            at: Instant::now(),
            is_error,
        });
        while ring.len() > self.config.capacity_per_url {
            ring.pop_front();
        }
    }

    /// Error ratio for `url` in percent (0..=100), over observations still
    /// within the retention window. Returns 0 when fewer than `min_samples`
    /// observations remain — a cold or lightly used endpoint is never
    /// penalized for a small sample.
    pub fn error_ratio(&self, url: &str) -> f64 {
        let Some(entry) = self.urls.get(url) else {
            return 0.0;
        };
        let ring = entry.lock().unwrap();
        let retention = Duration::from_secs(self.config.retention_secs);
        let now = Instant::now();
        let mut total = 0usize;
        let mut errors = 0usize;
        for obs in ring.iter().rev() {
            if now.duration_since(obs.at) > retention {
                break;
            }
            total += 1;
            if obs.is_error {
                errors += 1;
            }
        }
        if total < self.config.min_samples {
            return 0.0;
        }
        errors as f64 / total as f64 * 100.0
    }

    /// Drop observations older than the retention window for every tracked
    /// URL, and drop URLs left with no observations at all. Called by the
    /// Processor on finalize so idle endpoints don't hold memory forever.
    pub fn gc(&self) {
        let retention = Duration::from_secs(self.config.retention_secs);
        let now = Instant::now();
        let mut empty = Vec::new();
        for entry in self.urls.iter() {
            let mut ring = entry.value().lock().unwrap();
            while let Some(front) = ring.front() {
                if now.duration_since(front.at) > retention {
                    ring.pop_front();
                } else {
                    break;
                }
            }
            if ring.is_empty() {
                empty.push(entry.key().clone());
            }
        }
        for key in empty {
            self.urls.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(min_samples: usize) -> RetryBudget {
        RetryBudget::new(RetryBudgetConfig {
            retention_secs: 600,
            min_samples,
            capacity_per_url: 1000,
        })
    }

    #[test]
    fn unseen_url_has_zero_ratio() {
        let b = budget(1);
        assert_eq!(b.error_ratio("http://a"), 0.0);
    }

    #[test]
    fn below_min_samples_reports_zero() {
        let b = budget(5);
        b.record("http://a", true);
        b.record("http://a", true);
        assert_eq!(b.error_ratio("http://a"), 0.0);
    }

    #[test]
    fn ratio_reflects_recorded_outcomes() {
        let b = budget(1);
        b.record("http://a", true);
        b.record("http://a", true);
        b.record("http://a", false);
        b.record("http://a", false);
        assert_eq!(b.error_ratio("http://a"), 50.0);
    }

    #[test]
    fn ring_respects_capacity() {
        let b = RetryBudget::new(RetryBudgetConfig {
            retention_secs: 600,
            min_samples: 1,
            capacity_per_url: 3,
        });
        for _ in 0..10 {
            b.record("http://a", true);
        }
        b.record("http://a", false);
        // only the most recent 3 observations are retained: 2 errors dropped off front
        assert!(b.error_ratio("http://a") < 100.0);
    }

    #[test]
    fn gc_drops_empty_urls() {
        let b = budget(1);
        b.record("http://a", false);
        b.gc();
        assert!(b.urls.contains_key("http://a"));
    }
}
