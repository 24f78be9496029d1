use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task engine configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Number of worker coroutines pulling from the queue.
    /// Clamped to `1..=16`.
    #[serde(default = "d_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Bound of the in-process task id queue.
    #[serde(default = "d_queue_maxsize")]
    pub queue_maxsize: usize,
    /// Queued + running tasks allowed per user before `rate_limited`.
    #[serde(default = "d_max_running_per_user")]
    pub max_running_per_user: usize,
    /// Terminal rows older than this are eligible for cleanup.
    #[serde(default = "d_retention_days")]
    pub retention_days: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: d_worker_concurrency(),
            queue_maxsize: d_queue_maxsize(),
            max_running_per_user: d_max_running_per_user(),
            retention_days: d_retention_days(),
        }
    }
}

impl TaskConfig {
    /// Clamp the fields to their allowed ranges.
    pub fn clamped(&self) -> Self {
        Self {
            worker_concurrency: self.worker_concurrency.clamp(1, 16),
            queue_maxsize: self.queue_maxsize.max(1),
            max_running_per_user: self.max_running_per_user.max(1),
            retention_days: self.retention_days,
        }
    }
}

fn d_worker_concurrency() -> usize {
    2
}

fn d_queue_maxsize() -> usize {
    64
}

fn d_max_running_per_user() -> usize {
    2
}

fn d_retention_days() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = TaskConfig::default();
        assert_eq!(cfg.worker_concurrency, 2);
        assert_eq!(cfg.queue_maxsize, 64);
        assert_eq!(cfg.max_running_per_user, 2);
    }

    #[test]
    fn clamp_bounds() {
        let cfg = TaskConfig {
            worker_concurrency: 0,
            queue_maxsize: 0,
            max_running_per_user: 0,
            retention_days: 7,
        };
        let clamped = cfg.clamped();
        assert_eq!(clamped.worker_concurrency, 1);
        assert_eq!(clamped.queue_maxsize, 1);
        assert_eq!(clamped.max_running_per_user, 1);

        let cfg = TaskConfig {
            worker_concurrency: 100,
            ..TaskConfig::default()
        };
        assert_eq!(cfg.clamped().worker_concurrency, 16);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: TaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.retention_days, 7);
    }
}
