use fwpipe_core::config::ConcurrencyConfig;
use fwpipe_core::executor::{ConcurrencyContext, ConcurrencyPolicy};

/// Scales the pool with CPU load: halves above the high threshold,
/// doubles below the low one.
pub struct AdaptiveConcurrency {
    config: ConcurrencyConfig,
}

/// Always the configured size.
pub struct FixedConcurrency {
    fixed: usize,
}

impl AdaptiveConcurrency {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self { config }
    }
}

impl FixedConcurrency {
    pub fn new(fixed: usize) -> Self {
        Self { fixed }
    }
}

impl ConcurrencyPolicy for AdaptiveConcurrency {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn calculate_concurrency(&self, context: &ConcurrencyContext) -> usize {
        let min = self.config.min_concurrency.max(1);
        let max = self.config.max_concurrency.max(min);
        let mut desired = context.base_concurrency;

        if context.cpu_usage >= self.config.cpu_threshold_high {
            desired = desired.saturating_div(2).max(min);
        } else if context.cpu_usage <= self.config.cpu_threshold_low {
            desired = desired.saturating_mul(2).min(max);
        }

        desired = desired.clamp(min, max);
        desired.clamp(1, context.available_cpus.max(1))
    }
}

impl ConcurrencyPolicy for FixedConcurrency {
    fn name(&self) -> &str {
        "fixed"
    }

    fn calculate_concurrency(&self, _context: &ConcurrencyContext) -> usize {
        self.fixed.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpipe_core::config::ConcurrencyMode;

    fn context(cpu: f32, base: usize) -> ConcurrencyContext {
        ConcurrencyContext {
            cpu_usage: cpu,
            available_cpus: 8,
            memory_usage: 0.0,
            pending_tasks: 10,
            base_concurrency: base,
        }
    }

    fn adaptive() -> AdaptiveConcurrency {
        AdaptiveConcurrency::new(ConcurrencyConfig {
            strategy: ConcurrencyMode::Adaptive,
            min_concurrency: 2,
            max_concurrency: 8,
            base_concurrency: 4,
            cpu_threshold_low: 30.0,
            cpu_threshold_high: 80.0,
        })
    }

    #[test]
    fn adaptive_follows_cpu_load() {
        let policy = adaptive();
        assert_eq!(policy.calculate_concurrency(&context(10.0, 4)), 8);
        assert_eq!(policy.calculate_concurrency(&context(90.0, 4)), 2);
        assert_eq!(policy.calculate_concurrency(&context(50.0, 4)), 4);
    }

    #[test]
    fn adaptive_never_exceeds_available_cpus() {
        let policy = adaptive();
        let ctx = ConcurrencyContext {
            available_cpus: 3,
            ..context(5.0, 4)
        };
        assert_eq!(policy.calculate_concurrency(&ctx), 3);
    }

    #[test]
    fn fixed_ignores_load() {
        let policy = FixedConcurrency::new(3);
        assert_eq!(policy.calculate_concurrency(&context(0.0, 1)), 3);
        assert_eq!(policy.calculate_concurrency(&context(99.0, 8)), 3);
        assert_eq!(FixedConcurrency::new(0).calculate_concurrency(&context(0.0, 1)), 1);
    }
}
