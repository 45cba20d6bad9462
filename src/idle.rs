//! Idle-time housekeeping: benchmark refresh and filter reseed timers.

/// What the sensor should do on this idle tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleActions {
    pub refresh_benchmark: bool,
    pub reset_filter: bool,
}

/// Two independent idle counters, both cleared by any touch.
///
/// Counters start saturated so the first idle tick after creation
/// refreshes benchmarks and reseeds the filter.
#[derive(Debug, Clone)]
pub struct IdleManager {
    benchmark_ticks: u32,
    benchmark_count: u32,
    reset_ticks: u32,
    reset_count: u32,
}

impl IdleManager {
    pub fn new(benchmark_ticks: u32, reset_ticks: u32) -> Self {
        Self {
            benchmark_ticks,
            benchmark_count: benchmark_ticks,
            reset_ticks,
            reset_count: reset_ticks,
        }
    }

    pub fn touched(&mut self) {
        self.benchmark_count = 0;
        self.reset_count = 0;
    }

    pub fn idle_tick(&mut self) -> IdleActions {
        let mut actions = IdleActions::default();

        self.benchmark_count = self.benchmark_count.saturating_add(1);
        if self.benchmark_count >= self.benchmark_ticks {
            self.benchmark_count = 0;
            actions.refresh_benchmark = true;
        }

        self.reset_count = self.reset_count.saturating_add(1);
        if self.reset_count >= self.reset_ticks {
            self.reset_count = 0;
            actions.reset_filter = true;
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_idle_tick_fires_both() {
        let mut idle = IdleManager::new(25, 5);
        assert_eq!(
            idle.idle_tick(),
            IdleActions {
                refresh_benchmark: true,
                reset_filter: true
            }
        );
    }

    #[test]
    fn fires_after_n_idle_ticks_since_touch() {
        let mut idle = IdleManager::new(4, 2);
        idle.touched();
        let ticks: Vec<IdleActions> = (0..4).map(|_| idle.idle_tick()).collect();
        assert!(!ticks[0].reset_filter);
        assert!(ticks[1].reset_filter);
        assert!(!ticks[2].reset_filter);
        assert!(ticks[3].reset_filter);
        assert_eq!(
            ticks.iter().filter(|a| a.refresh_benchmark).count(),
            1
        );
        assert!(ticks[3].refresh_benchmark);
    }

    #[test]
    fn touch_restarts_the_count() {
        let mut idle = IdleManager::new(3, 3);
        idle.touched();
        idle.idle_tick();
        idle.idle_tick();
        idle.touched();
        assert_eq!(idle.idle_tick(), IdleActions::default());
    }

    #[test]
    fn zero_ticks_fires_every_idle_tick() {
        let mut idle = IdleManager::new(0, 0);
        idle.touched();
        assert!(idle.idle_tick().reset_filter);
        assert!(idle.idle_tick().refresh_benchmark);
    }
}
