//! Wall-clock benchmarking under a time budget.

use std::time::{Duration, Instant};

/// Average per-call time over repeated timed batches.
///
/// The batch size doubles while a batch finishes faster than the clock can
/// reliably resolve, then stays put until the budget runs out. At least one
/// batch always runs.
#[derive(Debug, Clone)]
pub struct BenchmarkTimer {
    budget: Duration,
    rounds: usize,
}

const MIN_BATCH: Duration = Duration::from_micros(200);

impl BenchmarkTimer {
    pub fn new(budget_secs: f64) -> Self {
        let budget = if budget_secs.is_finite() && budget_secs > 0.0 {
            Duration::from_secs_f64(budget_secs)
        } else {
            Duration::ZERO
        };
        Self { budget, rounds: 0 }
    }

    /// Timed batches in the last `run`.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Seconds per call of `f`; always positive and finite.
    pub fn run(&mut self, mut f: impl FnMut()) -> f64 {
        let start = Instant::now();
        let mut loops = 1usize;
        let mut calls = 0usize;
        let mut total = Duration::ZERO;
        self.rounds = 0;

        loop {
            let t0 = Instant::now();
            for _ in 0..loops {
                f();
            }
            let elapsed = t0.elapsed();
            self.rounds += 1;
            calls += loops;
            total += elapsed;

            if start.elapsed() >= self.budget {
                break;
            }
            if elapsed < MIN_BATCH {
                loops = loops.saturating_mul(2);
            }
        }

        // A coarse clock can report zero for very cheap calls.
        (total.as_secs_f64() / calls as f64).max(1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_still_measures_once() {
        let mut calls = 0;
        let mut timer = BenchmarkTimer::new(0.0);
        let t = timer.run(|| calls += 1);
        assert_eq!(calls, 1);
        assert_eq!(timer.rounds(), 1);
        assert!(t > 0.0 && t.is_finite());
    }

    #[test]
    fn reports_the_average_not_the_fastest_call() {
        // Every other call sleeps 2ms, so the fastest call is near zero while
        // the average is at least 1ms.
        let mut calls = 0usize;
        let mut timer = BenchmarkTimer::new(0.03);
        let t = timer.run(|| {
            if calls % 2 == 0 {
                std::thread::sleep(Duration::from_millis(2));
            }
            calls += 1;
        });
        assert!(timer.rounds() >= 2);
        assert!(t >= 0.9e-3, "average {t}s per call");
    }
}
