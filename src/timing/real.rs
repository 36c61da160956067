use super::Phase;
use std::time::{Duration, Instant};

/// Timer that tracks elapsed time when timing is enabled.
pub struct Timer(Instant);

impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// Phase totals for one backend run.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    pub distribute: Duration,
    pub compute: Duration,
    pub collect: Duration,
    pub total: Duration,
}

impl PhaseTimings {
    pub fn report(&self, backend: &str, n: usize) {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let pct = |d: Duration| {
            if self.total.as_nanos() == 0 {
                0.0
            } else {
                d.as_secs_f64() / self.total.as_secs_f64() * 100.0
            }
        };

        eprintln!("timing backend={} n={}", backend, n);
        eprintln!("  distribute: {:9.3}ms ({:4.1}%)", ms(self.distribute), pct(self.distribute));
        eprintln!("  compute:    {:9.3}ms ({:4.1}%)", ms(self.compute), pct(self.compute));
        eprintln!("  collect:    {:9.3}ms ({:4.1}%)", ms(self.collect), pct(self.collect));
        eprintln!("  total:      {:9.3}ms", ms(self.total));
    }
}

/// Accumulates phase durations, then produces `PhaseTimings`.
pub struct TimingBuilder {
    start: Instant,
    timings: PhaseTimings,
}

impl TimingBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            timings: PhaseTimings::default(),
        }
    }

    #[inline]
    pub fn set(&mut self, phase: Phase, d: Duration) {
        match phase {
            Phase::Distribute => self.timings.distribute = d,
            Phase::Compute => self.timings.compute = d,
            Phase::Collect => self.timings.collect = d,
        }
    }

    #[inline]
    pub fn finish(mut self) -> PhaseTimings {
        self.timings.total = self.start.elapsed();
        self.timings
    }
}
