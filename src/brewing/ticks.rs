//! Tick sources driving running stages forward, one per running stage

use crate::types::{StageId, STAGE_COUNT};
use embassy_time::{Duration, Instant, Timer};
use log::debug;

/// One elapsed period for a stage. `generation` identifies the source that fired it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub stage: StageId,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct TickSource {
    generation: u32,
    next_at: Instant,
}

pub struct TickScheduler {
    period: Duration,
    sources: [Option<TickSource>; STAGE_COUNT],
    generation: u32,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sources: [None; STAGE_COUNT],
            generation: 0,
        }
    }

    /// Start ticking a stage one period from `now`. Replaces any existing source.
    pub fn arm(&mut self, stage: StageId, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.sources[stage.index()] = Some(TickSource {
            generation: self.generation,
            next_at: now + self.period,
        });
        debug!("Tick source armed for {:?} (generation {})", stage, self.generation);
    }

    pub fn cancel(&mut self, stage: StageId) -> bool {
        let cancelled = self.sources[stage.index()].take().is_some();
        if cancelled {
            debug!("Tick source cancelled for {:?}", stage);
        }
        cancelled
    }

    pub fn cancel_all(&mut self) {
        for stage in StageId::ALL {
            self.cancel(stage);
        }
    }

    pub fn is_armed(&self, stage: StageId) -> bool {
        self.sources[stage.index()].is_some()
    }

    pub fn armed_count(&self) -> usize {
        self.sources.iter().flatten().count()
    }

    /// False once the source that produced this tick has been cancelled or re-armed
    pub fn is_live(&self, tick: &Tick) -> bool {
        self.sources[tick.stage.index()]
            .map(|source| source.generation == tick.generation)
            .unwrap_or(false)
    }

    /// Earliest pending tick across all armed sources
    pub fn next_deadline(&self) -> Option<(StageId, Instant)> {
        StageId::ALL
            .into_iter()
            .filter_map(|stage| self.sources[stage.index()].map(|s| (stage, s.next_at)))
            .min_by_key(|&(_, at)| at)
    }

    /// Fire the earliest source whose deadline has passed and schedule its next tick
    pub fn poll_due(&mut self, now: Instant) -> Option<Tick> {
        let (stage, at) = self.next_deadline()?;
        if at > now {
            return None;
        }

        let period = self.period;
        let source = self.sources[stage.index()].as_mut()?;
        source.next_at = source.next_at + period;
        Some(Tick {
            stage,
            generation: source.generation,
        })
    }

    /// Wait for the next tick. Never resolves while nothing is armed.
    pub async fn next_tick(&mut self) -> Tick {
        loop {
            match self.next_deadline() {
                Some((_, at)) => {
                    Timer::at(at).await;
                    if let Some(tick) = self.poll_due(Instant::now()) {
                        return tick;
                    }
                }
                None => core::future::pending::<()>().await,
            }
        }
    }
}
