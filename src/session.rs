//! Brew session event loop
//! Multiplexes user intents, stage ticks and alarm expiry onto one task

use crate::brewing::{BrewAction, BrewController, Tick, TickScheduler};
use crate::hardware::cue::CompletionCue;
use crate::system::events::BrewEvent;
use crate::types::{SessionConfig, StageId};
use embassy_futures::select::{select3, Either3};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Instant, Timer};
use log::{debug, info};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// What the presentation layer can ask of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Tap on a stage: begins it when idle, finishes it early when running
    Tap(StageId),
    /// Step the leaf amount up or down by this many grams
    AdjustLeaf(i32),
    ResetAll,
    StopCue,
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised command {0:?} (expected 1, 2, 3, +, -, r, s or q)")]
pub struct ParseIntentError(String);

impl FromStr for Intent {
    type Err = ParseIntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Intent::Tap(StageId::First)),
            "2" => Ok(Intent::Tap(StageId::Second)),
            "3" => Ok(Intent::Tap(StageId::Third)),
            "+" => Ok(Intent::AdjustLeaf(1)),
            "-" => Ok(Intent::AdjustLeaf(-1)),
            "r" | "reset" => Ok(Intent::ResetAll),
            "s" | "stop" => Ok(Intent::StopCue),
            "q" | "quit" => Ok(Intent::Shutdown),
            other => Err(ParseIntentError(other.to_string())),
        }
    }
}

pub type IntentChannel = Channel<CriticalSectionRawMutex, Intent, 8>;

pub struct BrewSession<'a, C: CompletionCue> {
    id: Uuid,
    controller: BrewController<'a, C>,
    ticks: TickScheduler,
    intents: &'a IntentChannel,
}

impl<'a, C: CompletionCue> BrewSession<'a, C> {
    pub fn new(
        controller: BrewController<'a, C>,
        config: &SessionConfig,
        intents: &'a IntentChannel,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(
            "Brew session {} created (tick period {}ms)",
            id, config.tick_period_ms
        );
        Self {
            id,
            controller,
            ticks: TickScheduler::new(config.tick_period()),
            intents,
        }
    }

    pub fn controller(&self) -> &BrewController<'a, C> {
        &self.controller
    }

    pub fn ticks(&self) -> &TickScheduler {
        &self.ticks
    }

    /// Apply one user intent. Returns false once the session should stop.
    pub fn handle_intent(&mut self, intent: Intent, now: Instant) -> bool {
        debug!("Session {}: intent {:?}", self.id, intent);

        let events = match intent {
            Intent::Tap(stage) => {
                if !self.controller.is_interactable(stage) {
                    if let Some(previous) = stage.previous() {
                        info!("{} is locked until {} is done", stage, previous);
                    }
                    return true;
                }
                self.controller.dispatch(stage, BrewAction::AdvanceOrSkip)
            }
            Intent::AdjustLeaf(delta) => self.controller.adjust_leaf(delta),
            Intent::ResetAll => self.controller.reset_all(),
            Intent::StopCue => {
                self.controller.cue_mut().stop();
                return true;
            }
            Intent::Shutdown => return false,
        };

        self.follow(&events, now);
        true
    }

    /// Deliver a tick unless its source was cancelled in the meantime
    pub fn handle_tick(&mut self, tick: Tick, now: Instant) {
        if !self.ticks.is_live(&tick) {
            debug!("Dropping stale tick for {:?}", tick.stage);
            return;
        }

        let events = self.controller.tick(tick.stage);
        self.follow(&events, now);
    }

    // Keep tick sources in step with stage phases
    fn follow(&mut self, events: &[BrewEvent], now: Instant) {
        for event in events {
            match event {
                BrewEvent::StageStarted { stage } => self.ticks.arm(*stage, now),
                BrewEvent::StageCompleted { stage, .. } => {
                    self.ticks.cancel(*stage);
                }
                BrewEvent::SessionReset => self.ticks.cancel_all(),
                BrewEvent::StageTicked { .. } | BrewEvent::LeafAmountChanged { .. } => {}
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.ticks.cancel_all();
        self.controller.cue_mut().stop();
        info!("Brew session {} shut down", self.id);
    }

    pub async fn run(&mut self) {
        info!("Brew session {} running", self.id);

        loop {
            let cue_deadline = self.controller.cue().deadline();
            let cue_expiry = async move {
                match cue_deadline {
                    Some(at) => Timer::at(at).await,
                    None => core::future::pending::<()>().await,
                }
            };

            let outcome = select3(self.intents.receive(), self.ticks.next_tick(), cue_expiry).await;

            match outcome {
                Either3::First(intent) => {
                    if !self.handle_intent(intent, Instant::now()) {
                        break;
                    }
                }
                Either3::Second(tick) => self.handle_tick(tick, Instant::now()),
                Either3::Third(()) => self.controller.cue_mut().expire(Instant::now()),
            }

            // Let futures sharing this task, such as a renderer, drain the bus between steps
            embassy_futures::yield_now().await;
        }

        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::cue::testing::RecordingCue;
    use crate::system::events::EventBus;
    use crate::types::Phase;
    use embassy_futures::{block_on, join::join};
    use embassy_time::Duration;

    fn config() -> SessionConfig {
        SessionConfig {
            tick_period_ms: 1000,
            ..SessionConfig::default()
        }
    }

    fn drain_ticks(session: &mut BrewSession<'_, RecordingCue>, until: Instant) -> usize {
        let mut delivered = 0;
        while let Some(tick) = session.ticks.poll_due(until) {
            session.handle_tick(tick, until);
            delivered += 1;
        }
        delivered
    }

    #[test]
    fn test_parse_intents() {
        assert_eq!("2".parse::<Intent>(), Ok(Intent::Tap(StageId::Second)));
        assert_eq!(" r\n".parse::<Intent>(), Ok(Intent::ResetAll));
        assert_eq!("quit".parse::<Intent>(), Ok(Intent::Shutdown));
        assert_eq!("+".parse::<Intent>(), Ok(Intent::AdjustLeaf(1)));
        assert_eq!("-".parse::<Intent>(), Ok(Intent::AdjustLeaf(-1)));
        assert!("4".parse::<Intent>().is_err());
    }

    #[test]
    fn test_tap_arms_ticks_and_completion_cancels() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        assert!(session.handle_intent(Intent::Tap(StageId::Second), start));
        assert_eq!(session.ticks().armed_count(), 0);

        session.handle_intent(Intent::Tap(StageId::First), start);
        assert!(session.ticks().is_armed(StageId::First));

        let delivered = drain_ticks(&mut session, start + Duration::from_secs(200));
        assert_eq!(delivered, 80);
        assert_eq!(session.controller().stage(StageId::First).phase(), Phase::Done);
        assert_eq!(session.ticks().armed_count(), 0);
        assert_eq!(session.controller().cue().played, vec![StageId::First]);
    }

    #[test]
    fn test_tick_after_skip_is_stale() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        session.handle_intent(Intent::Tap(StageId::First), start);
        let tick = session.ticks.poll_due(start + Duration::from_secs(1)).unwrap();
        session.handle_intent(Intent::Tap(StageId::First), start + Duration::from_secs(1));
        assert!(!session.ticks().is_armed(StageId::First));

        session.handle_tick(tick, start + Duration::from_secs(1));
        let first = session.controller().stage(StageId::First);
        assert_eq!(first.elapsed_secs(), 0);
        assert!(first.completed_by_skip());
        assert!(session.controller().cue().played.is_empty());
    }

    #[test]
    fn test_reset_cancels_every_tick_source() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        session.handle_intent(Intent::Tap(StageId::First), start);
        drain_ticks(&mut session, start + Duration::from_secs(5));
        let live = session.ticks.poll_due(start + Duration::from_secs(6)).unwrap();

        session.handle_intent(Intent::ResetAll, start + Duration::from_secs(6));
        assert_eq!(session.ticks().armed_count(), 0);

        session.handle_tick(live, start + Duration::from_secs(6));
        assert_eq!(session.controller().stage(StageId::First).phase(), Phase::Idle);
        assert_eq!(session.controller().stage(StageId::First).elapsed_secs(), 0);
    }

    #[test]
    fn test_locked_tap_changes_nothing() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        assert!(session.handle_intent(Intent::Tap(StageId::Third), start));
        assert_eq!(session.controller().phases(), [Phase::Idle; 3]);
        assert_eq!(session.ticks().armed_count(), 0);
    }

    #[test]
    fn test_leaf_intent_reaches_controller() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        session.handle_intent(Intent::AdjustLeaf(1), start);
        session.handle_intent(Intent::AdjustLeaf(1), start);
        session.handle_intent(Intent::AdjustLeaf(-1), start);
        assert_eq!(session.controller().leaf_grams(), 5);
        assert_eq!(session.ticks().armed_count(), 0);
    }

    #[test]
    fn test_shutdown_intent_stops_everything() {
        let intents = IntentChannel::new();
        let mut session = BrewSession::new(BrewController::new(RecordingCue::default()), &config(), &intents);
        let start = Instant::from_secs(0);

        session.handle_intent(Intent::Tap(StageId::First), start);
        assert!(!session.handle_intent(Intent::Shutdown, start));
        session.shutdown();
        assert_eq!(session.ticks().armed_count(), 0);
        assert!(session.controller().cue().stops > 0);
    }

    #[test]
    fn test_queued_intents_reach_early_subscriber() {
        let intents = IntentChannel::new();
        let bus = EventBus::new();
        let mut watcher = bus.subscriber().unwrap();

        let mut controller = BrewController::new(RecordingCue::default());
        controller.subscribe(bus.publisher());
        let mut session = BrewSession::new(controller, &config(), &intents);

        for intent in [
            Intent::Tap(StageId::First),
            Intent::Tap(StageId::First),
            Intent::Tap(StageId::Second),
            Intent::Shutdown,
        ] {
            intents.try_send(intent).unwrap();
        }
        block_on(session.run());

        let mut seen = Vec::new();
        while let Some(event) = watcher.try_next_event() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                BrewEvent::StageStarted { stage: StageId::First },
                BrewEvent::StageCompleted { stage: StageId::First, by_skip: true },
                BrewEvent::StageStarted { stage: StageId::Second },
            ]
        );
    }

    #[test]
    fn test_session_loop_runs_full_brew() {
        let intents = IntentChannel::new();
        let bus = EventBus::new();
        let mut watcher = bus.subscriber().unwrap();
        let config = SessionConfig {
            tick_period_ms: 1,
            cue_duration_ms: 5,
            ..SessionConfig::default()
        };

        let mut controller = BrewController::new(RecordingCue::default());
        controller.subscribe(bus.publisher());
        let mut session = BrewSession::new(controller, &config, &intents);

        let script = async {
            intents.send(Intent::Tap(StageId::First)).await;
            watcher
                .wait_for(|e| matches!(e, BrewEvent::StageCompleted { stage: StageId::First, by_skip: false }))
                .await;

            intents.send(Intent::Tap(StageId::Second)).await;
            intents.send(Intent::Tap(StageId::Second)).await;
            watcher
                .wait_for(|e| matches!(e, BrewEvent::StageCompleted { stage: StageId::Second, by_skip: true }))
                .await;

            intents.send(Intent::Tap(StageId::Third)).await;
            watcher
                .wait_for(|e| matches!(e, BrewEvent::StageCompleted { stage: StageId::Third, by_skip: false }))
                .await;

            // Give the alarm time to run out on its own before shutting down
            Timer::after(Duration::from_millis(60)).await;
            intents.send(Intent::Shutdown).await;
        };

        block_on(join(session.run(), script));

        assert!(session.controller().is_finished());
        assert_eq!(session.controller().cue().played, vec![StageId::First, StageId::Third]);
        assert_eq!(session.ticks().armed_count(), 0);
        assert!(!session.controller().cue().is_playing());
        // One stop from the alarm expiring inside the loop, one from shutdown
        assert!(session.controller().cue().stops >= 2);
    }
}
