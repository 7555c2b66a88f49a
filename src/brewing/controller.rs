//! Three gated infusions driven as one brew session

use crate::brewing::stage::{Completion, StageOutput, StageOutputs, StageTimer};
use crate::hardware::cue::CompletionCue;
use crate::system::events::{BrewEvent, BrewObserver};
use crate::types::{water_volume_ml, Phase, StageId, DEFAULT_LEAF_GRAMS, MAX_LEAF_GRAMS, STAGE_COUNT};
use log::{debug, info, warn};

/// What the user asked a stage to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrewAction {
    Start,
    /// Start an idle stage, finish a running one early
    AdvanceOrSkip,
    ResetAll,
}

pub type BrewEvents = heapless::Vec<BrewEvent, 4>;

/// Stage `i > 0` opens once stage `i - 1` is done. The first stage is always open.
pub fn is_interactable_in(phases: &[Phase; STAGE_COUNT], stage: StageId) -> bool {
    match stage.previous() {
        None => true,
        Some(previous) => phases[previous.index()] == Phase::Done,
    }
}

pub struct BrewController<'a, C: CompletionCue> {
    stages: [StageTimer; STAGE_COUNT],
    leaf_grams: u32,
    cue: C,
    observers: Vec<Box<dyn BrewObserver + 'a>>,
}

impl<'a, C: CompletionCue> BrewController<'a, C> {
    pub fn new(cue: C) -> Self {
        Self {
            stages: StageId::ALL.map(StageTimer::new),
            leaf_grams: DEFAULT_LEAF_GRAMS,
            cue,
            observers: Vec::new(),
        }
    }

    pub fn with_leaf_grams(mut self, grams: u32) -> Self {
        self.leaf_grams = grams.min(MAX_LEAF_GRAMS);
        self
    }

    pub fn subscribe<O>(&mut self, observer: O)
    where
        O: BrewObserver + 'a,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn stage(&self, stage: StageId) -> &StageTimer {
        &self.stages[stage.index()]
    }

    pub fn stages(&self) -> &[StageTimer; STAGE_COUNT] {
        &self.stages
    }

    pub fn phases(&self) -> [Phase; STAGE_COUNT] {
        StageId::ALL.map(|stage| self.stage(stage).phase())
    }

    pub fn is_interactable(&self, stage: StageId) -> bool {
        is_interactable_in(&self.phases(), stage)
    }

    /// The stage currently counting down, if any
    pub fn running_stage(&self) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .find(|&stage| self.stage(stage).phase() == Phase::Running)
    }

    /// Every stage done
    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(|timer| timer.phase() == Phase::Done)
    }

    pub fn leaf_grams(&self) -> u32 {
        self.leaf_grams
    }

    /// Step the leaf amount within 0..=40g. Nothing is announced when the clamp
    /// leaves the amount unchanged.
    pub fn adjust_leaf(&mut self, delta: i32) -> BrewEvents {
        let grams = self
            .leaf_grams
            .saturating_add_signed(delta)
            .min(MAX_LEAF_GRAMS);

        let mut events = BrewEvents::new();
        if grams == self.leaf_grams {
            return events;
        }

        self.leaf_grams = grams;
        debug!("Leaf amount set to {}g", grams);
        let _ = events.push(BrewEvent::LeafAmountChanged {
            leaf_grams: grams,
            water_ml: water_volume_ml(grams),
        });
        self.notify(&events);
        events
    }

    pub fn cue(&self) -> &C {
        &self.cue
    }

    pub fn cue_mut(&mut self) -> &mut C {
        &mut self.cue
    }

    /// Route a user action to a stage. Actions on a gated stage are dropped.
    pub fn dispatch(&mut self, stage: StageId, action: BrewAction) -> BrewEvents {
        if action == BrewAction::ResetAll {
            return self.reset_all();
        }

        if !self.is_interactable(stage) {
            debug!("{:?} on {:?} rejected: previous stage not done", action, stage);
            return BrewEvents::new();
        }

        let timer = &mut self.stages[stage.index()];
        let outputs = match (action, timer.phase()) {
            (BrewAction::AdvanceOrSkip, Phase::Running) => timer.skip(),
            (BrewAction::AdvanceOrSkip, Phase::Done) => StageOutputs::new(),
            _ => timer.start(),
        };

        self.forward(outputs)
    }

    /// Deliver one elapsed second to a stage. Ignored unless the stage is running.
    pub fn tick(&mut self, stage: StageId) -> BrewEvents {
        let outputs = self.stages[stage.index()].tick();
        if outputs.is_empty() {
            debug!("Tick for {:?} ignored, stage not running", stage);
        }
        self.forward(outputs)
    }

    /// Return every stage to Idle. Observers see a single `SessionReset` once all
    /// three stages are back at their initial state.
    pub fn reset_all(&mut self) -> BrewEvents {
        for timer in self.stages.iter_mut() {
            timer.reset();
        }
        self.cue.stop();
        info!("Brew session reset");

        let mut events = BrewEvents::new();
        let _ = events.push(BrewEvent::SessionReset);
        self.notify(&events);
        events
    }

    fn forward(&mut self, outputs: StageOutputs) -> BrewEvents {
        let mut events = BrewEvents::new();

        for output in outputs {
            let event = match output {
                StageOutput::Started { stage } => BrewEvent::StageStarted { stage },
                StageOutput::Ticked { stage, elapsed_secs } => BrewEvent::StageTicked {
                    stage,
                    elapsed_secs,
                    remaining_secs: self.stage(stage).remaining_secs(),
                },
                StageOutput::Completed(completion) => {
                    self.on_completion(completion);
                    BrewEvent::StageCompleted {
                        stage: completion.stage,
                        by_skip: completion.by_skip,
                    }
                }
            };
            let _ = events.push(event);
        }

        self.notify(&events);
        events
    }

    fn on_completion(&mut self, completion: Completion) {
        if completion.by_skip {
            info!("{:?} stage finished early", completion.stage);
            return;
        }

        info!("{:?} stage finished", completion.stage);
        if let Err(e) = self.cue.play(completion.stage) {
            warn!("Completion alarm for {:?} failed: {}", completion.stage, e);
        }
    }

    fn notify(&mut self, events: &BrewEvents) {
        for event in events {
            for observer in self.observers.iter_mut() {
                observer.on_brew_event(event);
            }
        }
    }
}
