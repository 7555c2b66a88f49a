//! Per-infusion timer state machine
//! States: Idle, Running, Done

use crate::types::{Phase, StageId};
use log::{debug, info};
use statig::prelude::*;

// Input events to a stage timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    Start,
    Tick,
    Skip,
    Reset,
}

/// A stage reaching Done, either by running out its time or by being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub stage: StageId,
    pub by_skip: bool,
}

// Change events a stage timer reports back to its owner.
// Resets report nothing here; the owner announces them for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutput {
    Started { stage: StageId },
    Ticked { stage: StageId, elapsed_secs: u32 },
    Completed(Completion),
}

pub type StageOutputs = heapless::Vec<StageOutput, 4>;

#[derive(Debug)]
pub struct StageContext {
    stage: StageId,
    target_secs: u32,
    elapsed_secs: u32,
    completed_by_skip: bool,
    outputs: StageOutputs,
}

impl StageContext {
    fn new(stage: StageId) -> Self {
        Self {
            stage,
            target_secs: stage.duration_secs(),
            elapsed_secs: 0,
            completed_by_skip: false,
            outputs: heapless::Vec::new(),
        }
    }

    fn emit(&mut self, output: StageOutput) {
        // Every input produces at most one output, so the buffer never fills
        let _ = self.outputs.push(output);
    }

    fn clear(&mut self) {
        self.elapsed_secs = 0;
        self.completed_by_skip = false;
    }
}

#[derive(Debug, Default)]
pub struct StageMachine;

#[state_machine(initial = "State::idle()", state(derive(Debug, Clone, Copy, PartialEq, Eq)))]
impl StageMachine {
    /// Waiting for the user to begin this infusion
    #[state]
    fn idle(context: &mut StageContext, event: &StageInput) -> Response<State> {
        use Response::*;

        match event {
            StageInput::Start => {
                context.clear();
                context.emit(StageOutput::Started { stage: context.stage });
                Transition(State::running())
            }
            StageInput::Reset => {
                context.clear();
                Handled
            }
            StageInput::Skip => {
                debug!("{:?}: skip rejected, stage has not started", context.stage);
                Handled
            }
            StageInput::Tick => Handled,
        }
    }

    /// Counting whole seconds toward the stage duration
    #[state]
    fn running(context: &mut StageContext, event: &StageInput) -> Response<State> {
        use Response::*;

        match event {
            StageInput::Tick => {
                context.elapsed_secs = context.elapsed_secs.saturating_add(1);
                if context.elapsed_secs >= context.target_secs {
                    context.completed_by_skip = false;
                    context.emit(StageOutput::Completed(Completion {
                        stage: context.stage,
                        by_skip: false,
                    }));
                    return Transition(State::done());
                }
                context.emit(StageOutput::Ticked {
                    stage: context.stage,
                    elapsed_secs: context.elapsed_secs,
                });
                Handled
            }
            StageInput::Skip => {
                context.completed_by_skip = true;
                context.emit(StageOutput::Completed(Completion {
                    stage: context.stage,
                    by_skip: true,
                }));
                Transition(State::done())
            }
            StageInput::Reset => {
                context.clear();
                Transition(State::idle())
            }
            StageInput::Start => Handled,
        }
    }

    /// Finished until the whole session is reset
    #[state]
    fn done(context: &mut StageContext, event: &StageInput) -> Response<State> {
        use Response::*;

        match event {
            StageInput::Reset => {
                context.clear();
                Transition(State::idle())
            }
            StageInput::Start | StageInput::Tick | StageInput::Skip => Handled,
        }
    }
}

/// Timer for a single infusion.
pub struct StageTimer {
    machine: statig::prelude::StateMachine<StageMachine>,
    context: StageContext,
}

impl StageTimer {
    pub fn new(stage: StageId) -> Self {
        Self {
            machine: StageMachine::default().state_machine(),
            context: StageContext::new(stage),
        }
    }

    /// Feed one input through the machine and return the change it caused, if any
    pub fn handle_input(&mut self, input: StageInput) -> StageOutputs {
        self.context.outputs.clear();

        let previous_phase = self.phase();
        let _ = self.machine.handle_with_context(&input, &mut self.context);
        let new_phase = self.phase();

        if previous_phase != new_phase {
            info!(
                "{:?} stage: {:?} -> {:?} (elapsed {}s)",
                self.context.stage, previous_phase, new_phase, self.context.elapsed_secs
            );
        }

        std::mem::take(&mut self.context.outputs)
    }

    pub fn start(&mut self) -> StageOutputs {
        self.handle_input(StageInput::Start)
    }

    pub fn tick(&mut self) -> StageOutputs {
        self.handle_input(StageInput::Tick)
    }

    pub fn skip(&mut self) -> StageOutputs {
        self.handle_input(StageInput::Skip)
    }

    pub fn reset(&mut self) -> StageOutputs {
        self.handle_input(StageInput::Reset)
    }

    pub fn phase(&self) -> Phase {
        match self.machine.state() {
            State::Idle { .. } => Phase::Idle,
            State::Running { .. } => Phase::Running,
            State::Done { .. } => Phase::Done,
        }
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.context.elapsed_secs
    }

    pub fn remaining_secs(&self) -> u32 {
        self.context.target_secs.saturating_sub(self.context.elapsed_secs)
    }

    /// Only meaningful once the stage is Done.
    pub fn completed_by_skip(&self) -> bool {
        self.phase() == Phase::Done && self.context.completed_by_skip
    }
}
