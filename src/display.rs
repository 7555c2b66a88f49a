//! Text rendering for the console front end

use crate::brewing::is_interactable_in;
use crate::system::events::BrewEvent;
use crate::types::{water_volume_ml, Phase, StageId, TeaColor, STAGE_COUNT};

/// Positional remaining time: `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_remaining(secs: u32) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

pub fn stage_heading(stage: StageId) -> String {
    let profile = stage.profile();
    format!("{} {}℃", profile.label, profile.temperature_c)
}

pub fn leaf_line(leaf_grams: u32) -> String {
    format!("茶葉 {}g  湯の量 {}ml", leaf_grams, water_volume_ml(leaf_grams))
}

pub fn describe_event(event: &BrewEvent) -> String {
    match event {
        BrewEvent::StageStarted { stage } => format!(
            "{}  started  {}",
            stage_heading(*stage),
            format_remaining(stage.duration_secs())
        ),
        BrewEvent::StageTicked {
            stage,
            remaining_secs,
            ..
        } => format!("{}  {}", stage_heading(*stage), format_remaining(*remaining_secs)),
        BrewEvent::StageCompleted {
            stage,
            by_skip: false,
        } => format!("{}  終了", stage_heading(*stage)),
        BrewEvent::StageCompleted {
            stage,
            by_skip: true,
        } => format!("{}  終了 (skipped)", stage_heading(*stage)),
        BrewEvent::SessionReset => "リセット".to_string(),
        BrewEvent::LeafAmountChanged { leaf_grams, .. } => leaf_line(*leaf_grams),
    }
}

// 24-bit foreground colour
fn paint(color: TeaColor, text: &str) -> String {
    format!("\x1b[38;2;{};{};{}m{}\x1b[0m", color.r, color.g, color.b, text)
}

fn dim(text: &str) -> String {
    format!("\x1b[2m{}\x1b[0m", text)
}

/// Console picture of the session, kept in step by folding in bus events
#[derive(Debug)]
pub struct ConsoleView {
    phases: [Phase; STAGE_COUNT],
    leaf_grams: u32,
    color: bool,
}

impl ConsoleView {
    pub fn new(leaf_grams: u32, color: bool) -> Self {
        Self {
            phases: [Phase::Idle; STAGE_COUNT],
            leaf_grams,
            color,
        }
    }

    pub fn phases(&self) -> [Phase; STAGE_COUNT] {
        self.phases
    }

    pub fn leaf_grams(&self) -> u32 {
        self.leaf_grams
    }

    pub fn header(&self) -> Vec<String> {
        vec![
            leaf_line(self.leaf_grams),
            self.status_line(),
            "tap a stage with 1/2/3, +/- changes the leaf amount, r resets, s silences the alarm, q quits"
                .to_string(),
        ]
    }

    /// One entry per stage. Locked stages are dimmed, open ones drawn in their tea colour.
    pub fn status_line(&self) -> String {
        let entries: Vec<String> = StageId::ALL
            .into_iter()
            .map(|stage| {
                let locked = !is_interactable_in(&self.phases, stage);
                let state = match self.phases[stage.index()] {
                    Phase::Idle if locked => "locked",
                    Phase::Idle => "ready",
                    Phase::Running => "brewing",
                    Phase::Done => "done",
                };
                let entry = format!("[{}] {} {}", stage.index() + 1, stage_heading(stage), state);
                match (self.color, locked) {
                    (false, _) => entry,
                    (true, true) => dim(&entry),
                    (true, false) => paint(stage.profile().color, &entry),
                }
            })
            .collect();
        entries.join("  ")
    }

    /// Fold one event into the view and return the lines to print for it
    pub fn apply(&mut self, event: &BrewEvent) -> Vec<String> {
        match event {
            BrewEvent::StageStarted { stage } => self.phases[stage.index()] = Phase::Running,
            BrewEvent::StageCompleted { stage, .. } => self.phases[stage.index()] = Phase::Done,
            BrewEvent::SessionReset => self.phases = [Phase::Idle; STAGE_COUNT],
            BrewEvent::LeafAmountChanged { leaf_grams, .. } => self.leaf_grams = *leaf_grams,
            BrewEvent::StageTicked { .. } => {}
        }

        let line = describe_event(event);
        let line = match event {
            BrewEvent::StageStarted { stage }
            | BrewEvent::StageTicked { stage, .. }
            | BrewEvent::StageCompleted { stage, .. }
                if self.color =>
            {
                paint(stage.profile().color, &line)
            }
            _ => line,
        };

        let mut lines = vec![line];
        if matches!(
            event,
            BrewEvent::StageCompleted { .. } | BrewEvent::SessionReset
        ) {
            lines.push(self.status_line());
        }
        lines
    }
}
