//! Completion alarm played when an infusion runs out its time

use crate::types::StageId;
use embassy_time::{Duration, Instant};
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CueError {
    #[error("alarm sound not found at {0}")]
    ResourceMissing(PathBuf),
    #[error("failed to write alarm: {0}")]
    Output(#[from] std::io::Error),
}

/// Side channel for audible completion alerts.
///
/// The controller only ever calls `play` and `stop`; whether anything was heard has no
/// bearing on timer state. A cue stops itself once `deadline` passes.
pub trait CompletionCue {
    fn play(&mut self, stage: StageId) -> Result<(), CueError>;

    fn stop(&mut self);

    /// When the current cue stops on its own, if one is playing
    fn deadline(&self) -> Option<Instant>;

    fn is_playing(&self) -> bool {
        self.deadline().is_some()
    }

    fn expire(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline() {
            if now >= deadline {
                self.stop();
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Playback {
    stage: StageId,
    expires_at: Instant,
}

/// Rings the terminal bell. Holds a single playback slot: a new cue replaces the old one.
pub struct BellCue<W: Write> {
    out: W,
    sound: Option<PathBuf>,
    duration: Duration,
    playback: Option<Playback>,
}

impl<W: Write> BellCue<W> {
    pub fn new(out: W, duration: Duration) -> Self {
        Self {
            out,
            sound: None,
            duration,
            playback: None,
        }
    }

    /// Require an alarm resource to exist before each playback
    pub fn with_sound(mut self, sound: Option<PathBuf>) -> Self {
        self.sound = sound;
        self
    }

    pub fn playing_stage(&self) -> Option<StageId> {
        self.playback.map(|p| p.stage)
    }
}

impl<W: Write> CompletionCue for BellCue<W> {
    fn play(&mut self, stage: StageId) -> Result<(), CueError> {
        if let Some(previous) = self.playback.take() {
            debug!("Alarm for {:?} superseded by {:?}", previous.stage, stage);
        }

        if let Some(path) = &self.sound {
            if !path.is_file() {
                return Err(CueError::ResourceMissing(path.clone()));
            }
        }

        self.out.write_all(b"\x07")?;
        self.out.flush()?;

        self.playback = Some(Playback {
            stage,
            expires_at: Instant::now() + self.duration,
        });
        info!("Alarm playing for {:?} stage", stage);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(playback) = self.playback.take() {
            debug!("Alarm for {:?} stopped", playback.stage);
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.playback.map(|p| p.expires_at)
    }
}
