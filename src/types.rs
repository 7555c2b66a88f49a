use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const STAGE_COUNT: usize = 3;

pub const DEFAULT_TICK_PERIOD_MS: u64 = 1000;
pub const DEFAULT_CUE_DURATION_MS: u64 = 2000; // alarm loop is cut after 2 seconds
pub const DEFAULT_LEAF_GRAMS: u32 = 4;
pub const MAX_LEAF_GRAMS: u32 = 40;
pub const WATER_ML_PER_4G_LEAF: u32 = 120;

/// Water to pour for a leaf amount, 120ml per 4g
pub fn water_volume_ml(leaf_grams: u32) -> u32 {
    WATER_ML_PER_4G_LEAF * leaf_grams.min(MAX_LEAF_GRAMS) / 4
}

/// One of the three infusions, in brewing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageId {
    First,
    Second,
    Third,
}

impl StageId {
    pub const ALL: [StageId; STAGE_COUNT] = [StageId::First, StageId::Second, StageId::Third];

    pub fn index(self) -> usize {
        match self {
            StageId::First => 0,
            StageId::Second => 1,
            StageId::Third => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<StageId> {
        Self::ALL.get(index).copied()
    }

    /// The stage that has to be done before this one opens up.
    pub fn previous(self) -> Option<StageId> {
        match self {
            StageId::First => None,
            StageId::Second => Some(StageId::First),
            StageId::Third => Some(StageId::Second),
        }
    }

    pub fn next(self) -> Option<StageId> {
        match self {
            StageId::First => Some(StageId::Second),
            StageId::Second => Some(StageId::Third),
            StageId::Third => None,
        }
    }

    pub fn profile(self) -> &'static StageProfile {
        &STAGE_PROFILES[self.index()]
    }

    pub fn duration_secs(self) -> u32 {
        self.profile().duration_secs
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProfile {
    pub id: StageId,
    pub label: &'static str,
    pub duration_secs: u32,
    pub temperature_c: u8,
    pub color: TeaColor,
}

// Indexed by StageId::index()
pub static STAGE_PROFILES: [StageProfile; STAGE_COUNT] = [
    StageProfile {
        id: StageId::First,
        label: "一煎目",
        duration_secs: 80,
        temperature_c: 70,
        color: TeaColor { r: 211, g: 196, b: 120 },
    },
    StageProfile {
        id: StageId::Second,
        label: "二煎目",
        duration_secs: 10,
        temperature_c: 80,
        color: TeaColor { r: 87, g: 87, b: 67 },
    },
    StageProfile {
        id: StageId::Third,
        label: "三煎目",
        duration_secs: 15,
        temperature_c: 85,
        color: TeaColor { r: 142, g: 142, b: 75 },
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_period_ms: u64,
    pub cue_duration_ms: u64,
    pub cue_sound: Option<PathBuf>,
    pub leaf_grams: u32,
    pub output: OutputFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            cue_duration_ms: DEFAULT_CUE_DURATION_MS,
            cue_sound: None,
            leaf_grams: DEFAULT_LEAF_GRAMS,
            output: OutputFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_table_is_indexed_by_stage() {
        for stage in StageId::ALL {
            assert_eq!(stage.profile().id, stage);
            assert_eq!(StageId::from_index(stage.index()), Some(stage));
        }
        assert_eq!(StageId::from_index(3), None);
    }

    #[test]
    fn test_stage_constants() {
        assert_eq!(StageId::First.duration_secs(), 80);
        assert_eq!(StageId::Second.duration_secs(), 10);
        assert_eq!(StageId::Third.duration_secs(), 15);
        assert_eq!(StageId::Third.profile().temperature_c, 85);
        assert_eq!(StageId::Second.to_string(), "二煎目");
    }

    #[test]
    fn test_stage_ordering() {
        assert_eq!(StageId::First.previous(), None);
        assert_eq!(StageId::Third.previous(), Some(StageId::Second));
        assert_eq!(StageId::Second.next(), Some(StageId::Third));
        assert_eq!(StageId::Third.next(), None);
        assert!(StageId::First < StageId::Third);
    }

    #[test]
    fn test_water_volume() {
        assert_eq!(water_volume_ml(4), 120);
        assert_eq!(water_volume_ml(0), 0);
        assert_eq!(water_volume_ml(6), 180);
        assert_eq!(water_volume_ml(41), 1200);
    }
}
