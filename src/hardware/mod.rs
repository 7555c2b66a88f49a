pub mod cue;

pub use cue::*;
