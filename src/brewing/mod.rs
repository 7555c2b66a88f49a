pub mod controller;
pub mod stage;
pub mod ticks;

pub use controller::*;
pub use stage::*;
pub use ticks::*;
