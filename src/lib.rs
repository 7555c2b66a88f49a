pub mod brewing;
pub mod display;
pub mod hardware;
pub mod session;
pub mod system;
pub mod types;

pub use brewing::*;
pub use session::*;
pub use types::*;
