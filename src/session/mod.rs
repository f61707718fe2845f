pub mod config;
pub mod machine;
pub mod state;

pub use config::SessionConfig;
pub use machine::{SessionEvent, VoiceSession};
pub use state::{PermissionStatus, TransitionGraph, VoiceState};
