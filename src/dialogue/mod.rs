pub mod emotion;
pub mod engine;
pub mod phase;
pub mod pools;
pub mod selector;
pub mod tools;

pub use engine::{CompanionReply, DialogueContext, DialogueEngine};
pub use phase::{phase_for, DialoguePhase};
pub use selector::{AntiRepeatPool, IndexSource, SeededPicker};
pub use tools::ToolSuggestion;
