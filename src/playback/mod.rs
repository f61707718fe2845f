pub mod queue;
pub mod sink;

pub use queue::{
    ClipSource, EnqueueMode, PlaybackEvent, PlaybackQueue, QueueEntry, QueueState, ReleaseGuard,
};
pub use sink::{AudioSink, PlaybackError, ScriptedSink, SinkEvent, SinkProbe, SpeakerSink};
