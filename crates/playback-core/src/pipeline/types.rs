use std::fmt;

use thiserror::Error;

/// Controller lifecycle. `Playing` is the only stable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Created,
    Starting,
    Playing,
    Seeking,
    Suspending,
    Suspended,
    Resuming,
    /// Terminal; reached through `stop()`.
    Stopped,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Created => "created",
            State::Starting => "starting",
            State::Playing => "playing",
            State::Seeking => "seeking",
            State::Suspending => "suspending",
            State::Suspended => "suspended",
            State::Resuming => "resuming",
            State::Stopped => "stopped",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure codes a pipeline operation can complete with.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStatus {
    #[error("network error")]
    Network,
    #[error("decode error")]
    Decode,
    #[error("operation aborted")]
    Abort,
    #[error("pipeline initialization failed")]
    InitializationFailed,
    #[error("renderer could not render")]
    CouldNotRender,
    #[error("read error")]
    Read,
    #[error("operation invalid in the current pipeline state")]
    InvalidState,
    #[error("demuxer could not open the source")]
    DemuxerCouldNotOpen,
    #[error("demuxer could not parse the source")]
    DemuxerCouldNotParse,
    #[error("no supported streams")]
    DemuxerNoSupportedStreams,
    #[error("decryption failed")]
    Decrypt,
}

/// Outcome delivered to a status callback.
pub type PipelineResult = Result<(), PipelineStatus>;

/// Completion callback for one pipeline operation; called exactly once,
/// possibly before the issuing call returns.
pub type StatusCallback = Box<dyn FnOnce(PipelineResult)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(State::default(), State::Created);
        assert_eq!(State::Suspending.to_string(), "suspending");
    }

    #[test]
    fn status_display() {
        assert_eq!(PipelineStatus::Decode.to_string(), "decode error");
        let result: PipelineResult = Err(PipelineStatus::Network);
        assert!(result.is_err());
    }
}
