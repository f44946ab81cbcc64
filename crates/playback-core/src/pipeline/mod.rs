//! Playback pipeline collaborators and the controller that sequences them.
//!
//! The pipeline itself, the demuxer, and renderers are owned elsewhere; this
//! module only describes what the controller needs from them.

pub mod controller;
pub mod types;

use std::rc::Rc;
use std::time::Duration;

pub use controller::{ControllerCallbacks, PipelineController, WeakPipelineController};
pub use types::{PipelineResult, PipelineStatus, State, StatusCallback};

/// A playback pipeline that runs one asynchronous operation at a time.
///
/// Every operation completes through its `done` callback exactly once. The
/// callback may run before the call returns.
pub trait Pipeline {
    fn start(
        &self,
        demuxer: Rc<dyn Demuxer>,
        renderer: Box<dyn Renderer>,
        client: Rc<dyn PipelineClient>,
        done: StatusCallback,
    );

    fn seek(&self, time: Duration, done: StatusCallback);

    /// Tear down the renderer but keep the demuxer.
    fn suspend(&self, done: StatusCallback);

    fn resume(&self, renderer: Box<dyn Renderer>, time: Duration, done: StatusCallback);

    /// Stop immediately. Operations already in flight may still report back.
    fn stop(&self);

    fn media_time(&self) -> Duration;
}

/// Data source seek bracketing.
pub trait Demuxer {
    /// A pipeline seek to `time` is about to be issued.
    fn start_waiting_for_seek(&self, time: Duration);

    /// The seek announced by `start_waiting_for_seek` will not happen.
    fn cancel_pending_seek(&self, time: Duration);
}

/// Opaque decode/render stage handed to the pipeline.
pub trait Renderer {
    fn name(&self) -> &str;
}

/// Pipeline event sink, passed through on start.
pub trait PipelineClient {
    fn on_error(&self, _status: PipelineStatus) {}
    fn on_ended(&self) {}
    fn on_duration_change(&self, _duration: Duration) {}
}

/// Builds a fresh renderer for every start and resume.
pub type RendererFactory = Box<dyn Fn() -> Box<dyn Renderer>>;
