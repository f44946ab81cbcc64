use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::pipeline::{
    Demuxer, Pipeline, PipelineClient, PipelineResult, PipelineStatus, Renderer,
    RendererFactory, StatusCallback,
};

/// One call received by a [`ScriptedPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCall {
    Start { renderer: String },
    Seek(Duration),
    Suspend,
    Resume { renderer: String, time: Duration },
    Stop,
}

struct PendingOp {
    /// Media time reached if the operation succeeds.
    time: Option<Duration>,
    done: StatusCallback,
}

/// Pipeline whose operations complete when the driver says so.
///
/// Completions are queued in issue order. `stop()` is recorded but leaves
/// the queue alone so late completions can still be delivered.
#[derive(Default)]
pub struct ScriptedPipeline {
    calls: RefCell<Vec<PipelineCall>>,
    pending: RefCell<VecDeque<PendingOp>>,
    media_time: Cell<Duration>,
    auto_complete: Cell<bool>,
    in_flight: Cell<usize>,
    peak_pending: Cell<usize>,
}

impl ScriptedPipeline {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<PipelineCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<PipelineCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Most operations ever outstanding at once.
    pub fn peak_pending(&self) -> usize {
        self.peak_pending.get()
    }

    pub fn set_media_time(&self, time: Duration) {
        self.media_time.set(time);
    }

    /// Complete every operation successfully before the issuing call returns.
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.auto_complete.set(auto_complete);
    }

    /// Complete the oldest outstanding operation. Returns false if none.
    pub fn complete_next(&self, result: PipelineResult) -> bool {
        let Some(op) = self.pending.borrow_mut().pop_front() else {
            return false;
        };
        self.finish(op, result);
        true
    }

    /// Complete operations successfully until none are left.
    pub fn run_until_idle(&self) -> usize {
        let mut completed = 0;
        while self.complete_next(Ok(())) {
            completed += 1;
        }
        completed
    }

    fn finish(&self, op: PendingOp, result: PipelineResult) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        if let (Ok(()), Some(time)) = (&result, op.time) {
            self.media_time.set(time);
        }
        (op.done)(result);
    }

    fn issue(&self, call: PipelineCall, time: Option<Duration>, done: StatusCallback) {
        log::debug!("Pipeline call {:?}", call);
        self.calls.borrow_mut().push(call);
        let in_flight = self.in_flight.get() + 1;
        self.in_flight.set(in_flight);
        self.peak_pending.set(self.peak_pending.get().max(in_flight));

        let op = PendingOp { time, done };
        if self.auto_complete.get() {
            self.finish(op, Ok(()));
        } else {
            self.pending.borrow_mut().push_back(op);
        }
    }
}

impl Pipeline for ScriptedPipeline {
    fn start(
        &self,
        _demuxer: Rc<dyn Demuxer>,
        renderer: Box<dyn Renderer>,
        _client: Rc<dyn PipelineClient>,
        done: StatusCallback,
    ) {
        let renderer = renderer.name().to_string();
        self.issue(PipelineCall::Start { renderer }, None, done);
    }

    fn seek(&self, time: Duration, done: StatusCallback) {
        self.issue(PipelineCall::Seek(time), Some(time), done);
    }

    fn suspend(&self, done: StatusCallback) {
        self.issue(PipelineCall::Suspend, None, done);
    }

    fn resume(&self, renderer: Box<dyn Renderer>, time: Duration, done: StatusCallback) {
        let renderer = renderer.name().to_string();
        self.issue(PipelineCall::Resume { renderer, time }, Some(time), done);
    }

    fn stop(&self) {
        self.calls.borrow_mut().push(PipelineCall::Stop);
    }

    fn media_time(&self) -> Duration {
        self.media_time.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxerCall {
    StartWaitingForSeek(Duration),
    CancelPendingSeek(Duration),
}

#[derive(Default)]
pub struct RecordingDemuxer {
    calls: RefCell<Vec<DemuxerCall>>,
}

impl RecordingDemuxer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DemuxerCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<DemuxerCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    /// Announced seeks not yet cancelled. A new announcement replaces the
    /// previous one.
    pub fn pending_expectations(&self) -> usize {
        self.calls.borrow().iter().fold(0usize, |open, call| match call {
            DemuxerCall::StartWaitingForSeek(_) => 1,
            DemuxerCall::CancelPendingSeek(_) => open.saturating_sub(1),
        })
    }
}

impl Demuxer for RecordingDemuxer {
    fn start_waiting_for_seek(&self, time: Duration) {
        self.calls
            .borrow_mut()
            .push(DemuxerCall::StartWaitingForSeek(time));
    }

    fn cancel_pending_seek(&self, time: Duration) {
        self.calls
            .borrow_mut()
            .push(DemuxerCall::CancelPendingSeek(time));
    }
}

pub struct SimRenderer {
    name: String,
}

impl Renderer for SimRenderer {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory producing renderers named `{prefix}-1`, `{prefix}-2`, ...
pub fn renderer_factory(prefix: &str) -> RendererFactory {
    let prefix = prefix.to_string();
    let counter = Cell::new(0u32);
    Box::new(move || {
        counter.set(counter.get() + 1);
        Box::new(SimRenderer {
            name: format!("{}-{}", prefix, counter.get()),
        })
    })
}

/// Client that logs pipeline events.
pub struct LoggingClient;

impl PipelineClient for LoggingClient {
    fn on_error(&self, status: PipelineStatus) {
        log::error!("Pipeline error: {}", status);
    }

    fn on_ended(&self) {
        log::info!("Playback ended");
    }

    fn on_duration_change(&self, duration: Duration) {
        log::info!("Duration changed to {:.3}s", duration.as_secs_f64());
    }
}
