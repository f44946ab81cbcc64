//! Serializes start/seek/suspend/resume requests against a pipeline that
//! accepts one operation at a time.
//!
//! Requests only record intent. `dispatch` looks at the recorded intent and
//! the current state and issues at most one operation; every completion
//! moves the state and dispatches again. Priority, first match wins:
//!
//! 1. pending suspend while playing: suspend
//! 2. pending resume while suspended: resume (at the pending seek time, or
//!    the current media time; streaming sources restart at zero)
//! 3. pending seek or suspend while the demuxer expects a seek: cancel that
//!    expectation and wait for the in-flight operation
//! 4. pending seek while playing: seek
//! 5. playing with a seek owed to the client: notify
//!
//! All decisions are taken under the `RefCell` borrow; collaborator calls
//! and client callbacks run after it is released, so any of them may call
//! back into the controller synchronously.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::types::{PipelineResult, PipelineStatus, State, StatusCallback};
use super::{Demuxer, Pipeline, PipelineClient, RendererFactory};

/// Client notifications.
pub struct ControllerCallbacks {
    /// The controller settled after a seek. The flag is set when any of the
    /// seeks asked for a client-visible time update.
    pub seeked: Box<dyn Fn(bool)>,
    /// The pipeline reached `Suspended`.
    pub suspended: Box<dyn Fn()>,
    /// An operation failed; sequencing has stopped.
    pub error: Box<dyn Fn(PipelineStatus)>,
}

impl Default for ControllerCallbacks {
    fn default() -> Self {
        Self {
            seeked: Box::new(|_| {}),
            suspended: Box::new(|| {}),
            error: Box::new(|_| {}),
        }
    }
}

/// What `dispatch` decided to do once the borrow is released.
enum Action {
    None,
    Suspend,
    Resume {
        time: Duration,
        demuxer: Rc<dyn Demuxer>,
    },
    CancelPendingSeek {
        time: Duration,
        demuxer: Rc<dyn Demuxer>,
    },
    Seek {
        time: Duration,
        demuxer: Rc<dyn Demuxer>,
    },
    NotifySeeked {
        time_updated: bool,
    },
}

#[derive(Default)]
struct Sequencer {
    state: State,
    demuxer: Option<Rc<dyn Demuxer>>,
    is_streaming: bool,
    is_static: bool,

    pending_seek: bool,
    pending_seek_time: Duration,
    pending_suspend: bool,
    pending_resume: bool,
    pending_seeked_cb: bool,
    pending_time_updated: bool,

    /// Target of the in-flight seek or resume.
    seek_time: Duration,
    waiting_for_seek: bool,
}

impl Sequencer {
    fn next_action(&mut self, pipeline: &dyn Pipeline) -> Action {
        if self.state == State::Stopped {
            return Action::None;
        }
        // Every rule that fires needs a started pipeline.
        let Some(demuxer) = self.demuxer.clone() else {
            return Action::None;
        };

        if self.pending_suspend && self.state == State::Playing {
            self.pending_suspend = false;
            self.state = State::Suspending;
            return Action::Suspend;
        }

        if self.pending_resume && self.state == State::Suspended {
            let mut time = if self.pending_seek {
                self.pending_seek = false;
                self.pending_seek_time
            } else {
                pipeline.media_time()
            };
            if self.is_streaming && !time.is_zero() {
                // Streaming sources can't seek; the client sees a jump to 0.
                time = Duration::ZERO;
                self.pending_seeked_cb = true;
                self.pending_time_updated = true;
            }

            debug_assert!(!self.waiting_for_seek);
            self.seek_time = time;
            self.waiting_for_seek = true;
            self.pending_resume = false;
            self.state = State::Resuming;
            return Action::Resume { time, demuxer };
        }

        if (self.pending_seek || self.pending_suspend) && self.waiting_for_seek {
            if !self.pending_seek {
                self.pending_seek = true;
                self.pending_seek_time = self.seek_time;
            }
            self.waiting_for_seek = false;
            return Action::CancelPendingSeek {
                time: self.pending_seek_time,
                demuxer,
            };
        }

        if self.pending_seek && self.state == State::Playing {
            let time = self.pending_seek_time;
            self.seek_time = time;
            self.waiting_for_seek = true;
            self.pending_seek = false;
            self.state = State::Seeking;
            return Action::Seek { time, demuxer };
        }

        if self.state == State::Playing && self.pending_seeked_cb {
            let time_updated = self.pending_time_updated;
            self.pending_seeked_cb = false;
            self.pending_time_updated = false;
            return Action::NotifySeeked { time_updated };
        }

        Action::None
    }

    fn clear_pending(&mut self) {
        self.pending_seek = false;
        self.pending_suspend = false;
        self.pending_resume = false;
        self.pending_seeked_cb = false;
        self.pending_time_updated = false;
        self.waiting_for_seek = false;
    }
}

struct Shared {
    pipeline: Rc<dyn Pipeline>,
    renderer_factory: RendererFactory,
    callbacks: ControllerCallbacks,
    seq: RefCell<Sequencer>,
}

/// Handle to a pipeline controller. Clones share the same controller.
#[derive(Clone)]
pub struct PipelineController {
    shared: Rc<Shared>,
}

/// Non-owning handle, for callbacks that need to call back in.
#[derive(Clone)]
pub struct WeakPipelineController {
    shared: Weak<Shared>,
}

impl WeakPipelineController {
    pub fn upgrade(&self) -> Option<PipelineController> {
        self.shared.upgrade().map(|shared| PipelineController { shared })
    }
}

impl PipelineController {
    pub fn new(
        pipeline: Rc<dyn Pipeline>,
        renderer_factory: RendererFactory,
        callbacks: ControllerCallbacks,
    ) -> Self {
        Self::new_cyclic(pipeline, renderer_factory, |_| callbacks)
    }

    /// Build the callbacks with a weak handle to the controller they belong
    /// to, so they can re-enter it.
    pub fn new_cyclic(
        pipeline: Rc<dyn Pipeline>,
        renderer_factory: RendererFactory,
        make_callbacks: impl FnOnce(&WeakPipelineController) -> ControllerCallbacks,
    ) -> Self {
        let shared = Rc::new_cyclic(|weak| {
            let handle = WeakPipelineController {
                shared: weak.clone(),
            };
            Shared {
                pipeline,
                renderer_factory,
                callbacks: make_callbacks(&handle),
                seq: RefCell::new(Sequencer::default()),
            }
        });
        Self { shared }
    }

    pub fn downgrade(&self) -> WeakPipelineController {
        WeakPipelineController {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Start the pipeline. Only valid once, from `Created`.
    pub fn start(
        &self,
        demuxer: Rc<dyn Demuxer>,
        client: Rc<dyn PipelineClient>,
        is_streaming: bool,
        is_static: bool,
    ) {
        {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                return;
            }
            debug_assert_eq!(seq.state, State::Created, "start() is only valid once");
            if seq.state != State::Created {
                log::error!("start() called while {}", seq.state);
                return;
            }
            seq.demuxer = Some(Rc::clone(&demuxer));
            seq.is_streaming = is_streaming;
            seq.is_static = is_static;
            seq.pending_seeked_cb = true;
            seq.state = State::Starting;
        }

        log::info!(
            "Starting pipeline (streaming={}, static={})",
            is_streaming,
            is_static
        );
        let renderer = (self.shared.renderer_factory)();
        self.shared
            .pipeline
            .start(demuxer, renderer, client, self.status_cb(State::Playing));
    }

    /// Seek to `time`. Overlapping seeks collapse to the last one; the seeked
    /// callback fires once when the controller settles.
    pub fn seek(&self, time: Duration, time_updated: bool) {
        {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                return;
            }
            seq.pending_seeked_cb = true;
            if time_updated {
                seq.pending_time_updated = true;
            }

            if matches!(seq.state, State::Seeking | State::Resuming)
                && seq.seek_time == time
                && seq.is_static
            {
                log::debug!("Seek to {:?} already in flight", time);
                seq.pending_seek = false;
                return;
            }

            seq.pending_seek_time = time;
            seq.pending_seek = true;
        }
        self.dispatch();
    }

    pub fn suspend(&self) {
        {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                return;
            }
            seq.pending_resume = false;
            if matches!(seq.state, State::Suspending | State::Suspended) {
                return;
            }
            seq.pending_suspend = true;
        }
        self.dispatch();
    }

    /// Resume a suspended (or suspending) pipeline. No-op otherwise.
    pub fn resume(&self) {
        {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                return;
            }
            seq.pending_suspend = false;
            if !matches!(seq.state, State::Suspending | State::Suspended) {
                return;
            }
            seq.pending_resume = true;
        }
        self.dispatch();
    }

    /// Stop for good. Completions of operations already issued are ignored.
    pub fn stop(&self) {
        let was_running = {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                return;
            }
            let was_running = seq.state != State::Created;
            seq.clear_pending();
            seq.demuxer = None;
            seq.state = State::Stopped;
            was_running
        };

        log::info!("Pipeline controller stopped");
        if was_running {
            self.shared.pipeline.stop();
        }
    }

    pub fn is_stable(&self) -> bool {
        self.shared.seq.borrow().state == State::Playing
    }

    /// Whether the requested target is suspended, regardless of progress.
    pub fn is_suspended(&self) -> bool {
        let seq = self.shared.seq.borrow();
        (seq.pending_suspend || matches!(seq.state, State::Suspending | State::Suspended))
            && !seq.pending_resume
    }

    pub fn is_pipeline_suspended(&self) -> bool {
        self.shared.seq.borrow().state == State::Suspended
    }

    pub fn is_pipeline_running(&self) -> bool {
        !matches!(self.state(), State::Created | State::Stopped)
    }

    pub fn state(&self) -> State {
        self.shared.seq.borrow().state
    }

    fn status_cb(&self, target: State) -> StatusCallback {
        let weak = Rc::downgrade(&self.shared);
        Box::new(move |result| {
            if let Some(shared) = weak.upgrade() {
                PipelineController { shared }.on_pipeline_status(target, result);
            }
        })
    }

    fn on_pipeline_status(&self, target: State, result: PipelineResult) {
        let reached_suspended = {
            let mut seq = self.shared.seq.borrow_mut();
            if seq.state == State::Stopped {
                log::debug!("Ignoring completion towards {} after stop", target);
                return;
            }
            match result {
                Ok(()) => {
                    log::debug!("Pipeline {} -> {}", seq.state, target);
                    seq.state = target;
                    if target == State::Playing {
                        seq.waiting_for_seek = false;
                    }
                    Ok(target == State::Suspended)
                }
                Err(status) => Err(status),
            }
        };

        match reached_suspended {
            Err(status) => {
                log::error!("Pipeline operation towards {} failed: {}", target, status);
                (self.shared.callbacks.error)(status);
                return;
            }
            Ok(true) => (self.shared.callbacks.suspended)(),
            Ok(false) => {}
        }
        self.dispatch();
    }

    fn dispatch(&self) {
        let action = self
            .shared
            .seq
            .borrow_mut()
            .next_action(self.shared.pipeline.as_ref());
        self.perform(action);
    }

    fn perform(&self, action: Action) {
        let pipeline = &self.shared.pipeline;
        match action {
            Action::None => {}
            Action::Suspend => {
                log::debug!("Suspending pipeline");
                pipeline.suspend(self.status_cb(State::Suspended));
            }
            Action::Resume { time, demuxer } => {
                log::debug!("Resuming pipeline at {:?}", time);
                demuxer.start_waiting_for_seek(time);
                let renderer = (self.shared.renderer_factory)();
                pipeline.resume(renderer, time, self.status_cb(State::Playing));
            }
            Action::CancelPendingSeek { time, demuxer } => {
                log::debug!("Cancelling demuxer seek, pending {:?}", time);
                demuxer.cancel_pending_seek(time);
            }
            Action::Seek { time, demuxer } => {
                log::debug!("Seeking pipeline to {:?}", time);
                demuxer.start_waiting_for_seek(time);
                pipeline.seek(time, self.status_cb(State::Playing));
            }
            Action::NotifySeeked { time_updated } => {
                (self.shared.callbacks.seeked)(time_updated);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::sim::{
        DemuxerCall, LoggingClient, PipelineCall, RecordingDemuxer, ScriptedPipeline,
        renderer_factory,
    };

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    struct Harness {
        pipeline: Rc<ScriptedPipeline>,
        demuxer: Rc<RecordingDemuxer>,
        controller: PipelineController,
        seeked: Rc<RefCell<Vec<bool>>>,
        suspended: Rc<Cell<usize>>,
        errors: Rc<RefCell<Vec<PipelineStatus>>>,
    }

    impl Harness {
        fn new() -> Self {
            let pipeline = ScriptedPipeline::new();
            let seeked = Rc::new(RefCell::new(Vec::new()));
            let suspended = Rc::new(Cell::new(0));
            let errors = Rc::new(RefCell::new(Vec::new()));

            let callbacks = {
                let seeked = Rc::clone(&seeked);
                let suspended = Rc::clone(&suspended);
                let errors = Rc::clone(&errors);
                ControllerCallbacks {
                    seeked: Box::new(move |updated| seeked.borrow_mut().push(updated)),
                    suspended: Box::new(move || suspended.set(suspended.get() + 1)),
                    error: Box::new(move |status| errors.borrow_mut().push(status)),
                }
            };
            let controller =
                PipelineController::new(pipeline.clone(), renderer_factory("test"), callbacks);

            Self {
                pipeline,
                demuxer: RecordingDemuxer::new(),
                controller,
                seeked,
                suspended,
                errors,
            }
        }

        /// Started, settled, with the start's seeked notification consumed.
        fn started(is_streaming: bool, is_static: bool) -> Self {
            let h = Self::new();
            h.start(is_streaming, is_static);
            assert!(h.pipeline.complete_next(Ok(())));
            assert_eq!(h.take_seeked(), vec![false]);
            h.pipeline.take_calls();
            h.demuxer.take_calls();
            h
        }

        fn start(&self, is_streaming: bool, is_static: bool) {
            self.controller.start(
                self.demuxer.clone(),
                Rc::new(LoggingClient),
                is_streaming,
                is_static,
            );
        }

        fn take_seeked(&self) -> Vec<bool> {
            std::mem::take(&mut *self.seeked.borrow_mut())
        }
    }

    #[test]
    fn start_then_seek() {
        let h = Harness::new();
        assert!(!h.controller.is_pipeline_running());
        h.start(false, false);
        assert_eq!(h.controller.state(), State::Starting);
        assert!(matches!(h.pipeline.calls()[0], PipelineCall::Start { .. }));
        assert!(!h.controller.is_stable());

        h.pipeline.complete_next(Ok(()));
        assert!(h.controller.is_stable());
        assert!(h.controller.is_pipeline_running());
        assert_eq!(h.take_seeked(), vec![false]);

        h.controller.seek(secs(3), true);
        assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Seek(secs(3))));
        assert_eq!(h.demuxer.calls(), vec![DemuxerCall::StartWaitingForSeek(secs(3))]);
        assert!(!h.controller.is_stable());

        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.take_seeked(), vec![true]);
        assert!(h.controller.is_stable());
        assert_eq!(h.pipeline.pending_count(), 0);
    }

    #[test]
    fn suspend_then_resume_at_current_time() {
        let h = Harness::started(false, false);
        h.pipeline.set_media_time(secs(7));

        h.controller.suspend();
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Suspend]);
        assert!(h.controller.is_suspended());
        assert!(!h.controller.is_pipeline_suspended());

        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.suspended.get(), 1);
        assert!(h.controller.is_pipeline_suspended());

        h.controller.resume();
        assert_eq!(h.pipeline.calls().len(), 2);
        assert!(matches!(
            &h.pipeline.calls()[1],
            PipelineCall::Resume { time, .. } if *time == secs(7)
        ));
        assert_eq!(h.demuxer.calls(), vec![DemuxerCall::StartWaitingForSeek(secs(7))]);

        h.pipeline.complete_next(Ok(()));
        assert!(h.controller.is_stable());
        assert!(!h.controller.is_pipeline_suspended());
        assert!(h.take_seeked().is_empty());
    }

    #[test]
    fn suspend_during_seek_cancels_and_merges_into_resume() {
        let h = Harness::started(false, false);

        h.controller.seek(secs(5), false);
        h.controller.suspend();
        assert_eq!(
            h.demuxer.calls(),
            vec![
                DemuxerCall::StartWaitingForSeek(secs(5)),
                DemuxerCall::CancelPendingSeek(secs(5)),
            ]
        );
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Seek(secs(5))]);

        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Suspend));
        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.controller.state(), State::Suspended);
        assert_eq!(h.suspended.get(), 1);
        assert!(h.take_seeked().is_empty());

        h.controller.resume();
        assert!(matches!(
            h.pipeline.calls().last(),
            Some(PipelineCall::Resume { time, .. }) if *time == secs(5)
        ));
        h.pipeline.complete_next(Ok(()));
        assert!(h.controller.is_stable());
        assert_eq!(h.take_seeked(), vec![false]);
    }

    /// Started, then suspended with the media clock at `at`.
    fn suspended_at(is_static: bool, at: Duration) -> Harness {
        let h = Harness::started(false, is_static);
        h.pipeline.set_media_time(at);
        h.controller.suspend();
        assert!(h.pipeline.complete_next(Ok(())));
        assert!(h.controller.is_pipeline_suspended());
        h.pipeline.take_calls();
        h
    }

    fn resume_time(call: Option<&PipelineCall>) -> Option<Duration> {
        match call {
            Some(PipelineCall::Resume { time, .. }) => Some(*time),
            _ => None,
        }
    }

    #[test]
    fn static_source_elides_seek_to_resume_target() {
        let h = suspended_at(true, secs(7));
        h.controller.resume();
        h.controller.seek(secs(7), false);
        h.pipeline.run_until_idle();

        let calls = h.pipeline.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(resume_time(calls.first()), Some(secs(7)));
        assert_eq!(h.demuxer.calls(), vec![DemuxerCall::StartWaitingForSeek(secs(7))]);
        assert!(h.controller.is_stable());
        assert_eq!(h.take_seeked(), vec![false]);
    }

    #[test]
    fn suspend_during_resume_cancels_and_resumes_at_same_time() {
        let h = suspended_at(false, secs(7));
        h.controller.resume();
        assert_eq!(h.demuxer.pending_expectations(), 1);

        h.controller.suspend();
        assert_eq!(
            h.demuxer.calls(),
            vec![
                DemuxerCall::StartWaitingForSeek(secs(7)),
                DemuxerCall::CancelPendingSeek(secs(7)),
            ]
        );
        assert_eq!(h.demuxer.pending_expectations(), 0);
        assert!(h.controller.is_suspended());

        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Suspend));
        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.suspended.get(), 2);

        // The cancelled resume target wins over the media clock.
        h.pipeline.set_media_time(secs(20));
        h.controller.resume();
        assert_eq!(resume_time(h.pipeline.calls().last()), Some(secs(7)));
        assert_eq!(h.demuxer.calls().last(), Some(&DemuxerCall::StartWaitingForSeek(secs(7))));
        assert_eq!(h.demuxer.pending_expectations(), 1);

        h.pipeline.complete_next(Ok(()));
        assert!(h.controller.is_stable());
        assert_eq!(h.pipeline.calls().len(), 3);
    }

    #[test]
    fn at_most_one_operation_in_flight() {
        let h = Harness::new();
        h.start(false, false);
        h.controller.seek(secs(1), false);
        h.controller.suspend();
        h.controller.seek(secs(2), true);
        h.controller.resume();
        h.controller.suspend();
        h.controller.seek(secs(3), false);
        assert_eq!(h.pipeline.pending_count(), 1);

        h.pipeline.run_until_idle();
        assert_eq!(h.pipeline.peak_pending(), 1);
    }

    #[test]
    fn last_seek_wins() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(5), false);
        h.controller.seek(secs(10), false);
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Seek(secs(5))]);
        assert_eq!(
            h.demuxer.calls(),
            vec![
                DemuxerCall::StartWaitingForSeek(secs(5)),
                DemuxerCall::CancelPendingSeek(secs(10)),
            ]
        );
        assert_eq!(h.demuxer.pending_expectations(), 0);

        h.pipeline.run_until_idle();
        assert_eq!(
            h.pipeline.calls(),
            vec![PipelineCall::Seek(secs(5)), PipelineCall::Seek(secs(10))]
        );
        assert_eq!(h.pipeline.media_time(), secs(10));
        assert!(h.controller.is_stable());
        assert_eq!(h.take_seeked(), vec![false]);
    }

    #[test]
    fn static_source_elides_same_time_seek() {
        let h = Harness::started(false, true);
        h.controller.seek(secs(4), false);
        h.controller.seek(secs(4), false);
        h.pipeline.run_until_idle();
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Seek(secs(4))]);
        assert_eq!(h.demuxer.calls().len(), 1);
        assert_eq!(h.take_seeked(), vec![false]);
    }

    #[test]
    fn non_static_source_reissues_same_time_seek() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(4), false);
        h.controller.seek(secs(4), false);
        h.pipeline.run_until_idle();
        assert_eq!(
            h.pipeline.calls(),
            vec![PipelineCall::Seek(secs(4)), PipelineCall::Seek(secs(4))]
        );
        assert_eq!(h.take_seeked(), vec![false]);
    }

    #[test]
    fn static_elision_drops_superseded_seek() {
        let h = Harness::started(false, true);
        h.controller.seek(secs(4), false);
        h.controller.seek(secs(8), false);
        h.controller.seek(secs(4), false);
        h.pipeline.run_until_idle();
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Seek(secs(4))]);
        assert_eq!(h.pipeline.media_time(), secs(4));
    }

    #[test]
    fn streaming_resume_restarts_at_zero() {
        let h = Harness::started(true, false);
        h.pipeline.set_media_time(secs(12));
        h.controller.suspend();
        h.pipeline.complete_next(Ok(()));
        h.controller.resume();
        assert!(matches!(
            h.pipeline.calls().last(),
            Some(PipelineCall::Resume { time, .. }) if time.is_zero()
        ));
        assert_eq!(h.demuxer.calls(), vec![DemuxerCall::StartWaitingForSeek(Duration::ZERO)]);
        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.take_seeked(), vec![true]);
    }

    #[test]
    fn streaming_resume_at_zero_needs_no_notification() {
        let h = Harness::started(true, false);
        h.controller.suspend();
        h.pipeline.complete_next(Ok(()));
        h.controller.resume();
        h.pipeline.complete_next(Ok(()));
        assert!(h.controller.is_stable());
        assert!(h.take_seeked().is_empty());
    }

    #[test]
    fn one_seeked_notification_per_settle() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(1), true);
        h.controller.seek(secs(2), false);
        h.controller.seek(secs(3), false);
        h.pipeline.run_until_idle();
        assert_eq!(h.take_seeked(), vec![true]);

        h.controller.seek(secs(4), false);
        h.pipeline.run_until_idle();
        assert_eq!(h.take_seeked(), vec![false]);
    }

    #[test]
    fn seek_before_start_completes_runs_after() {
        let h = Harness::new();
        h.start(false, false);
        h.controller.seek(secs(6), true);
        assert_eq!(h.pipeline.calls().len(), 1);
        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Seek(secs(6))));
        h.pipeline.complete_next(Ok(()));
        // Start's owed notification merges with the seek's.
        assert_eq!(h.take_seeked(), vec![true]);
    }

    #[test]
    fn suspend_clears_pending_resume() {
        let h = Harness::started(false, false);
        h.controller.suspend();
        h.controller.resume();
        assert!(!h.controller.is_suspended());
        h.controller.suspend();
        assert!(h.controller.is_suspended());

        h.pipeline.run_until_idle();
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Suspend]);
        assert!(h.controller.is_pipeline_suspended());
    }

    #[test]
    fn resume_while_suspending_resumes_after() {
        let h = Harness::started(false, false);
        h.controller.suspend();
        h.controller.resume();
        h.pipeline.run_until_idle();
        assert_eq!(h.suspended.get(), 1);
        assert!(matches!(h.pipeline.calls().last(), Some(PipelineCall::Resume { .. })));
        assert!(h.controller.is_stable());
    }

    #[test]
    fn resume_while_playing_is_noop() {
        let h = Harness::started(false, false);
        h.controller.resume();
        assert!(h.pipeline.calls().is_empty());
        assert!(h.controller.is_stable());
    }

    #[test]
    fn suspend_twice_issues_once() {
        let h = Harness::started(false, false);
        h.controller.suspend();
        h.controller.suspend();
        h.pipeline.run_until_idle();
        h.controller.suspend();
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Suspend]);
    }

    #[test]
    fn renderer_created_for_start_and_each_resume() {
        let h = Harness::new();
        h.start(false, false);
        h.pipeline.complete_next(Ok(()));
        for _ in 0..2 {
            h.controller.suspend();
            h.pipeline.complete_next(Ok(()));
            h.controller.resume();
            h.pipeline.complete_next(Ok(()));
        }
        let renderers: Vec<String> = h
            .pipeline
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                PipelineCall::Start { renderer } | PipelineCall::Resume { renderer, .. } => Some(renderer),
                _ => None,
            })
            .collect();
        assert_eq!(renderers, vec!["test-1", "test-2", "test-3"]);
    }

    #[test]
    fn seeked_callback_can_seek_again() {
        let pipeline = ScriptedPipeline::new();
        let demuxer = RecordingDemuxer::new();
        let notified = Rc::new(RefCell::new(Vec::new()));

        let controller = {
            let notified = Rc::clone(&notified);
            PipelineController::new_cyclic(pipeline.clone(), renderer_factory("r"), move |weak| {
                let weak = weak.clone();
                ControllerCallbacks {
                    seeked: Box::new(move |updated| {
                        let first = notified.borrow().is_empty();
                        notified.borrow_mut().push(updated);
                        if first && let Some(controller) = weak.upgrade() {
                            controller.seek(secs(9), true);
                        }
                    }),
                    ..ControllerCallbacks::default()
                }
            })
        };

        controller.start(demuxer.clone(), Rc::new(LoggingClient), false, false);
        h_complete(&pipeline);
        // The start notification issued a seek from inside the callback.
        assert_eq!(pipeline.calls().last(), Some(&PipelineCall::Seek(secs(9))));
        h_complete(&pipeline);
        assert_eq!(*notified.borrow(), vec![false, true]);
        assert!(controller.is_stable());
    }

    fn h_complete(pipeline: &ScriptedPipeline) {
        assert!(pipeline.complete_next(Ok(())));
    }

    #[test]
    fn synchronous_completions() {
        let h = Harness::new();
        h.pipeline.set_auto_complete(true);
        h.start(false, false);
        assert!(h.controller.is_stable());
        h.controller.seek(secs(2), true);
        assert!(h.controller.is_stable());
        h.controller.suspend();
        assert!(h.controller.is_pipeline_suspended());
        h.controller.resume();
        assert!(h.controller.is_stable());

        assert_eq!(h.take_seeked(), vec![false, true]);
        assert_eq!(h.suspended.get(), 1);
        assert_eq!(h.pipeline.calls().len(), 4);
        assert_eq!(h.pipeline.peak_pending(), 1);
    }

    #[test]
    fn error_stops_sequencing() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(3), false);
        h.controller.suspend();
        h.pipeline.complete_next(Err(PipelineStatus::Decode));

        assert_eq!(*h.errors.borrow(), vec![PipelineStatus::Decode]);
        assert_eq!(h.pipeline.calls(), vec![PipelineCall::Seek(secs(3))]);
        assert_eq!(h.controller.state(), State::Seeking);
        assert!(h.take_seeked().is_empty());
    }

    #[test]
    fn start_failure_reports_error() {
        let h = Harness::new();
        h.start(false, false);
        h.pipeline.complete_next(Err(PipelineStatus::DemuxerCouldNotOpen));
        assert_eq!(*h.errors.borrow(), vec![PipelineStatus::DemuxerCouldNotOpen]);
        assert!(!h.controller.is_stable());
        assert!(h.take_seeked().is_empty());
    }

    #[test]
    fn stop_ignores_late_completion() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(3), false);
        h.controller.stop();
        assert_eq!(h.controller.state(), State::Stopped);
        assert!(!h.controller.is_pipeline_running());
        assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Stop));

        h.pipeline.complete_next(Ok(()));
        assert_eq!(h.controller.state(), State::Stopped);
        assert!(h.take_seeked().is_empty());

        h.controller.seek(secs(4), false);
        h.controller.suspend();
        assert_eq!(h.pipeline.calls().len(), 2);
    }

    #[test]
    fn stop_before_start_skips_pipeline() {
        let h = Harness::new();
        h.controller.stop();
        assert!(h.pipeline.calls().is_empty());
        h.start(false, false);
        assert!(h.pipeline.calls().is_empty());
    }

    #[test]
    fn completion_after_drop_is_ignored() {
        let h = Harness::started(false, false);
        h.controller.seek(secs(3), false);
        let weak = h.controller.downgrade();
        let Harness {
            pipeline,
            controller,
            seeked,
            ..
        } = h;
        drop(controller);
        assert!(weak.upgrade().is_none());
        assert!(pipeline.complete_next(Ok(())));
        assert!(seeked.borrow().is_empty());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "start() is only valid once")]
    fn start_twice_panics_in_debug() {
        let h = Harness::new();
        h.start(false, false);
        h.start(false, false);
    }
}
