//! Per-player wiring of a pipeline controller and a resource updater, and a
//! registry for driving many players at once.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::media::{ExternalResources, GpuContext, ResourceProvider, VideoFrame, VideoResourceUpdater};
use crate::pipeline::PipelineController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    /// Frames the updater could not turn into resources.
    pub dropped: u64,
}

pub struct PlayerSession<P: ResourceProvider, G: GpuContext> {
    controller: PipelineController,
    updater: VideoResourceUpdater<P, G>,
    stats: FrameStats,
}

impl<P: ResourceProvider, G: GpuContext> PlayerSession<P, G> {
    pub fn new(controller: PipelineController, updater: VideoResourceUpdater<P, G>) -> Self {
        Self {
            controller,
            updater,
            stats: FrameStats::default(),
        }
    }

    pub fn controller(&self) -> &PipelineController {
        &self.controller
    }

    pub fn updater(&self) -> &VideoResourceUpdater<P, G> {
        &self.updater
    }

    pub fn updater_mut(&mut self) -> &mut VideoResourceUpdater<P, G> {
        &mut self.updater
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Hand a decoded frame to the updater. A `None` result counts as a
    /// dropped frame.
    pub fn present_frame(&mut self, frame: &Arc<VideoFrame>) -> ExternalResources {
        let resources = self.updater.create_external_resources_from_video_frame(frame);
        if resources.is_none() {
            self.stats.dropped += 1;
        } else {
            self.stats.presented += 1;
        }
        resources
    }
}

/// Players owned by one orchestrator, keyed by id.
pub struct PlayerRegistry<P: ResourceProvider, G: GpuContext> {
    sessions: FxHashMap<PlayerId, PlayerSession<P, G>>,
    next_id: u32,
}

impl<P: ResourceProvider, G: GpuContext> Default for PlayerRegistry<P, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ResourceProvider, G: GpuContext> PlayerRegistry<P, G> {
    pub fn new() -> Self {
        Self {
            sessions: FxHashMap::default(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, session: PlayerSession<P, G>) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, session);
        log::info!("Registered {}", id);
        id
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerSession<P, G>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSession<P, G>> {
        self.sessions.get_mut(&id)
    }

    /// Unregister a player and stop its pipeline.
    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerSession<P, G>> {
        let session = self.sessions.remove(&id)?;
        session.controller.stop();
        log::info!("Removed {}", id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Suspend every player (e.g. the host went to the background).
    pub fn suspend_all(&self) {
        log::info!("Suspending {} player(s)", self.sessions.len());
        for session in self.sessions.values() {
            session.controller.suspend();
        }
    }

    pub fn resume_all(&self) {
        log::info!("Resuming {} player(s)", self.sessions.len());
        for session in self.sessions.values() {
            session.controller.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::media::{PixelFormat, Size, SyncToken};
    use crate::pipeline::{ControllerCallbacks, PipelineStatus};
    use crate::sim::{
        LoggingClient, MemoryResourceProvider, PipelineCall, RecordingDemuxer, RecordingGpuContext,
        ScriptedPipeline, renderer_factory, synthetic_frame,
    };

    type Session = PlayerSession<MemoryResourceProvider, RecordingGpuContext>;

    fn session(pipeline: &Rc<ScriptedPipeline>, max_texture_size: u32) -> Session {
        let controller = PipelineController::new(
            pipeline.clone(),
            renderer_factory("player"),
            ControllerCallbacks::default(),
        );
        controller.start(RecordingDemuxer::new(), Rc::new(LoggingClient), false, false);
        let updater = VideoResourceUpdater::new(
            MemoryResourceProvider::new(max_texture_size),
            Some(RecordingGpuContext::new()),
        );
        PlayerSession::new(controller, updater)
    }

    #[test]
    fn present_counts_dropped_frames() {
        let pipeline = ScriptedPipeline::new();
        let mut session = session(&pipeline, 16);

        let ok = session.present_frame(&synthetic_frame(PixelFormat::I420, Size::new(16, 16), 1));
        ok.release_all(SyncToken::EMPTY, false);
        let too_big = session.present_frame(&synthetic_frame(PixelFormat::I420, Size::new(64, 16), 2));
        assert!(too_big.is_none());

        assert_eq!(
            session.stats(),
            FrameStats {
                presented: 1,
                dropped: 1,
            }
        );
    }

    #[test]
    fn registry_bulk_suspend_and_resume() {
        let pipelines = [ScriptedPipeline::new(), ScriptedPipeline::new()];
        let mut registry = PlayerRegistry::new();
        let ids: Vec<PlayerId> = pipelines
            .iter()
            .map(|p| registry.create(session(p, 4096)))
            .collect();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), ids);
        for pipeline in &pipelines {
            pipeline.run_until_idle();
        }

        registry.suspend_all();
        for pipeline in &pipelines {
            pipeline.run_until_idle();
        }
        for id in &ids {
            assert!(registry.get(*id).unwrap().controller().is_pipeline_suspended());
        }

        registry.resume_all();
        for pipeline in &pipelines {
            pipeline.run_until_idle();
            assert!(matches!(pipeline.calls().last(), Some(PipelineCall::Resume { .. })));
        }
        for id in &ids {
            assert!(registry.get(*id).unwrap().controller().is_stable());
        }
    }

    #[test]
    fn remove_stops_the_pipeline() {
        let pipeline = ScriptedPipeline::new();
        let mut registry = PlayerRegistry::new();
        let id = registry.create(session(&pipeline, 4096));
        pipeline.run_until_idle();

        let removed = registry.remove(id).unwrap();
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
        assert!(registry.remove(id).is_none());
        assert!(!removed.controller().is_pipeline_running());
        assert_eq!(pipeline.calls().last(), Some(&PipelineCall::Stop));
    }

    #[test]
    fn error_leaves_other_players_running() {
        let pipelines = [ScriptedPipeline::new(), ScriptedPipeline::new()];
        let mut registry = PlayerRegistry::new();
        let ids: Vec<PlayerId> = pipelines
            .iter()
            .map(|p| registry.create(session(p, 4096)))
            .collect();
        pipelines[0].complete_next(Err(PipelineStatus::Network));
        pipelines[1].run_until_idle();

        assert!(!registry.get(ids[0]).unwrap().controller().is_stable());
        assert!(registry.get(ids[1]).unwrap().controller().is_stable());
    }
}
