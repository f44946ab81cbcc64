//! In-process stand-ins for the pipeline, demuxer, resource provider, and
//! GPU context. Used by the tests and the `playback-sim` binary.

mod gpu;
mod pipeline;

pub use gpu::{
    MemoryResourceProvider, ProviderStats, RecordingGpuContext, SIM_FENCE_NAMESPACE,
    synthetic_frame,
};
pub use pipeline::{
    DemuxerCall, LoggingClient, PipelineCall, RecordingDemuxer, ScriptedPipeline, SimRenderer,
    renderer_factory,
};
