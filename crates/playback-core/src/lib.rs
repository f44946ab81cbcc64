//! Playback sequencing and video frame resource recycling.
//!
//! - [`pipeline`]: `PipelineController`, which turns overlapping start, seek,
//!   suspend, and resume requests into one pipeline operation at a time
//! - [`media`]: `VideoResourceUpdater`, which turns decoded frames into
//!   compositor resources backed by a recycling plane pool
//! - [`player`]: per-player wiring of the two plus a registry
//! - [`sim`]: in-process collaborators for tests and the demo binary

pub mod media;
pub mod pipeline;
pub mod player;
pub mod settings;
pub mod sim;

pub use media::VideoResourceUpdater;
pub use pipeline::PipelineController;
pub use settings::MediaSettings;
